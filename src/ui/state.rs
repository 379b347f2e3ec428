use std::collections::VecDeque;

use crate::common::{ChatId, ChatMessage, ChatSummary, HelpRequest, SyncEvent};

/// Oldest notices are dropped beyond this.
pub const MAX_NOTICES: usize = 100;

/// Something to show the user briefly: a new message or a toast.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub chat_id: ChatId,
    pub title: String,
    pub body: String,
}

/// Local view state, folded from sync events.
#[derive(Debug, Default)]
pub struct AppState {
    pub open_chat: Option<ChatId>,
    pub read_only: bool,
    pub messages: Vec<ChatMessage>,
    pub chats: Vec<ChatSummary>,
    pub feed: Vec<HelpRequest>,
    pub notices: VecDeque<Notice>,
    pub last_error: Option<String>,
    /// Bumped whenever the open chat's list changes; the view scrolls to the
    /// newest message on each bump.
    pub scroll_requests: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the event was dropped as stale.
    pub fn apply(&mut self, event: SyncEvent) -> bool {
        match event {
            SyncEvent::MessagesUpdated { chat_id, messages } => {
                if !self.is_open(&chat_id) {
                    return false;
                }
                self.messages = messages;
                self.scroll_requests += 1;
            }
            SyncEvent::MessageAppended { chat_id, message } => {
                if !self.is_open(&chat_id) {
                    return false;
                }
                let duplicate = message.id.is_some()
                    && self.messages.iter().any(|existing| existing.id == message.id);
                if !duplicate {
                    self.messages.push(message);
                }
                self.scroll_requests += 1;
            }
            SyncEvent::NewMessage(notification) => {
                let title = notification
                    .request_title
                    .unwrap_or_else(|| "New message".to_string());
                self.push_notice(Notice {
                    chat_id: notification.chat_id,
                    title,
                    body: format!("{} sent a message", notification.from),
                });
            }
            SyncEvent::Toast(toast) => {
                let title = match toast.request_title {
                    Some(request) => format!("{} · {request}", toast.from),
                    None => toast.from,
                };
                self.push_notice(Notice {
                    chat_id: toast.chat_id,
                    title,
                    body: toast.preview,
                });
            }
            SyncEvent::ChatsUpdated(chats) => self.chats = chats,
            SyncEvent::FeedUpdated(feed) => self.feed = feed,
            SyncEvent::RequestUpdated(request) => {
                if request.is_completed {
                    self.feed.retain(|existing| existing.id != request.id);
                } else if let Some(existing) =
                    self.feed.iter_mut().find(|existing| existing.id == request.id)
                {
                    *existing = request;
                } else {
                    self.feed.insert(0, request);
                }
            }
            SyncEvent::ChatOpened { chat_id, read_only } => {
                if !self.is_open(&chat_id) {
                    self.messages.clear();
                    self.open_chat = Some(chat_id);
                }
                self.read_only = read_only;
            }
            SyncEvent::ChatClosed(chat_id) => {
                if !self.is_open(&chat_id) {
                    return false;
                }
                self.open_chat = None;
                self.read_only = false;
                self.messages.clear();
            }
            SyncEvent::ActionFailed { message, .. } => self.last_error = Some(message),
        }
        true
    }

    pub fn is_open(&self, chat_id: &ChatId) -> bool {
        self.open_chat.as_ref() == Some(chat_id)
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    fn push_notice(&mut self, notice: Notice) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChatToast, MessageId, UserAction};
    use crate::storage::MarkerKey;
    use crate::sync::fake::{help_request, message};

    fn opened(chat: &str) -> AppState {
        let mut state = AppState::new();
        state.apply(SyncEvent::ChatOpened {
            chat_id: ChatId::from(chat),
            read_only: false,
        });
        state
    }

    fn toast(n: usize) -> SyncEvent {
        SyncEvent::Toast(ChatToast {
            chat_id: ChatId::from("c"),
            request_id: None,
            request_title: Some("Soup".into()),
            from: "Ora".into(),
            preview: format!("message {n}"),
            message_id: MarkerKey::Message(MessageId::new(format!("m{n}"))),
        })
    }

    #[test]
    fn updates_for_a_closed_chat_are_ignored() {
        let mut state = opened("b");
        let stale = SyncEvent::MessagesUpdated {
            chat_id: ChatId::from("a"),
            messages: vec![message("a1", "other", "Ora", 1)],
        };

        assert!(!state.apply(stale));
        assert!(state.messages.is_empty());
        assert_eq!(state.scroll_requests, 0);

        assert!(state.apply(SyncEvent::MessagesUpdated {
            chat_id: ChatId::from("b"),
            messages: vec![message("b1", "other", "Ora", 1)],
        }));
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.scroll_requests, 1);
    }

    #[test]
    fn appended_message_is_not_duplicated() {
        let mut state = opened("a");
        let sent = message("m1", "me", "Me", 1);
        state.apply(SyncEvent::MessagesUpdated {
            chat_id: ChatId::from("a"),
            messages: vec![sent.clone()],
        });
        state.apply(SyncEvent::MessageAppended {
            chat_id: ChatId::from("a"),
            message: sent,
        });
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.scroll_requests, 2);
    }

    #[test]
    fn notices_are_bounded() {
        let mut state = AppState::new();
        for n in 0..(MAX_NOTICES + 5) {
            state.apply(toast(n));
        }
        assert_eq!(state.notices.len(), MAX_NOTICES);
        assert_eq!(state.notices.front().unwrap().body, "message 5");
        assert_eq!(state.notices.back().unwrap().title, "Ora · Soup");
    }

    #[test]
    fn request_updates_replace_or_insert() {
        let mut state = AppState::new();
        state.apply(SyncEvent::FeedUpdated(vec![help_request("r1", "dana", None)]));

        state.apply(SyncEvent::RequestUpdated(help_request("r1", "dana", Some("me"))));
        assert_eq!(state.feed.len(), 1);
        assert!(state.feed[0].has_helper());

        state.apply(SyncEvent::RequestUpdated(help_request("r2", "me", None)));
        assert_eq!(state.feed[0].id.as_str(), "r2");

        let mut done = help_request("r1", "dana", Some("me"));
        done.is_completed = true;
        state.apply(SyncEvent::RequestUpdated(done));
        assert_eq!(state.feed.len(), 1);
    }

    #[test]
    fn reopening_same_chat_keeps_messages_and_updates_read_only() {
        let mut state = opened("a");
        state.apply(SyncEvent::MessagesUpdated {
            chat_id: ChatId::from("a"),
            messages: vec![message("a1", "other", "Ora", 1)],
        });
        state.apply(SyncEvent::ChatOpened {
            chat_id: ChatId::from("a"),
            read_only: true,
        });
        assert_eq!(state.messages.len(), 1);
        assert!(state.read_only);

        state.apply(SyncEvent::ChatClosed(ChatId::from("a")));
        assert!(state.open_chat.is_none());
        assert!(state.messages.is_empty());
    }

    #[test]
    fn failures_are_kept_until_taken() {
        let mut state = AppState::new();
        state.apply(SyncEvent::ActionFailed {
            action: UserAction::StartChat,
            message: "Chat not found".into(),
        });
        assert_eq!(state.take_error().as_deref(), Some("Chat not found"));
        assert!(state.take_error().is_none());
    }
}
