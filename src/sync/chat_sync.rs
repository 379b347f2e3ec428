use std::sync::Arc;

use tokio::sync::mpsc;

use crate::common::{ChatContext, ChatMessage, MessageNotification, SyncEvent, UserId};
use crate::network::MitzvotApi;
use crate::storage::{SeenLedger, SeenMarker};

use super::sequencer::FetchSequencer;
use super::task::PollJob;

/// What one `refresh` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fetch failed; the previous list is kept.
    Failed,
    /// A newer response had already been applied.
    Stale,
    Empty,
    /// Initial load recorded the latest message as seen.
    Baselined,
    /// Latest message is the viewer's own, or has no sender; marked seen.
    Silent,
    /// Latest message was already seen.
    Unchanged,
    Notified,
}

/// Keeps one open chat current and raises one notification per new foreign
/// message.
pub struct ChatMessageSync<A> {
    api: Arc<A>,
    viewer: UserId,
    chat: ChatContext,
    ledger: SeenLedger,
    sequencer: FetchSequencer,
    events: mpsc::Sender<SyncEvent>,
    messages: Vec<ChatMessage>,
}

impl<A: MitzvotApi> ChatMessageSync<A> {
    pub fn new(
        api: Arc<A>,
        viewer: UserId,
        chat: ChatContext,
        ledger: SeenLedger,
        sequencer: FetchSequencer,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            api,
            viewer,
            chat,
            ledger,
            sequencer,
            events,
            messages: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub async fn refresh(&mut self, initial: bool) -> RefreshOutcome {
        let chat_id = self.chat.chat_id.clone();
        let ticket = self.sequencer.issue();

        let messages = match self.api.fetch_messages(&chat_id).await {
            Ok(messages) => messages,
            Err(err) => {
                log::warn!("Failed to fetch messages for chat {chat_id}: {err}");
                return RefreshOutcome::Failed;
            }
        };
        let update = SyncEvent::MessagesUpdated {
            chat_id: chat_id.clone(),
            messages: messages.clone(),
        };
        if !self.sequencer.publish(ticket, &self.events, update).await {
            log::debug!("Dropping stale message list for chat {chat_id}");
            return RefreshOutcome::Stale;
        }
        self.messages = messages;

        let Some(latest) = self.messages.last() else {
            return RefreshOutcome::Empty;
        };
        let Some(marker) = SeenMarker::for_message(latest) else {
            log::debug!("Latest message in chat {chat_id} has no id or timestamp");
            return RefreshOutcome::Unchanged;
        };

        if initial {
            self.ledger.advance(&chat_id, marker);
            return RefreshOutcome::Baselined;
        }
        if latest.sender.is_none() || latest.is_from(&self.viewer) {
            self.ledger.advance(&chat_id, marker);
            return RefreshOutcome::Silent;
        }
        if !self.ledger.advance(&chat_id, marker.clone()) {
            return RefreshOutcome::Unchanged;
        }

        let from = latest
            .sender
            .as_ref()
            .and_then(|sender| sender.display_name())
            .or_else(|| self.chat.counterpart.as_ref()?.display_name())
            .unwrap_or("Someone")
            .to_string();
        let notification = MessageNotification {
            chat_id,
            request_id: self.chat.request_id.clone(),
            request_title: self.chat.request_title.clone(),
            from,
            counterpart: self.chat.counterpart.clone(),
            message_id: marker.key,
        };
        self.emit(SyncEvent::NewMessage(notification)).await;
        RefreshOutcome::Notified
    }

    async fn emit(&self, event: SyncEvent) {
        if let Err(err) = self.events.send(event).await {
            log::warn!("Sync event receiver dropped: {err}");
        }
    }
}

impl<A: MitzvotApi> PollJob for ChatMessageSync<A> {
    async fn poll(&mut self, first: bool) {
        self.refresh(first).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChatId, RequestId, UserRef};
    use crate::storage::MarkerKey;
    use crate::sync::fake::{FakeApi, message};

    struct Harness {
        api: Arc<FakeApi>,
        ledger: SeenLedger,
        sync: ChatMessageSync<FakeApi>,
        events: mpsc::Receiver<SyncEvent>,
    }

    fn chat_id() -> ChatId {
        ChatId::from("chat-1")
    }

    fn harness() -> Harness {
        let api = Arc::new(FakeApi::new("me"));
        let ledger = SeenLedger::in_memory().unwrap();
        let (tx, rx) = mpsc::channel(64);
        let chat = ChatContext {
            request_id: Some(RequestId::from("req-1")),
            request_title: Some("Groceries for Shabbat".into()),
            counterpart: Some(UserRef {
                name: Some("Avi".into()),
                ..UserRef::new("avi")
            }),
            ..ChatContext::new(chat_id())
        };
        let sync = ChatMessageSync::new(
            api.clone(),
            UserId::from("me"),
            chat,
            ledger.clone(),
            FetchSequencer::default(),
            tx,
        );
        Harness {
            api,
            ledger,
            sync,
            events: rx,
        }
    }

    impl Harness {
        fn set_messages(&self, messages: Vec<ChatMessage>) {
            self.api.state().messages.insert(chat_id(), messages);
        }

        fn drain(&mut self) -> Vec<SyncEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }

        fn notifications(&mut self) -> Vec<MessageNotification> {
            self.drain()
                .into_iter()
                .filter_map(|event| match event {
                    SyncEvent::NewMessage(notification) => Some(notification),
                    _ => None,
                })
                .collect()
        }

        fn marker_key(&self) -> Option<MarkerKey> {
            self.ledger.get(&chat_id()).map(|marker| marker.key)
        }
    }

    fn key(id: &str) -> MarkerKey {
        MarkerKey::Message(id.into())
    }

    #[tokio::test]
    async fn initial_load_baselines_without_notifying() {
        let mut h = harness();
        h.set_messages(vec![
            message("m1", "avi", "Avi", 1),
            message("m2", "me", "Me", 2),
            message("m3", "avi", "Avi", 3),
        ]);

        assert_eq!(h.sync.refresh(true).await, RefreshOutcome::Baselined);
        assert!(h.notifications().is_empty());
        assert_eq!(h.marker_key(), Some(key("m3")));
        assert_eq!(h.sync.messages().len(), 3);
    }

    #[tokio::test]
    async fn every_successful_refresh_publishes_the_list() {
        let mut h = harness();
        h.set_messages(vec![message("m1", "avi", "Avi", 1)]);

        h.sync.refresh(true).await;
        h.sync.refresh(false).await;

        let updates = h
            .drain()
            .into_iter()
            .filter(|event| matches!(event, SyncEvent::MessagesUpdated { .. }))
            .count();
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn own_message_advances_silently() {
        let mut h = harness();
        h.set_messages(vec![message("m1", "avi", "Avi", 1)]);
        h.sync.refresh(true).await;

        h.set_messages(vec![
            message("m1", "avi", "Avi", 1),
            message("m2", "me", "Me", 2),
        ]);
        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Silent);
        assert!(h.notifications().is_empty());
        assert_eq!(h.marker_key(), Some(key("m2")));
    }

    #[tokio::test]
    async fn one_foreign_message_notifies_exactly_once() {
        let mut h = harness();
        h.set_messages(vec![message("m1", "me", "Me", 1)]);
        h.sync.refresh(true).await;
        h.drain();

        h.set_messages(vec![
            message("m1", "me", "Me", 1),
            message("m2", "avi", "Avi Cohen", 2),
        ]);
        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Notified);
        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Unchanged);
        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Unchanged);

        let notifications = h.notifications();
        assert_eq!(notifications.len(), 1);
        let notification = &notifications[0];
        assert_eq!(notification.from, "Avi Cohen");
        assert_eq!(
            notification.request_title.as_deref(),
            Some("Groceries for Shabbat")
        );
        assert_eq!(notification.request_id, Some(RequestId::from("req-1")));
        assert_eq!(notification.chat_id, chat_id());
        assert_eq!(notification.message_id, key("m2"));
    }

    #[tokio::test]
    async fn sender_without_profile_uses_counterpart_name() {
        let mut h = harness();
        h.sync.refresh(true).await;

        let mut incoming = message("m1", "avi", "", 1);
        incoming.sender = Some(crate::common::UserHandle::Id("avi".into()));
        h.set_messages(vec![incoming]);

        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Notified);
        assert_eq!(h.notifications()[0].from, "Avi");
    }

    #[tokio::test]
    async fn failed_fetch_keeps_last_list_and_emits_nothing() {
        let mut h = harness();
        h.set_messages(vec![message("m1", "avi", "Avi", 1)]);
        h.sync.refresh(true).await;
        h.drain();

        h.api.state().fail = true;
        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Failed);
        assert!(h.drain().is_empty());
        assert_eq!(h.sync.messages().len(), 1);

        h.api.state().fail = false;
        h.set_messages(vec![
            message("m1", "avi", "Avi", 1),
            message("m2", "avi", "Avi", 2),
        ]);
        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Notified);
    }

    #[tokio::test]
    async fn marker_never_moves_back() {
        let mut h = harness();
        h.set_messages(vec![
            message("m1", "avi", "Avi", 1),
            message("m2", "avi", "Avi", 2),
        ]);
        h.sync.refresh(true).await;

        // The latest message disappears server-side.
        h.set_messages(vec![message("m1", "avi", "Avi", 1)]);
        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Unchanged);
        assert_eq!(h.marker_key(), Some(key("m2")));
        assert!(h.notifications().is_empty());

        let sequence = [3, 2, 5, 4, 6];
        let mut highest = 2;
        for minute in sequence {
            let id = format!("m{minute}");
            h.set_messages(vec![message(&id, "avi", "Avi", minute)]);
            h.sync.refresh(false).await;
            highest = highest.max(minute);
            assert_eq!(h.marker_key(), Some(key(&format!("m{highest}"))));
        }
    }

    #[tokio::test]
    async fn empty_chat_then_first_message_notifies() {
        let mut h = harness();
        assert_eq!(h.sync.refresh(true).await, RefreshOutcome::Empty);
        assert_eq!(h.marker_key(), None);

        h.set_messages(vec![message("m1", "avi", "Avi", 1)]);
        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Notified);
    }

    #[tokio::test]
    async fn response_overtaken_by_a_send_is_dropped() {
        let mut h = harness();
        h.set_messages(vec![message("m1", "avi", "Avi", 1)]);
        h.sync.refresh(true).await;
        h.drain();

        // A send issued and applied while this poll is still in flight.
        let sequencer = h.sync.sequencer.clone();
        h.api.state().on_fetch = Some(Box::new(move || {
            let ticket = sequencer.issue();
            assert!(sequencer.admit(ticket));
        }));
        h.set_messages(vec![
            message("m1", "avi", "Avi", 1),
            message("m2", "avi", "Avi", 2),
        ]);

        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Stale);
        assert!(h.drain().is_empty());
        assert_eq!(h.sync.messages().len(), 1);

        h.api.state().on_fetch = None;
        assert_eq!(h.sync.refresh(false).await, RefreshOutcome::Notified);
    }
}
