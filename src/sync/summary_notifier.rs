use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::common::{ChatId, ChatMessage, ChatSummary, ChatToast, SyncEvent, UserId};
use crate::network::MitzvotApi;
use crate::storage::{SeenLedger, SeenMarker};

use super::counterpart::summary_counterpart;
use super::task::PollJob;

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Failed,
    /// First successful poll; markers seeded for this many chats.
    Seeded(usize),
    Quiet,
    Toasted(ChatId),
}

/// Watches every chat of the viewer and raises at most one toast per poll for
/// an unseen incoming message, whether or not a chat view is open.
///
/// Chats are visited in the order the backend returns them; when several are
/// unseen in the same poll the first one wins and the others surface on later
/// polls.
pub struct ChatSummaryNotifier<A> {
    api: Arc<A>,
    viewer: UserId,
    ledger: SeenLedger,
    open_chat: watch::Receiver<Option<ChatId>>,
    events: mpsc::Sender<SyncEvent>,
    seeded: bool,
}

impl<A: MitzvotApi> ChatSummaryNotifier<A> {
    pub fn new(
        api: Arc<A>,
        viewer: UserId,
        ledger: SeenLedger,
        open_chat: watch::Receiver<Option<ChatId>>,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            api,
            viewer,
            ledger,
            open_chat,
            events,
            seeded: false,
        }
    }

    pub async fn poll(&mut self) -> PollOutcome {
        let summaries = match self.api.list_chat_summaries().await {
            Ok(summaries) => summaries,
            Err(err) => {
                log::warn!("Failed to fetch chat summaries: {err}");
                return PollOutcome::Failed;
            }
        };

        if !self.seeded {
            let moved = self.ledger.seed(
                summaries
                    .iter()
                    .filter_map(|summary| {
                        let marker = SeenMarker::for_message(summary.last_message.as_ref()?)?;
                        Some((summary.chat_id.clone(), marker))
                    })
                    .collect::<Vec<_>>(),
            );
            self.seeded = true;
            log::info!(
                "Tracking {} chats ({moved} seen markers seeded)",
                summaries.len()
            );
            self.emit(SyncEvent::ChatsUpdated(summaries)).await;
            return PollOutcome::Seeded(moved);
        }

        let open_chat = self.open_chat.borrow().clone();
        let mut toast = None;

        for summary in &summaries {
            let Some(last) = summary.last_message.as_ref() else {
                continue;
            };
            let Some(marker) = SeenMarker::for_message(last) else {
                continue;
            };

            let own = last.sender.is_none() || last.is_from(&self.viewer);
            let open = open_chat.as_ref() == Some(&summary.chat_id);
            if own || open {
                self.ledger.advance(&summary.chat_id, marker);
                continue;
            }
            if toast.is_some() {
                continue;
            }
            if self.ledger.advance(&summary.chat_id, marker.clone()) {
                toast = Some(self.toast_for(summary, last, marker));
            }
        }

        self.emit(SyncEvent::ChatsUpdated(summaries)).await;

        match toast {
            Some(toast) => {
                let chat_id = toast.chat_id.clone();
                self.emit(SyncEvent::Toast(toast)).await;
                PollOutcome::Toasted(chat_id)
            }
            None => PollOutcome::Quiet,
        }
    }

    fn toast_for(&self, summary: &ChatSummary, last: &ChatMessage, marker: SeenMarker) -> ChatToast {
        let from = last
            .sender
            .as_ref()
            .and_then(|sender| sender.display_name())
            .or_else(|| summary_counterpart(&self.viewer, summary)?.display_name())
            .unwrap_or("Someone")
            .to_string();

        ChatToast {
            chat_id: summary.chat_id.clone(),
            request_id: summary.request_id.clone(),
            request_title: summary.request_title.clone(),
            from,
            preview: preview(last),
            message_id: marker.key,
        }
    }

    async fn emit(&self, event: SyncEvent) {
        if let Err(err) = self.events.send(event).await {
            log::warn!("Sync event receiver dropped: {err}");
        }
    }
}

impl<A: MitzvotApi> PollJob for ChatSummaryNotifier<A> {
    async fn poll(&mut self, _first: bool) {
        ChatSummaryNotifier::poll(self).await;
    }
}

fn preview(message: &ChatMessage) -> String {
    let text = message.text.trim();
    if text.is_empty() {
        return match message.attachments.len() {
            0 => String::new(),
            1 => "[attachment]".to_string(),
            n => format!("[{n} attachments]"),
        };
    }
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(PREVIEW_CHARS - 1).collect();
    cut.push('…');
    cut
}
