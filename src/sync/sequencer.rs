use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};

/// Issued before a fetch starts; presented when its response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

#[derive(Debug, Default)]
struct Counters {
    issued: AtomicU64,
    applied: AtomicU64,
    // Held from admission until the event is queued.
    publish: Mutex<()>,
}

/// Drops responses that lost the race against a later fetch.
///
/// Every path that replaces the same piece of state (the poll loop and a
/// user-triggered refresh or send) shares one sequencer. A response is admitted
/// only if no response from a later-issued fetch has been applied yet.
#[derive(Debug, Clone, Default)]
pub struct FetchSequencer {
    counters: Arc<Counters>,
}

impl FetchSequencer {
    pub fn issue(&self) -> FetchTicket {
        FetchTicket(self.counters.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn admit(&self, ticket: FetchTicket) -> bool {
        self.counters.applied.fetch_max(ticket.0, Ordering::SeqCst) < ticket.0
    }

    /// Admit `ticket` and queue `event` as one step.
    ///
    /// Two tasks publishing through the same sequencer reach the channel in
    /// ticket order, so an older list can never land after a newer one.
    /// Returns false when the response was stale and nothing was sent.
    pub async fn publish<T>(
        &self,
        ticket: FetchTicket,
        events: &mpsc::Sender<T>,
        event: T,
    ) -> bool {
        let _order = self.counters.publish.lock().await;
        if !self.admit(ticket) {
            return false;
        }
        if events.send(event).await.is_err() {
            log::warn!("Sync event receiver dropped");
        }
        true
    }
}
