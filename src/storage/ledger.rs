use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::client_db::ClientDatabase;
use super::models::{Decoded, PersistedSeenMarkers, SeenMarker};
use super::StoreError;
use crate::common::ChatId;

pub const SEEN_MARKERS_KEY: &str = "mitzvot.seen_markers";

/// Single owner of the persisted seen-marker map.
///
/// The chat view sync and the summary notifier both hold clones of this
/// handle. Every read-modify-persist runs under one lock, and every change is
/// written through before the lock is released.
#[derive(Clone)]
pub struct SeenLedger {
    inner: Arc<Mutex<LedgerState>>,
}

struct LedgerState {
    db: ClientDatabase,
    record: PersistedSeenMarkers,
    /// False when the stored record comes from a newer build; it is left
    /// untouched and this session runs from memory only.
    writable: bool,
}

impl LedgerState {
    fn persist(&self) {
        if !self.writable {
            return;
        }
        let json = match self.record.encode() {
            Ok(json) => json,
            Err(err) => {
                log::error!("Failed to encode seen markers: {err}");
                return;
            }
        };
        if let Err(err) = self.db.put(SEEN_MARKERS_KEY, &json) {
            log::error!("Failed to persist seen markers: {err}");
        }
    }
}

impl SeenLedger {
    pub fn open(db: ClientDatabase) -> Result<Self, StoreError> {
        let mut writable = true;
        let mut migrated = false;

        let record = match db.get(SEEN_MARKERS_KEY)? {
            None => PersistedSeenMarkers::default(),
            Some(raw) => match PersistedSeenMarkers::decode(&raw) {
                Ok(Decoded::Current(record)) => record,
                Ok(Decoded::Migrated { from, record }) => {
                    log::info!(
                        "Migrated {} seen markers from version {from}",
                        record.markers.len()
                    );
                    migrated = true;
                    record
                }
                Err(err @ StoreError::UnsupportedVersion { .. }) => {
                    log::warn!("{err}; keeping seen markers in memory only");
                    writable = false;
                    PersistedSeenMarkers::default()
                }
                Err(err) => {
                    log::warn!("Discarding unreadable seen markers: {err}");
                    PersistedSeenMarkers::default()
                }
            },
        };

        let state = LedgerState {
            db,
            record,
            writable,
        };
        if migrated {
            state.persist();
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
        })
    }

    /// A ledger that lives only for this process.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(ClientDatabase::in_memory()?)
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn get(&self, chat_id: &ChatId) -> Option<SeenMarker> {
        self.lock().record.markers.get(chat_id).cloned()
    }

    /// Record `marker` for `chat_id` if it moves the chat forward.
    ///
    /// Returns whether the stored marker changed.
    pub fn advance(&self, chat_id: &ChatId, marker: SeenMarker) -> bool {
        let mut state = self.lock();
        if let Some(previous) = state.record.markers.get(chat_id) {
            if !marker.supersedes(previous) {
                return false;
            }
        }
        state.record.markers.insert(chat_id.clone(), marker);
        state.persist();
        true
    }

    /// Advance many chats at once with a single write. Returns how many moved.
    pub fn seed<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (ChatId, SeenMarker)>,
    {
        let mut state = self.lock();
        let mut moved = 0;
        for (chat_id, marker) in entries {
            let forward = state
                .record
                .markers
                .get(&chat_id)
                .is_none_or(|previous| marker.supersedes(previous));
            if forward {
                state.record.markers.insert(chat_id, marker);
                moved += 1;
            }
        }
        if moved > 0 {
            state.persist();
        }
        moved
    }

    pub fn snapshot(&self) -> PersistedSeenMarkers {
        self.lock().record.clone()
    }

    /// Forget every marker, in memory and on disk.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.record.markers.clear();
        if state.writable {
            state.db.remove(SEEN_MARKERS_KEY)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::common::MessageId;
    use crate::storage::models::MarkerKey;

    fn marker(id: &str, minute: u32) -> SeenMarker {
        SeenMarker {
            key: MarkerKey::Message(MessageId::from(id)),
            at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap()),
        }
    }

    #[test]
    fn advance_is_monotonic() {
        let ledger = SeenLedger::in_memory().unwrap();
        let chat = ChatId::from("c1");

        assert!(ledger.advance(&chat, marker("m2", 2)));
        assert!(!ledger.advance(&chat, marker("m2", 2)));
        assert!(!ledger.advance(&chat, marker("m1", 1)));
        assert_eq!(ledger.get(&chat), Some(marker("m2", 2)));

        assert!(ledger.advance(&chat, marker("m3", 3)));
        assert_eq!(ledger.get(&chat), Some(marker("m3", 3)));
    }

    #[test]
    fn same_timestamp_never_moves_back() {
        let ledger = SeenLedger::in_memory().unwrap();
        let chat = ChatId::from("c1");

        assert!(ledger.advance(&chat, marker("m5", 4)));
        assert!(!ledger.advance(&chat, marker("m4", 4)));
        assert!(!ledger.advance(&chat, marker("m5", 4)));
        assert_eq!(ledger.get(&chat), Some(marker("m5", 4)));
    }

    #[test]
    fn seed_skips_chats_already_ahead() {
        let ledger = SeenLedger::in_memory().unwrap();
        ledger.advance(&ChatId::from("a"), marker("a5", 5));

        let moved = ledger.seed([
            (ChatId::from("a"), marker("a4", 4)),
            (ChatId::from("b"), marker("b1", 1)),
        ]);

        assert_eq!(moved, 1);
        assert_eq!(ledger.get(&ChatId::from("a")), Some(marker("a5", 5)));
        assert_eq!(ledger.get(&ChatId::from("b")), Some(marker("b1", 1)));
    }

    #[test]
    fn reload_yields_identical_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.db");

        let ledger = SeenLedger::open(ClientDatabase::with_path(&path).unwrap()).unwrap();
        ledger.advance(&ChatId::from("a"), marker("a1", 1));
        ledger.advance(&ChatId::from("b"), marker("b7", 7));
        let before = ledger.snapshot();
        drop(ledger);

        let reloaded = SeenLedger::open(ClientDatabase::with_path(&path).unwrap()).unwrap();
        assert_eq!(reloaded.snapshot(), before);
    }

    #[test]
    fn legacy_blob_is_rewritten_in_current_format() {
        let db = ClientDatabase::in_memory().unwrap();
        db.put(SEEN_MARKERS_KEY, r#"{"c1": "m1"}"#).unwrap();

        let ledger = SeenLedger::open(db).unwrap();
        assert_eq!(
            ledger.get(&ChatId::from("c1")).map(|m| m.key),
            Some(MarkerKey::Message(MessageId::from("m1")))
        );

        let state = ledger.lock();
        let raw = state.db.get(SEEN_MARKERS_KEY).unwrap().unwrap();
        assert!(matches!(
            PersistedSeenMarkers::decode(&raw).unwrap(),
            Decoded::Current(_)
        ));
    }

    #[test]
    fn newer_record_is_never_overwritten() {
        let db = ClientDatabase::in_memory().unwrap();
        let future = r#"{"version": 99, "markers": {}}"#;
        db.put(SEEN_MARKERS_KEY, future).unwrap();

        let ledger = SeenLedger::open(db).unwrap();
        assert!(ledger.advance(&ChatId::from("c"), marker("m", 1)));

        let state = ledger.lock();
        assert_eq!(
            state.db.get(SEEN_MARKERS_KEY).unwrap().as_deref(),
            Some(future)
        );
    }

    #[test]
    fn clear_forgets_everything() {
        let ledger = SeenLedger::in_memory().unwrap();
        ledger.advance(&ChatId::from("c"), marker("m", 1));
        ledger.clear().unwrap();
        assert!(ledger.snapshot().markers.is_empty());
    }
}
