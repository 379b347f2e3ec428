use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StoreError;
use crate::common::{ChatId, ChatMessage, MessageId};

/// Version written by this build.
pub const SEEN_MARKERS_VERSION: u32 = 1;

/// Identifies the last acknowledged message of a chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MarkerKey {
    Message(MessageId),
    /// Used when the backend did not send a message id.
    Timestamp(DateTime<Utc>),
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerKey::Message(id) => write!(f, "{id}"),
            MarkerKey::Timestamp(at) => write!(f, "{}", at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenMarker {
    pub key: MarkerKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
}

impl SeenMarker {
    /// `None` when the message carries neither an id nor a timestamp.
    pub fn for_message(message: &ChatMessage) -> Option<Self> {
        match (&message.id, message.created_at) {
            (Some(id), at) => Some(Self {
                key: MarkerKey::Message(id.clone()),
                at,
            }),
            (None, Some(at)) => Some(Self {
                key: MarkerKey::Timestamp(at),
                at: Some(at),
            }),
            (None, None) => None,
        }
    }

    /// Whether recording `self` after `previous` moves the marker forward.
    ///
    /// Markers without a timestamp cannot be ordered, so a different key is
    /// taken as newer. With both timestamps known, markers are ordered by
    /// `(at, key)`; messages sharing a timestamp fall back to id order.
    pub fn supersedes(&self, previous: &SeenMarker) -> bool {
        if self.key == previous.key {
            return false;
        }
        match (self.at, previous.at) {
            (Some(new), Some(old)) => (new, &self.key) > (old, &previous.key),
            _ => true,
        }
    }
}

/// The durable record: one JSON value under one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSeenMarkers {
    pub version: u32,
    #[serde(default)]
    pub markers: BTreeMap<ChatId, SeenMarker>,
}

impl Default for PersistedSeenMarkers {
    fn default() -> Self {
        Self {
            version: SEEN_MARKERS_VERSION,
            markers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Decoded {
    Current(PersistedSeenMarkers),
    /// Loaded from an older layout; callers should write it back.
    Migrated {
        from: u32,
        record: PersistedSeenMarkers,
    },
}

impl PersistedSeenMarkers {
    pub fn encode(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reads any known layout.
    ///
    /// Version 0 is the untyped browser-storage blob: a bare object mapping
    /// chat ids to either a message id or an ISO-8601 timestamp.
    pub fn decode(raw: &str) -> Result<Decoded, StoreError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut object) = value else {
            return Err(StoreError::Malformed(
                "seen markers must be a JSON object".to_string(),
            ));
        };

        match object.get("version") {
            None => Ok(Decoded::Migrated {
                from: 0,
                record: migrate_legacy(object),
            }),
            Some(version) => {
                let found = version.as_u64().ok_or_else(|| {
                    StoreError::Malformed(format!("invalid version field: {version}"))
                })?;
                if found > u64::from(SEEN_MARKERS_VERSION) {
                    return Err(StoreError::UnsupportedVersion {
                        found,
                        supported: SEEN_MARKERS_VERSION,
                    });
                }
                if found == 0 {
                    object.remove("version");
                    let legacy = match object.remove("markers") {
                        Some(Value::Object(markers)) => markers,
                        _ => object,
                    };
                    return Ok(Decoded::Migrated {
                        from: 0,
                        record: migrate_legacy(legacy),
                    });
                }
                let record = serde_json::from_value(Value::Object(object))?;
                Ok(Decoded::Current(record))
            }
        }
    }
}

fn migrate_legacy(object: serde_json::Map<String, Value>) -> PersistedSeenMarkers {
    let mut record = PersistedSeenMarkers::default();
    for (chat_id, value) in object {
        let Some(raw) = value.as_str() else {
            log::warn!("Dropping legacy seen marker for chat {chat_id}: not a string");
            continue;
        };
        let marker = match DateTime::parse_from_rfc3339(raw) {
            Ok(at) => {
                let at = at.with_timezone(&Utc);
                SeenMarker {
                    key: MarkerKey::Timestamp(at),
                    at: Some(at),
                }
            }
            Err(_) => SeenMarker {
                key: MarkerKey::Message(MessageId::new(raw)),
                at: None,
            },
        };
        record.markers.insert(ChatId::new(chat_id), marker);
    }
    record
}
