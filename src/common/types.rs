use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Backend identifier of a user.
    UserId
);
string_id!(
    /// Backend identifier of a chat thread.
    ChatId
);
string_id!(
    /// Backend identifier of a help request (a "mitzva").
    RequestId
);
string_id!(MessageId);

/// Minimal user profile as embedded in messages, chats and requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "_id", alias = "id")]
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: None,
            firstname: None,
            email: None,
        }
    }

    /// `name`, then `firstname`, then `email`.
    pub fn display_name(&self) -> Option<&str> {
        [&self.name, &self.firstname, &self.email]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|value| !value.trim().is_empty())
    }
}

/// The backend either populates a user reference or sends the bare id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserHandle {
    Id(UserId),
    Profile(UserRef),
}

impl UserHandle {
    pub fn id(&self) -> &UserId {
        match self {
            UserHandle::Id(id) => id,
            UserHandle::Profile(profile) => &profile.id,
        }
    }

    pub fn profile(&self) -> Option<&UserRef> {
        match self {
            UserHandle::Id(_) => None,
            UserHandle::Profile(profile) => Some(profile),
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.profile().and_then(UserRef::display_name)
    }

    pub fn is(&self, user: &UserId) -> bool {
        self.id() == user
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    #[serde(other)]
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(rename = "type", default = "default_attachment_kind")]
    pub kind: AttachmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
}

fn default_attachment_kind() -> AttachmentKind {
    AttachmentKind::File
}

/// A chat message as returned by the backend. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub sender: Option<UserHandle>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn sender_id(&self) -> Option<&UserId> {
        self.sender.as_ref().map(UserHandle::id)
    }

    pub fn is_from(&self, user: &UserId) -> bool {
        self.sender_id() == Some(user)
    }
}

/// Aggregate view of a chat used for notification polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    #[serde(alias = "_id")]
    pub chat_id: ChatId,
    #[serde(default)]
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub request_title: Option<String>,
    #[serde(default)]
    pub participants: Vec<UserRef>,
    #[serde(default)]
    pub last_message: Option<ChatMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// GeoJSON point, `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonPoint {
    pub coordinates: [f64; 2],
}

impl GeoJsonPoint {
    pub fn to_point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.coordinates[1],
            longitude: self.coordinates[0],
        }
    }
}

/// A help request ("mitzva").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpRequest {
    #[serde(rename = "_id", alias = "id")]
    pub id: RequestId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoJsonPoint>,
    #[serde(default)]
    pub created_by: Option<UserHandle>,
    /// The helper who volunteered, if any.
    #[serde(default)]
    pub completed_by: Option<UserHandle>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl HelpRequest {
    pub fn position(&self) -> Option<GeoPoint> {
        self.location.as_ref().map(GeoJsonPoint::to_point)
    }

    pub fn has_helper(&self) -> bool {
        self.completed_by.is_some()
    }
}

/// Payload for posting a new help request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRequest {
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// The signed-in user's account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub is_banned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub name: String,
    pub age: u32,
    pub email: String,
    pub password: String,
    pub phone: String,
    #[serde(rename = "profileImage", skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginSession {
    pub token: String,
    pub user: User,
}
