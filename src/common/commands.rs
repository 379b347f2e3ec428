use std::path::PathBuf;

use super::types::{ChatId, GeoPoint, NewRequest, RequestId, UserId, UserRef};

/// Everything the sync layer needs to follow one chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatContext {
    pub chat_id: ChatId,
    pub request_id: Option<RequestId>,
    pub request_title: Option<String>,
    pub counterpart: Option<UserRef>,
    /// Completed requests keep their chat readable but closed for new messages.
    pub read_only: bool,
}

impl ChatContext {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            request_id: None,
            request_title: None,
            counterpart: None,
            read_only: false,
        }
    }
}

/// Commands the front end sends to the sync runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    OpenChat(ChatContext),
    CloseChat,
    SendMessage {
        text: String,
    },
    /// Upload a local file, then post it as a message attachment.
    SendAttachment {
        path: PathBuf,
    },
    StartChat {
        other_user: UserId,
        request_id: RequestId,
        request_title: Option<String>,
    },
    SetLocation(GeoPoint),
    RefreshFeed,
    OfferHelp(RequestId),
    CompleteRequest(RequestId),
    CreateRequest(NewRequest),
}
