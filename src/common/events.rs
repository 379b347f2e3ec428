use std::path::PathBuf;

use super::types::{
    ChatId, ChatMessage, ChatSummary, HelpRequest, RequestId, UserRef,
};
use crate::storage::MarkerKey;

/// Raised by the chat view sync when a foreign message arrives in the open chat.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageNotification {
    pub chat_id: ChatId,
    pub request_id: Option<RequestId>,
    pub request_title: Option<String>,
    pub from: String,
    pub counterpart: Option<UserRef>,
    pub message_id: MarkerKey,
}

/// Raised by the summary notifier for an unseen message in any chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatToast {
    pub chat_id: ChatId,
    pub request_id: Option<RequestId>,
    pub request_title: Option<String>,
    pub from: String,
    pub preview: String,
    pub message_id: MarkerKey,
}

/// What a user-initiated action was trying to do when it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    SendMessage,
    SendAttachment(PathBuf),
    StartChat,
    OfferHelp(RequestId),
    CompleteRequest(RequestId),
    CreateRequest,
}

/// Events from the sync layer to the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Full message list of a chat; the view scrolls to the newest entry.
    MessagesUpdated {
        chat_id: ChatId,
        messages: Vec<ChatMessage>,
    },
    MessageAppended {
        chat_id: ChatId,
        message: ChatMessage,
    },
    NewMessage(MessageNotification),
    ChatsUpdated(Vec<ChatSummary>),
    Toast(ChatToast),
    FeedUpdated(Vec<HelpRequest>),
    /// Server copy of a request after a successful mutation.
    RequestUpdated(HelpRequest),
    ChatOpened {
        chat_id: ChatId,
        read_only: bool,
    },
    ChatClosed(ChatId),
    ActionFailed {
        action: UserAction,
        message: String,
    },
}
