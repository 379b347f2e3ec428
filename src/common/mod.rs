pub mod commands;
pub mod events;
pub mod types;

pub use commands::{ChatContext, ClientCommand};
pub use events::{ChatToast, MessageNotification, SyncEvent, UserAction};
pub use types::{
    Attachment, AttachmentKind, ChatId, ChatMessage, ChatSummary, GeoPoint, HelpRequest,
    LoginSession, MessageId, NewRequest, Registration, RequestId, User, UserHandle, UserId,
    UserRef,
};
