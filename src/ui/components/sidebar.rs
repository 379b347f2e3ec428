use crate::common::{ChatSummary, UserId};
use crate::sync::summary_counterpart;

/// The chat list, one line per chat.
pub fn render(viewer: &UserId, chats: &[ChatSummary]) -> Vec<String> {
    if chats.is_empty() {
        return vec!["No chats yet".to_string()];
    }

    chats
        .iter()
        .map(|chat| {
            let with = summary_counterpart(viewer, chat)
                .and_then(|user| user.display_name())
                .unwrap_or("User");
            let title = chat.request_title.as_deref().unwrap_or("Request");
            let last = chat
                .last_message
                .as_ref()
                .map(|message| message.text.trim())
                .filter(|text| !text.is_empty())
                .unwrap_or("No messages yet");
            format!("[{}] {title} with {with}: {last}", chat.chat_id)
        })
        .collect()
}
