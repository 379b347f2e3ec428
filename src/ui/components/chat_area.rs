use chrono::Local;

use crate::common::{AttachmentKind, ChatMessage, UserId};

/// One line per message, oldest first.
pub fn render(viewer: &UserId, partner: &str, messages: &[ChatMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|message| render_message(viewer, partner, message))
        .collect()
}

pub fn render_message(viewer: &UserId, partner: &str, message: &ChatMessage) -> String {
    let who = if message.is_from(viewer) {
        "You"
    } else {
        message
            .sender
            .as_ref()
            .and_then(|sender| sender.display_name())
            .unwrap_or(partner)
    };

    let mut line = match message.created_at {
        Some(at) => format!("{who} · {}:", at.with_timezone(&Local).format("%H:%M")),
        None => format!("{who}:"),
    };
    if !message.text.trim().is_empty() {
        line.push(' ');
        line.push_str(message.text.trim());
    }
    for attachment in &message.attachments {
        let kind = match attachment.kind {
            AttachmentKind::Image => "image",
            AttachmentKind::Video => "video",
            AttachmentKind::File => "file",
        };
        line.push_str(&format!(" [{kind}: {}]", attachment.url));
    }
    line
}
