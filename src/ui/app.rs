use tokio::sync::mpsc;

use crate::common::{ChatContext, ChatMessage, ClientCommand, SyncEvent, UserId, UserRef};
use crate::sync::chat_partner_name;

use super::components::input_bar::{self, Input};
use super::components::{chat_area, sidebar};
use super::state::AppState;

/// Line-oriented front end: folds sync events into `AppState` and turns them
/// into printable lines; turns typed lines into commands.
pub struct ConsoleApp {
    state: AppState,
    viewer: UserId,
    counterpart: Option<UserRef>,
    command_sender: mpsc::Sender<ClientCommand>,
    /// Messages already printed for the open chat.
    printed: usize,
}

impl ConsoleApp {
    pub fn new(viewer: UserId, command_sender: mpsc::Sender<ClientCommand>) -> Self {
        Self {
            state: AppState::new(),
            viewer,
            counterpart: None,
            command_sender,
            printed: 0,
        }
    }

    pub async fn open_chat(&mut self, context: ChatContext) {
        self.counterpart = context.counterpart.clone();
        self.send_command(ClientCommand::OpenChat(context)).await;
    }

    /// Apply one event and return the lines it produces.
    pub fn handle_sync_event(&mut self, event: SyncEvent) -> Vec<String> {
        let mut lines = Vec::new();
        match &event {
            SyncEvent::ChatOpened { chat_id, read_only } => {
                if !self.state.is_open(chat_id) {
                    self.printed = 0;
                    lines.push(format!("── chat {chat_id} ──"));
                }
                if *read_only {
                    lines.push("This request is completed; the chat is read-only.".to_string());
                }
            }
            SyncEvent::ChatClosed(chat_id) if self.state.is_open(chat_id) => {
                self.counterpart = None;
                lines.push(format!("── left chat {chat_id} ──"));
            }
            SyncEvent::ChatsUpdated(chats) if self.state.chats != *chats => {
                lines.extend(sidebar::render(&self.viewer, chats));
            }
            SyncEvent::FeedUpdated(feed) => {
                lines.push(format!("{} open requests nearby", feed.len()));
                for request in feed {
                    lines.push(format!("  [{}] {}", request.id, request.title));
                }
            }
            SyncEvent::RequestUpdated(request) => {
                let status = if request.is_completed {
                    "completed"
                } else if request.has_helper() {
                    "has a helper"
                } else {
                    "open"
                };
                lines.push(format!("Request \"{}\" is {status}", request.title));
            }
            _ => {}
        }

        if !self.state.apply(event) {
            return lines;
        }

        if let Some(notice) = self.state.notices.pop_front() {
            lines.push(format!("🔔 {}: {}", notice.title, notice.body));
        }
        if let Some(error) = self.state.take_error() {
            lines.push(format!("Error: {error}"));
        }
        lines.extend(self.unprinted_messages());
        lines
    }

    fn unprinted_messages(&mut self) -> Vec<String> {
        let messages: &[ChatMessage] = &self.state.messages;
        if messages.len() < self.printed {
            // The list shrank server-side; reprint it.
            self.printed = 0;
        }
        let partner = chat_partner_name(&self.viewer, self.counterpart.as_ref(), messages);
        let lines = chat_area::render(&self.viewer, &partner, &messages[self.printed..]);
        self.printed = messages.len();
        lines
    }

    /// Returns false when the user asked to quit.
    pub async fn submit_input(&mut self, line: &str) -> bool {
        match input_bar::parse(line) {
            Input::Quit => false,
            Input::Empty => true,
            Input::Command(command) => {
                if self.state.open_chat.is_none()
                    && matches!(
                        command,
                        ClientCommand::SendMessage { .. } | ClientCommand::SendAttachment { .. }
                    )
                {
                    log::warn!("No chat open; ignoring input");
                    return true;
                }
                self.send_command(command).await;
                true
            }
        }
    }

    pub async fn send_command(&self, command: ClientCommand) {
        if let Err(err) = self.command_sender.send(command).await {
            log::warn!("Failed to send command to sync runtime: {err}");
        }
    }
}
