use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::common::{
    Attachment, ChatContext, ChatId, ClientCommand, GeoPoint, HelpRequest, NewRequest, RequestId,
    SyncEvent, UserAction, UserId, UserRef,
};
use crate::network::{ApiError, MitzvotApi, PostedMessages};
use crate::storage::SeenLedger;

use super::chat_sync::ChatMessageSync;
use super::counterpart::summary_counterpart;
use super::feed::{DEFAULT_RADIUS_KM, RequestFeed, refresh_feed};
use super::sequencer::FetchSequencer;
use super::summary_notifier::ChatSummaryNotifier;
use super::task::PollTask;

/// Poll periods and feed radius.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub chat_poll: Duration,
    pub summary_poll: Duration,
    pub feed_poll: Duration,
    pub radius_km: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            chat_poll: Duration::from_millis(800),
            summary_poll: Duration::from_secs(3),
            feed_poll: Duration::from_secs(15),
            radius_km: DEFAULT_RADIUS_KM,
        }
    }
}

const ONE_SHOT_EVENTS: usize = 16;

/// The request a one-shot action produced, or the alert it raised instead.
pub fn request_outcome(events: Vec<SyncEvent>) -> Option<Result<HelpRequest, String>> {
    events.into_iter().find_map(|event| match event {
        SyncEvent::RequestUpdated(request) => Some(Ok(request)),
        SyncEvent::ActionFailed { message, .. } => Some(Err(message)),
        _ => None,
    })
}

struct OpenChat {
    context: ChatContext,
    sequencer: FetchSequencer,
    task: PollTask,
}

/// Owns every background loop of a signed-in session and executes front-end
/// commands against the backend.
pub struct SyncRuntime<A> {
    api: Arc<A>,
    viewer: UserId,
    ledger: SeenLedger,
    settings: SyncSettings,
    event_sender: mpsc::Sender<SyncEvent>,
    command_receiver: mpsc::Receiver<ClientCommand>,
    open_chat_tx: watch::Sender<Option<ChatId>>,
    location_tx: watch::Sender<Option<GeoPoint>>,
    feed_sequencer: FetchSequencer,
    chat: Option<OpenChat>,
}

impl<A: MitzvotApi> SyncRuntime<A> {
    pub fn new(
        api: Arc<A>,
        viewer: UserId,
        ledger: SeenLedger,
        settings: SyncSettings,
        event_sender: mpsc::Sender<SyncEvent>,
        command_receiver: mpsc::Receiver<ClientCommand>,
    ) -> Self {
        let (open_chat_tx, _) = watch::channel(None);
        let (location_tx, _) = watch::channel(None);
        Self {
            api,
            viewer,
            ledger,
            settings,
            event_sender,
            command_receiver,
            open_chat_tx,
            location_tx,
            feed_sequencer: FetchSequencer::default(),
            chat: None,
        }
    }

    /// Runs until the command channel closes, then stops every loop.
    pub async fn run(mut self) {
        let notifier = ChatSummaryNotifier::new(
            self.api.clone(),
            self.viewer.clone(),
            self.ledger.clone(),
            self.open_chat_tx.subscribe(),
            self.event_sender.clone(),
        );
        let summaries = PollTask::spawn("chat-summaries", self.settings.summary_poll, notifier);

        let feed = RequestFeed::new(
            self.api.clone(),
            self.location_tx.subscribe(),
            self.settings.radius_km,
            self.feed_sequencer.clone(),
            self.event_sender.clone(),
        );
        let feed = PollTask::spawn("nearby-feed", self.settings.feed_poll, feed);

        log::info!("Sync runtime started for user {}", self.viewer);

        while let Some(command) = self.command_receiver.recv().await {
            self.handle_command(command).await;
        }

        if let Some(chat) = self.chat.take() {
            chat.task.cancel().await;
        }
        summaries.cancel().await;
        feed.cancel().await;
        log::info!("Sync runtime stopped");
    }

    /// Execute a single command without starting any loop and return the
    /// events it published. Meant for request actions (`OfferHelp`,
    /// `CompleteRequest`, `CreateRequest`) issued outside a session.
    pub async fn execute(
        api: Arc<A>,
        viewer: UserId,
        ledger: SeenLedger,
        settings: SyncSettings,
        command: ClientCommand,
    ) -> Vec<SyncEvent> {
        let (event_tx, mut event_rx) = mpsc::channel(ONE_SHOT_EVENTS);
        let (_commands, command_rx) = mpsc::channel(1);
        let mut runtime = Self::new(api, viewer, ledger, settings, event_tx, command_rx);
        runtime.handle_command(command).await;
        drop(runtime);

        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }
        events
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::OpenChat(context) => self.open_chat(context).await,
            ClientCommand::CloseChat => self.close_chat().await,
            ClientCommand::SendMessage { text } => {
                self.send_message(text, Vec::new(), UserAction::SendMessage)
                    .await
            }
            ClientCommand::SendAttachment { path } => self.send_attachment(path).await,
            ClientCommand::StartChat {
                other_user,
                request_id,
                request_title,
            } => self.start_chat(other_user, request_id, request_title).await,
            ClientCommand::SetLocation(point) => {
                self.location_tx.send_replace(Some(point));
                self.refresh_feed().await;
            }
            ClientCommand::RefreshFeed => self.refresh_feed().await,
            ClientCommand::OfferHelp(request_id) => self.offer_help(request_id).await,
            ClientCommand::CompleteRequest(request_id) => self.complete(request_id).await,
            ClientCommand::CreateRequest(request) => self.create(request).await,
        }
    }

    async fn open_chat(&mut self, context: ChatContext) {
        if let Some(current) = self.chat.as_mut() {
            if current.context.chat_id == context.chat_id {
                log::debug!("Chat {} already open", context.chat_id);
                current.context.read_only = context.read_only;
                return;
            }
        }
        self.close_chat().await;

        let chat_id = context.chat_id.clone();
        log::info!("Opening chat {chat_id}");
        self.open_chat_tx.send_replace(Some(chat_id.clone()));
        self.emit(SyncEvent::ChatOpened {
            chat_id,
            read_only: context.read_only,
        })
        .await;

        let sequencer = FetchSequencer::default();
        let sync = ChatMessageSync::new(
            self.api.clone(),
            self.viewer.clone(),
            context.clone(),
            self.ledger.clone(),
            sequencer.clone(),
            self.event_sender.clone(),
        );
        let task = PollTask::spawn("chat-messages", self.settings.chat_poll, sync);
        self.chat = Some(OpenChat {
            context,
            sequencer,
            task,
        });
    }

    async fn close_chat(&mut self) {
        let Some(chat) = self.chat.take() else {
            return;
        };
        chat.task.cancel().await;
        self.open_chat_tx.send_replace(None);
        log::info!("Closed chat {}", chat.context.chat_id);
        self.emit(SyncEvent::ChatClosed(chat.context.chat_id)).await;
    }

    async fn send_message(&mut self, text: String, attachments: Vec<Attachment>, action: UserAction) {
        let text = text.trim();
        if text.is_empty() && attachments.is_empty() {
            return;
        }
        let Some(chat) = self.chat.as_ref() else {
            log::warn!("No chat open; ignoring send");
            return;
        };
        if chat.context.read_only {
            log::warn!("Chat {} is read-only; ignoring send", chat.context.chat_id);
            return;
        }
        let chat_id = chat.context.chat_id.clone();
        let sequencer = chat.sequencer.clone();

        let ticket = sequencer.issue();
        let posted = match self.api.post_message(&chat_id, text, &attachments).await {
            Ok(posted) => posted,
            Err(err) => {
                self.fail(action, err).await;
                return;
            }
        };
        let event = match posted {
            PostedMessages::Thread(messages) => SyncEvent::MessagesUpdated {
                chat_id: chat_id.clone(),
                messages,
            },
            PostedMessages::Single(message) => SyncEvent::MessageAppended {
                chat_id: chat_id.clone(),
                message,
            },
        };
        if !sequencer.publish(ticket, &self.event_sender, event).await {
            log::debug!("A newer message list for chat {chat_id} is already applied");
        }
    }

    async fn send_attachment(&mut self, path: PathBuf) {
        let Some(chat) = self.chat.as_ref() else {
            log::warn!("No chat open; ignoring attachment {}", path.display());
            return;
        };
        if chat.context.read_only {
            log::warn!("Chat {} is read-only; ignoring attachment", chat.context.chat_id);
            return;
        }
        let chat_id = chat.context.chat_id.clone();

        match self.api.upload_attachment(&chat_id, &path).await {
            Ok(attachment) => {
                log::info!("Uploaded {} to chat {chat_id}", path.display());
                self.send_message(String::new(), vec![attachment], UserAction::SendAttachment(path))
                    .await;
            }
            Err(err) => self.fail(UserAction::SendAttachment(path), err).await,
        }
    }

    async fn start_chat(
        &mut self,
        other_user: UserId,
        request_id: RequestId,
        request_title: Option<String>,
    ) {
        let started = match self.api.start_chat(&other_user, &request_id).await {
            Ok(started) => started,
            Err(err) => {
                self.fail(UserAction::StartChat, err).await;
                return;
            }
        };

        let summary = started.summary.as_ref();
        let counterpart = summary
            .and_then(|summary| summary_counterpart(&self.viewer, summary))
            .cloned()
            .unwrap_or_else(|| UserRef::new(other_user.as_str()));
        let context = ChatContext {
            request_id: Some(request_id),
            request_title: request_title
                .or_else(|| summary.and_then(|summary| summary.request_title.clone())),
            counterpart: Some(counterpart),
            ..ChatContext::new(started.chat_id)
        };
        self.open_chat(context).await;
    }

    async fn refresh_feed(&self) {
        let Some(center) = *self.location_tx.borrow() else {
            log::debug!("No location yet; skipping feed refresh");
            return;
        };
        refresh_feed(
            self.api.as_ref(),
            center,
            self.settings.radius_km,
            &self.feed_sequencer,
            &self.event_sender,
        )
        .await;
    }

    async fn offer_help(&mut self, request_id: RequestId) {
        match self.api.mark_helper(&request_id).await {
            Ok(request) => {
                log::info!("Volunteered for request {request_id}");
                self.emit(SyncEvent::RequestUpdated(request)).await;
            }
            Err(err) => self.fail(UserAction::OfferHelp(request_id), err).await,
        }
    }

    async fn complete(&mut self, request_id: RequestId) {
        let request = match self.api.mark_completed(&request_id).await {
            Ok(request) => request,
            Err(err) => {
                self.fail(UserAction::CompleteRequest(request_id), err).await;
                return;
            }
        };
        log::info!("Request {request_id} completed");

        let mut closed_chat = None;
        if let Some(chat) = self.chat.as_mut() {
            if chat.context.request_id.as_ref() == Some(&request_id) {
                chat.context.read_only = true;
                closed_chat = Some(chat.context.chat_id.clone());
            }
        }
        self.emit(SyncEvent::RequestUpdated(request)).await;
        if let Some(chat_id) = closed_chat {
            self.emit(SyncEvent::ChatOpened {
                chat_id,
                read_only: true,
            })
            .await;
        }
    }

    async fn create(&mut self, request: NewRequest) {
        match self.api.post_request(&request).await {
            Ok(created) => {
                log::info!("Posted request {}", created.id);
                self.emit(SyncEvent::RequestUpdated(created)).await;
            }
            Err(err) => self.fail(UserAction::CreateRequest, err).await,
        }
    }

    async fn fail(&self, action: UserAction, err: ApiError) {
        log::warn!("{action:?} failed: {err}");
        self.emit(SyncEvent::ActionFailed {
            action,
            message: err.user_message(),
        })
        .await;
    }

    async fn emit(&self, event: SyncEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Sync event receiver dropped: {err}");
        }
    }
}
