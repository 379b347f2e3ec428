//! In-memory backend used by the sync tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};

use crate::common::{
    Attachment, AttachmentKind, ChatId, ChatMessage, ChatSummary, GeoPoint, HelpRequest,
    LoginSession, MessageId, NewRequest, Registration, RequestId, User, UserHandle, UserId,
    UserRef,
};
use crate::network::api::StartedChat;
use crate::network::{AccountApi, AdminApi, ApiError, ApiResult, MitzvotApi, PostedMessages};

#[derive(Default)]
pub struct FakeState {
    pub viewer: Option<User>,
    pub messages: HashMap<ChatId, Vec<ChatMessage>>,
    pub summaries: Vec<ChatSummary>,
    pub requests: Vec<HelpRequest>,
    pub fail: bool,
    pub message_fetches: HashMap<ChatId, usize>,
    pub summary_fetches: usize,
    pub nearby_fetches: Vec<(GeoPoint, f64)>,
    pub posted: Vec<(ChatId, String, Vec<Attachment>)>,
    /// Answer posts with the stored message only.
    pub post_single: bool,
    /// Runs while a message fetch is in flight.
    pub on_fetch: Option<Box<dyn FnMut() + Send>>,
    /// Accounts visible to moderators.
    pub users: Vec<User>,
    pub deleted_accounts: Vec<UserId>,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new(viewer: &str) -> Self {
        let api = Self::default();
        api.state().viewer = Some(user(viewer, "Viewer", 0));
        api
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn unavailable<T>(&self) -> ApiResult<T> {
        Err(ApiError::Status {
            status: 503,
            message: "Service unavailable".into(),
        })
    }

    fn not_found<T>(what: &str) -> ApiResult<T> {
        Err(ApiError::Status {
            status: 404,
            message: format!("{what} not found"),
        })
    }

    fn set_banned(&self, user_id: &UserId, banned: bool) -> ApiResult<User> {
        let mut state = self.state();
        if state.fail {
            return self.unavailable();
        }
        let Some(user) = state.users.iter_mut().find(|user| user.id == *user_id) else {
            return Self::not_found("User");
        };
        user.is_banned = banned;
        Ok(user.clone())
    }

    fn viewer_id(state: &FakeState) -> UserId {
        state
            .viewer
            .as_ref()
            .map(|user| user.id.clone())
            .unwrap_or_else(|| UserId::from("viewer"))
    }
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 2, 18, minute, 0).unwrap()
}

pub fn user(id: &str, name: &str, stars: u32) -> User {
    User {
        id: UserId::from(id),
        name: Some(name.into()),
        email: None,
        phone: None,
        age: None,
        stars,
        role: None,
        profile_image: None,
        is_banned: false,
    }
}

pub fn message(id: &str, sender: &str, name: &str, minute: u32) -> ChatMessage {
    ChatMessage {
        id: Some(MessageId::from(id)),
        sender: Some(UserHandle::Profile(UserRef {
            name: Some(name.into()),
            ..UserRef::new(sender)
        })),
        text: format!("text of {id}"),
        attachments: Vec::new(),
        created_at: Some(at(minute)),
    }
}

pub fn summary(chat: &str, title: &str, last: Option<ChatMessage>) -> ChatSummary {
    ChatSummary {
        chat_id: ChatId::from(chat),
        request_id: Some(RequestId::new(format!("req-{chat}"))),
        request_title: Some(title.into()),
        participants: vec![UserRef::new("me"), UserRef::new("other")],
        last_message: last,
    }
}

pub fn help_request(id: &str, creator: &str, helper: Option<&str>) -> HelpRequest {
    HelpRequest {
        id: RequestId::from(id),
        title: format!("Request {id}"),
        description: String::new(),
        location: None,
        created_by: Some(UserHandle::Id(UserId::from(creator))),
        completed_by: helper.map(|helper| UserHandle::Id(UserId::from(helper))),
        is_completed: false,
        urgency: None,
        created_at: None,
        updated_at: None,
    }
}

impl MitzvotApi for FakeApi {
    async fn fetch_messages(&self, chat_id: &ChatId) -> ApiResult<Vec<ChatMessage>> {
        let mut state = self.state();
        *state.message_fetches.entry(chat_id.clone()).or_default() += 1;
        if let Some(hook) = state.on_fetch.as_mut() {
            hook();
        }
        if state.fail {
            return self.unavailable();
        }
        Ok(state.messages.get(chat_id).cloned().unwrap_or_default())
    }

    async fn post_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        attachments: &[Attachment],
    ) -> ApiResult<PostedMessages> {
        let mut state = self.state();
        if state.fail {
            return self.unavailable();
        }
        state
            .posted
            .push((chat_id.clone(), text.to_string(), attachments.to_vec()));

        let viewer = Self::viewer_id(&state);
        let single = state.post_single;
        let thread = state.messages.entry(chat_id.clone()).or_default();
        let stored = ChatMessage {
            id: Some(MessageId::new(format!("sent-{}", thread.len() + 1))),
            sender: Some(UserHandle::Id(viewer)),
            text: text.to_string(),
            attachments: attachments.to_vec(),
            created_at: Some(Utc::now()),
        };
        thread.push(stored.clone());

        if single {
            Ok(PostedMessages::Single(stored))
        } else {
            Ok(PostedMessages::Thread(thread.clone()))
        }
    }

    async fn upload_attachment(&self, _chat_id: &ChatId, path: &Path) -> ApiResult<Attachment> {
        if self.state().fail {
            return self.unavailable();
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Attachment {
            url: format!("https://files.example/{name}"),
            kind: AttachmentKind::Image,
            public_id: Some(format!("pub-{name}")),
            original_name: Some(name),
        })
    }

    async fn list_chat_summaries(&self) -> ApiResult<Vec<ChatSummary>> {
        let mut state = self.state();
        state.summary_fetches += 1;
        if state.fail {
            return self.unavailable();
        }
        Ok(state.summaries.clone())
    }

    async fn start_chat(&self, other_user: &UserId, request_id: &RequestId) -> ApiResult<StartedChat> {
        if self.state().fail {
            return self.unavailable();
        }
        let chat_id = ChatId::new(format!("chat-{request_id}"));
        let mut summary = summary(chat_id.as_str(), "Started", None);
        summary.participants = vec![UserRef::new("me"), UserRef::new(other_user.as_str())];
        Ok(StartedChat {
            chat_id,
            summary: Some(summary),
        })
    }

    async fn fetch_nearby_requests(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> ApiResult<Vec<HelpRequest>> {
        let mut state = self.state();
        state.nearby_fetches.push((center, radius_km));
        if state.fail {
            return self.unavailable();
        }
        Ok(state.requests.clone())
    }

    async fn post_request(&self, request: &NewRequest) -> ApiResult<HelpRequest> {
        let mut state = self.state();
        if state.fail {
            return self.unavailable();
        }
        let viewer = Self::viewer_id(&state);
        let mut created = help_request(
            &format!("new-{}", state.requests.len() + 1),
            viewer.as_str(),
            None,
        );
        created.title = request.title.clone();
        created.description = request.description.clone();
        state.requests.push(created.clone());
        Ok(created)
    }

    async fn mark_helper(&self, request_id: &RequestId) -> ApiResult<HelpRequest> {
        let mut state = self.state();
        let viewer = Self::viewer_id(&state);
        let Some(request) = state.requests.iter_mut().find(|r| r.id == *request_id) else {
            return Err(ApiError::Status {
                status: 404,
                message: "Request not found".into(),
            });
        };
        request.completed_by = Some(UserHandle::Id(viewer));
        Ok(request.clone())
    }

    async fn mark_completed(&self, request_id: &RequestId) -> ApiResult<HelpRequest> {
        let mut state = self.state();
        let Some(request) = state.requests.iter_mut().find(|r| r.id == *request_id) else {
            return Err(ApiError::Status {
                status: 404,
                message: "Request not found".into(),
            });
        };
        request.is_completed = true;
        let completed = request.clone();
        if let Some(viewer) = state.viewer.as_mut() {
            viewer.stars += 10;
        }
        Ok(completed)
    }

    async fn my_open_requests(&self) -> ApiResult<Vec<HelpRequest>> {
        let state = self.state();
        let viewer = Self::viewer_id(&state);
        Ok(state
            .requests
            .iter()
            .filter(|r| !r.is_completed && r.created_by.as_ref().is_some_and(|c| c.is(&viewer)))
            .cloned()
            .collect())
    }

    async fn requests_i_solved(&self) -> ApiResult<Vec<HelpRequest>> {
        let state = self.state();
        let viewer = Self::viewer_id(&state);
        Ok(state
            .requests
            .iter()
            .filter(|r| r.is_completed && r.completed_by.as_ref().is_some_and(|h| h.is(&viewer)))
            .cloned()
            .collect())
    }

    async fn my_completed_requests(&self) -> ApiResult<Vec<HelpRequest>> {
        let state = self.state();
        let viewer = Self::viewer_id(&state);
        Ok(state
            .requests
            .iter()
            .filter(|r| r.is_completed && r.created_by.as_ref().is_some_and(|c| c.is(&viewer)))
            .cloned()
            .collect())
    }

    async fn me(&self) -> ApiResult<User> {
        self.state().viewer.clone().ok_or(ApiError::Status {
            status: 401,
            message: "Unauthorized".into(),
        })
    }
}

impl AccountApi for FakeApi {
    async fn login(&self, email: &str, _password: &str) -> ApiResult<LoginSession> {
        let mut user = user(email, email, 0);
        user.email = Some(email.to_string());
        Ok(LoginSession {
            token: format!("token-{email}"),
            user,
        })
    }

    async fn register(&self, registration: &Registration) -> ApiResult<User> {
        let mut user = user(&registration.email, &registration.name, 0);
        user.phone = Some(registration.phone.clone());
        self.state().users.push(user.clone());
        Ok(user)
    }

    async fn update_profile_image(&self, image_url: &str) -> ApiResult<User> {
        let mut state = self.state();
        if state.fail {
            return self.unavailable();
        }
        let Some(viewer) = state.viewer.as_mut() else {
            return Self::not_found("User");
        };
        viewer.profile_image = Some(image_url.to_string());
        Ok(viewer.clone())
    }

    async fn delete_account(&self, user_id: &UserId) -> ApiResult<()> {
        let mut state = self.state();
        if state.fail {
            return self.unavailable();
        }
        state.users.retain(|user| user.id != *user_id);
        state.deleted_accounts.push(user_id.clone());
        if state.viewer.as_ref().is_some_and(|viewer| viewer.id == *user_id) {
            state.viewer = None;
        }
        Ok(())
    }
}

impl AdminApi for FakeApi {
    async fn admin_users(&self) -> ApiResult<Vec<User>> {
        let state = self.state();
        if state.fail {
            return self.unavailable();
        }
        Ok(state.users.clone())
    }

    async fn admin_ban_user(&self, user_id: &UserId) -> ApiResult<User> {
        self.set_banned(user_id, true)
    }

    async fn admin_unban_user(&self, user_id: &UserId) -> ApiResult<User> {
        self.set_banned(user_id, false)
    }

    async fn admin_requests(&self) -> ApiResult<Vec<HelpRequest>> {
        let state = self.state();
        if state.fail {
            return self.unavailable();
        }
        Ok(state.requests.clone())
    }

    async fn admin_delete_request(&self, request_id: &RequestId) -> ApiResult<()> {
        let mut state = self.state();
        if state.fail {
            return self.unavailable();
        }
        let before = state.requests.len();
        state.requests.retain(|request| request.id != *request_id);
        if state.requests.len() == before {
            return Self::not_found("Request");
        }
        Ok(())
    }
}
