use std::path::Path;

use reqwest::{Client, Method, RequestBuilder, StatusCode, multipart};
use serde::Deserialize;
use serde::de::{DeserializeOwned, Error as _};
use serde_json::{Value, json};

use crate::common::{
    Attachment, ChatId, ChatMessage, ChatSummary, GeoPoint, HelpRequest, LoginSession,
    NewRequest, Registration, RequestId, User, UserId,
};

use super::api::{AccountApi, AdminApi, MitzvotApi, PostedMessages, StartedChat};
use super::error::{ApiError, ApiResult};

pub const DEFAULT_API_URL: &str = "http://localhost:4000/api";

#[derive(Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    messages: Option<Vec<ChatMessage>>,
}

#[derive(Deserialize)]
struct PostEnvelope {
    #[serde(default)]
    messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatsEnvelope {
    #[serde(default)]
    chats: Option<Vec<ChatSummary>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartChatEnvelope {
    chat_id: ChatId,
    #[serde(default)]
    chat: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RequestEnvelope {
    request: HelpRequest,
}

#[derive(Deserialize)]
struct RequestsEnvelope {
    #[serde(default)]
    requests: Option<Vec<HelpRequest>>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    users: Option<Vec<User>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// `reqwest` implementation of the backend API.
#[derive(Clone)]
pub struct HttpApi {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }

    async fn requests_at(&self, path: &str) -> ApiResult<Vec<HelpRequest>> {
        let envelope: RequestsEnvelope = self.execute(self.request(Method::GET, path)).await?;
        Ok(envelope.requests.unwrap_or_default())
    }

    async fn patch_request(&self, path: &str) -> ApiResult<HelpRequest> {
        let envelope: RequestEnvelope = self.execute(self.request(Method::PATCH, path)).await?;
        Ok(envelope.request)
    }
}

/// Ban and unban answer with `{user}`, `{updatedUser}`, `{data}` or the bare
/// user, depending on the backend version.
fn moderated_user(mut body: Value) -> ApiResult<User> {
    let picked = ["user", "updatedUser", "data"].into_iter().find_map(|key| {
        body.get_mut(key)
            .filter(|value| !value.is_null())
            .map(Value::take)
    });
    Ok(serde_json::from_value(picked.unwrap_or(body))?)
}

fn error_message(body: &[u8], status: StatusCode) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

impl MitzvotApi for HttpApi {
    async fn fetch_messages(&self, chat_id: &ChatId) -> ApiResult<Vec<ChatMessage>> {
        let path = format!("chats/{chat_id}/messages");
        let envelope: MessagesEnvelope = self.execute(self.request(Method::GET, &path)).await?;
        Ok(envelope.messages.unwrap_or_default())
    }

    async fn post_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        attachments: &[Attachment],
    ) -> ApiResult<PostedMessages> {
        let path = format!("chats/{chat_id}/messages");
        let builder = self
            .request(Method::POST, &path)
            .json(&json!({ "text": text, "attachments": attachments }));
        let envelope: PostEnvelope = self.execute(builder).await?;

        match (envelope.messages, envelope.message) {
            (Some(messages), _) => Ok(PostedMessages::Thread(messages)),
            (None, Some(message)) => Ok(PostedMessages::Single(message)),
            (None, None) => Err(ApiError::MalformedPayload(serde_json::Error::custom(
                "post response has neither `messages` nor `message`",
            ))),
        }
    }

    async fn upload_attachment(&self, chat_id: &ChatId, path: &Path) -> ApiResult<Attachment> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ApiError::Attachment {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        let form =
            multipart::Form::new().part("file", multipart::Part::bytes(bytes).file_name(file_name));
        let route = format!("chats/{chat_id}/attachments");
        self.execute(self.request(Method::POST, &route).multipart(form))
            .await
    }

    async fn list_chat_summaries(&self) -> ApiResult<Vec<ChatSummary>> {
        let envelope: ChatsEnvelope = self
            .execute(self.request(Method::GET, "chats/my"))
            .await?;
        Ok(envelope.chats.unwrap_or_default())
    }

    async fn start_chat(&self, other_user: &UserId, request_id: &RequestId) -> ApiResult<StartedChat> {
        let builder = self
            .request(Method::POST, "chats/start")
            .json(&json!({ "otherUserId": other_user, "requestId": request_id }));
        let envelope: StartChatEnvelope = self.execute(builder).await?;

        let summary = envelope
            .chat
            .and_then(|chat| serde_json::from_value::<ChatSummary>(chat).ok());
        Ok(StartedChat {
            chat_id: envelope.chat_id,
            summary,
        })
    }

    async fn fetch_nearby_requests(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> ApiResult<Vec<HelpRequest>> {
        let builder = self.request(Method::GET, "requests/nearby").query(&[
            ("latitude", center.latitude.to_string()),
            ("longitude", center.longitude.to_string()),
            ("distanceInMeters", (radius_km * 1000.0).to_string()),
        ]);
        let envelope: RequestsEnvelope = self.execute(builder).await?;
        Ok(envelope.requests.unwrap_or_default())
    }

    async fn post_request(&self, request: &NewRequest) -> ApiResult<HelpRequest> {
        let envelope: RequestEnvelope = self
            .execute(self.request(Method::POST, "requests").json(request))
            .await?;
        Ok(envelope.request)
    }

    async fn mark_helper(&self, request_id: &RequestId) -> ApiResult<HelpRequest> {
        self.patch_request(&format!("requests/{request_id}/help"))
            .await
    }

    async fn mark_completed(&self, request_id: &RequestId) -> ApiResult<HelpRequest> {
        self.patch_request(&format!("requests/{request_id}/complete"))
            .await
    }

    async fn my_open_requests(&self) -> ApiResult<Vec<HelpRequest>> {
        self.requests_at("requests/my-open").await
    }

    async fn requests_i_solved(&self) -> ApiResult<Vec<HelpRequest>> {
        self.requests_at("requests/i-solved").await
    }

    async fn my_completed_requests(&self) -> ApiResult<Vec<HelpRequest>> {
        self.requests_at("requests/my-completed").await
    }

    async fn me(&self) -> ApiResult<User> {
        let envelope: UserEnvelope = self
            .execute(self.request(Method::GET, "users/me"))
            .await?;
        Ok(envelope.user)
    }
}

impl AccountApi for HttpApi {
    async fn login(&self, email: &str, password: &str) -> ApiResult<LoginSession> {
        let builder = self
            .request(Method::POST, "users/login")
            .json(&json!({ "email": email, "password": password }));
        self.execute(builder).await
    }

    async fn register(&self, registration: &Registration) -> ApiResult<User> {
        let envelope: UserEnvelope = self
            .execute(self.request(Method::POST, "users/register").json(registration))
            .await?;
        Ok(envelope.user)
    }

    async fn update_profile_image(&self, image_url: &str) -> ApiResult<User> {
        let builder = self
            .request(Method::PATCH, "users/profile-image")
            .json(&json!({ "profileImage": image_url }));
        let envelope: UserEnvelope = self.execute(builder).await?;
        Ok(envelope.user)
    }

    async fn delete_account(&self, user_id: &UserId) -> ApiResult<()> {
        let path = format!("users/delete/{user_id}");
        let _: Value = self.execute(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }
}

impl AdminApi for HttpApi {
    async fn admin_users(&self) -> ApiResult<Vec<User>> {
        let envelope: UsersEnvelope = self
            .execute(self.request(Method::GET, "admin/users"))
            .await?;
        Ok(envelope.users.unwrap_or_default())
    }

    async fn admin_ban_user(&self, user_id: &UserId) -> ApiResult<User> {
        let path = format!("admin/users/{user_id}/ban");
        moderated_user(self.execute(self.request(Method::PATCH, &path)).await?)
    }

    async fn admin_unban_user(&self, user_id: &UserId) -> ApiResult<User> {
        let path = format!("admin/users/{user_id}/unban");
        moderated_user(self.execute(self.request(Method::PATCH, &path)).await?)
    }

    async fn admin_requests(&self) -> ApiResult<Vec<HelpRequest>> {
        self.requests_at("admin/requests").await
    }

    async fn admin_delete_request(&self, request_id: &RequestId) -> ApiResult<()> {
        let path = format!("admin/requests/{request_id}");
        let _: Value = self.execute(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }
}
