use std::future::Future;
use std::path::Path;

use crate::common::{
    Attachment, ChatId, ChatMessage, ChatSummary, GeoPoint, HelpRequest, LoginSession,
    NewRequest, Registration, RequestId, User, UserId,
};

use super::error::ApiResult;

/// Result of posting a message: the backend answers either with the full
/// thread or with just the stored message.
#[derive(Debug, Clone, PartialEq)]
pub enum PostedMessages {
    Thread(Vec<ChatMessage>),
    Single(ChatMessage),
}

/// A chat returned by `start_chat`.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedChat {
    pub chat_id: ChatId,
    pub summary: Option<ChatSummary>,
}

/// The REST backend, as seen by the sync layer.
pub trait MitzvotApi: Send + Sync + 'static {
    fn fetch_messages(
        &self,
        chat_id: &ChatId,
    ) -> impl Future<Output = ApiResult<Vec<ChatMessage>>> + Send;

    fn post_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        attachments: &[Attachment],
    ) -> impl Future<Output = ApiResult<PostedMessages>> + Send;

    fn upload_attachment(
        &self,
        chat_id: &ChatId,
        path: &Path,
    ) -> impl Future<Output = ApiResult<Attachment>> + Send;

    fn list_chat_summaries(&self) -> impl Future<Output = ApiResult<Vec<ChatSummary>>> + Send;

    fn start_chat(
        &self,
        other_user: &UserId,
        request_id: &RequestId,
    ) -> impl Future<Output = ApiResult<StartedChat>> + Send;

    fn fetch_nearby_requests(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> impl Future<Output = ApiResult<Vec<HelpRequest>>> + Send;

    fn post_request(
        &self,
        request: &NewRequest,
    ) -> impl Future<Output = ApiResult<HelpRequest>> + Send;

    /// "I want to help": the caller becomes the request's helper.
    fn mark_helper(
        &self,
        request_id: &RequestId,
    ) -> impl Future<Output = ApiResult<HelpRequest>> + Send;

    /// The creator confirms the request was fulfilled.
    fn mark_completed(
        &self,
        request_id: &RequestId,
    ) -> impl Future<Output = ApiResult<HelpRequest>> + Send;

    fn my_open_requests(&self) -> impl Future<Output = ApiResult<Vec<HelpRequest>>> + Send;

    fn requests_i_solved(&self) -> impl Future<Output = ApiResult<Vec<HelpRequest>>> + Send;

    fn my_completed_requests(&self)
    -> impl Future<Output = ApiResult<Vec<HelpRequest>>> + Send;

    fn me(&self) -> impl Future<Output = ApiResult<User>> + Send;
}

/// Account endpoints used outside the sync loops: sign-in, registration and
/// self-service profile changes.
pub trait AccountApi: Send + Sync {
    fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = ApiResult<LoginSession>> + Send;

    fn register(&self, registration: &Registration)
    -> impl Future<Output = ApiResult<User>> + Send;

    /// Returns the updated profile.
    fn update_profile_image(&self, image_url: &str)
    -> impl Future<Output = ApiResult<User>> + Send;

    /// Permanently removes the signed-in user's account.
    fn delete_account(&self, user_id: &UserId) -> impl Future<Output = ApiResult<()>> + Send;
}

/// Moderation endpoints; the backend rejects callers without the admin role.
pub trait AdminApi: Send + Sync {
    fn admin_users(&self) -> impl Future<Output = ApiResult<Vec<User>>> + Send;

    fn admin_ban_user(&self, user_id: &UserId) -> impl Future<Output = ApiResult<User>> + Send;

    fn admin_unban_user(&self, user_id: &UserId)
    -> impl Future<Output = ApiResult<User>> + Send;

    fn admin_requests(&self) -> impl Future<Output = ApiResult<Vec<HelpRequest>>> + Send;

    fn admin_delete_request(
        &self,
        request_id: &RequestId,
    ) -> impl Future<Output = ApiResult<()>> + Send;
}
