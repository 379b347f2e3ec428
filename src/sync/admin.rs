use thiserror::Error;

use crate::common::{HelpRequest, RequestId, User, UserId};
use crate::network::{AdminApi, ApiError, MitzvotApi};

const ADMIN_ROLE: &str = "admin";

pub fn is_admin(user: &User) -> bool {
    user.role.as_deref() == Some(ADMIN_ROLE)
}

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("you need the admin role for moderation")]
    NotAdmin,

    #[error("you cannot ban your own account")]
    SelfBan,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Moderation tools for a signed-in administrator.
///
/// Opening the panel checks the caller's role first so non-admins get a clear
/// error instead of whatever the backend answers.
pub struct AdminPanel<'a, A> {
    api: &'a A,
    admin: User,
}

impl<'a, A: MitzvotApi + AdminApi> AdminPanel<'a, A> {
    pub async fn open(api: &'a A) -> Result<Self, AdminError> {
        let admin = api.me().await?;
        if !is_admin(&admin) {
            log::warn!("User {} asked for moderation without the admin role", admin.id);
            return Err(AdminError::NotAdmin);
        }
        Ok(Self { api, admin })
    }

    pub async fn users(&self) -> Result<Vec<User>, AdminError> {
        Ok(self.api.admin_users().await?)
    }

    pub async fn set_banned(&self, user_id: &UserId, banned: bool) -> Result<User, AdminError> {
        if banned && *user_id == self.admin.id {
            return Err(AdminError::SelfBan);
        }
        let user = if banned {
            self.api.admin_ban_user(user_id).await?
        } else {
            self.api.admin_unban_user(user_id).await?
        };
        log::info!("User {user_id} banned: {}", user.is_banned);
        Ok(user)
    }

    pub async fn requests(&self) -> Result<Vec<HelpRequest>, AdminError> {
        Ok(self.api.admin_requests().await?)
    }

    pub async fn delete_request(&self, request_id: &RequestId) -> Result<(), AdminError> {
        self.api.admin_delete_request(request_id).await?;
        log::info!("Deleted request {request_id}");
        Ok(())
    }
}

/// One line per account for the moderation listing.
pub fn render_user(user: &User) -> String {
    let status = if user.is_banned { "BANNED" } else { "active" };
    format!(
        "[{}] {} <{}> role: {} · {status}",
        user.id,
        user.name.as_deref().unwrap_or("(no name)"),
        user.email.as_deref().unwrap_or("-"),
        user.role.as_deref().unwrap_or("user"),
    )
}

pub fn render_request(request: &HelpRequest) -> String {
    let creator = request
        .created_by
        .as_ref()
        .and_then(|creator| creator.display_name())
        .unwrap_or("Unknown");
    let completed = if request.is_completed { "yes" } else { "no" };
    format!(
        "[{}] {} · creator: {creator} · completed: {completed}",
        request.id, request.title
    )
}
