use crate::common::{HelpRequest, User};
use crate::network::{AccountApi, ApiResult, MitzvotApi};
use crate::storage::SeenLedger;

/// Stars needed for the volunteer coupon.
pub const COUPON_STARS: u32 = 500;

/// The signed-in user's account page: profile, stars and requests.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountOverview {
    pub user: User,
    /// Requests the user created that are still open.
    pub open: Vec<HelpRequest>,
    /// Requests the user fulfilled for others.
    pub solved_for_others: Vec<HelpRequest>,
    /// The user's own requests that were completed.
    pub completed: Vec<HelpRequest>,
}

impl AccountOverview {
    pub async fn load<A: MitzvotApi>(api: &A) -> ApiResult<Self> {
        let (user, open, solved_for_others, completed) = futures::try_join!(
            api.me(),
            api.my_open_requests(),
            api.requests_i_solved(),
            api.my_completed_requests(),
        )?;
        Ok(Self {
            user,
            open,
            solved_for_others,
            completed,
        })
    }

    /// Fraction of the way to the coupon, capped at 1.0.
    pub fn stars_progress(&self) -> f32 {
        (self.user.stars as f32 / COUPON_STARS as f32).min(1.0)
    }

    pub fn coupon_unlocked(&self) -> bool {
        self.user.stars >= COUPON_STARS
    }

    pub fn stars_missing(&self) -> u32 {
        COUPON_STARS.saturating_sub(self.user.stars)
    }

    /// Open requests a helper has volunteered for; only these can be completed.
    pub fn completable(&self) -> impl Iterator<Item = &HelpRequest> {
        self.open.iter().filter(|request| request.has_helper())
    }

    /// Move a request the backend confirmed as fulfilled into `completed`,
    /// then reload the profile for its stars.
    pub async fn record_completion<A: MitzvotApi>(&mut self, api: &A, completed: HelpRequest) {
        self.open.retain(|request| request.id != completed.id);
        self.completed.retain(|request| request.id != completed.id);
        self.completed.insert(0, completed);

        match api.me().await {
            Ok(user) => self.user = user,
            Err(err) => log::warn!("Failed to refresh profile after completion: {err}"),
        }
    }

    pub async fn set_profile_image<A: AccountApi>(
        &mut self,
        api: &A,
        image_url: &str,
    ) -> ApiResult<()> {
        self.user = api.update_profile_image(image_url.trim()).await?;
        Ok(())
    }
}

/// Delete the signed-in account, then forget its local seen markers.
///
/// Returns the account that was removed.
pub async fn close_account<A: MitzvotApi + AccountApi>(
    api: &A,
    ledger: &SeenLedger,
) -> ApiResult<User> {
    let user = api.me().await?;
    api.delete_account(&user.id).await?;
    log::info!("Deleted account {}", user.id);
    if let Err(err) = ledger.clear() {
        log::warn!("Failed to clear seen markers of deleted account {}: {err}", user.id);
    }
    Ok(user)
}
