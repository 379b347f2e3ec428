pub mod account;
pub mod admin;
pub mod chat_sync;
pub mod counterpart;
pub mod feed;
pub mod runtime;
pub mod sequencer;
pub mod summary_notifier;
pub mod task;

#[cfg(test)]
pub mod fake;

pub use account::{AccountOverview, COUPON_STARS, close_account};
pub use admin::AdminPanel;
pub use counterpart::{
    Counterpart, chat_partner_name, contact_for, resolve_counterpart, summary_counterpart,
};
pub use runtime::{SyncRuntime, SyncSettings, request_outcome};
