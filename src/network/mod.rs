pub mod api;
pub mod client;
pub mod error;

pub use api::{AccountApi, AdminApi, MitzvotApi, PostedMessages};
pub use client::{DEFAULT_API_URL, HttpApi};
pub use error::{ApiError, ApiResult};
