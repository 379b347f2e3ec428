pub mod client_db;
pub mod ledger;
pub mod models;

pub use client_db::ClientDatabase;
pub use ledger::SeenLedger;
pub use models::{MarkerKey, SeenMarker};

use std::fs;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode or decode seen markers: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("seen markers version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u64, supported: u32 },

    #[error("malformed seen markers: {0}")]
    Malformed(String),
}

/// Ensure data directory exists
pub fn ensure_data_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}
