use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::DEFAULT_API_URL;
use crate::sync::SyncSettings;

pub const DEFAULT_CONFIG_PATH: &str = "config/client.json";
pub const API_URL_ENV: &str = "MITZVOT_API_URL";
pub const TOKEN_ENV: &str = "MITZVOT_TOKEN";

const DATABASE_FILE: &str = "client.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub data_dir: PathBuf,
    pub chat_poll_ms: u64,
    pub summary_poll_ms: u64,
    pub feed_poll_ms: u64,
    pub radius_km: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            data_dir: PathBuf::from("data"),
            chat_poll_ms: 800,
            summary_poll_ms: 3_000,
            feed_poll_ms: 15_000,
            radius_km: 5.0,
        }
    }
}

impl AppConfig {
    /// Apply `MITZVOT_API_URL` / `MITZVOT_TOKEN` from the environment (or `.env`).
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(env::var(API_URL_ENV).ok(), env::var(TOKEN_ENV).ok())
    }

    fn with_overrides(mut self, api_url: Option<String>, token: Option<String>) -> Self {
        if let Some(api_url) = api_url.filter(|value| !value.trim().is_empty()) {
            self.api_url = api_url;
        }
        if let Some(token) = token.filter(|value| !value.trim().is_empty()) {
            self.token = Some(token);
        }
        self
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            chat_poll: Duration::from_millis(self.chat_poll_ms.max(1)),
            summary_poll: Duration::from_millis(self.summary_poll_ms.max(1)),
            feed_poll: Duration::from_millis(self.feed_poll_ms.max(1)),
            radius_km: self.radius_km,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}
