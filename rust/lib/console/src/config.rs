//! Console configuration.
//!
//! Reads/writes `~/.ims/config.toml`. Every field has a default, so a
//! missing file or a partial one both load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ims_client::PushConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConsoleError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_PUSH_URL: &str = "ws://localhost:5000/ws";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConsoleConfig {
    /// REST API root.
    pub api_base_url: String,

    /// Websocket endpoint of the push channel. Empty disables push.
    pub push_url: String,

    /// Where local storage lives. Defaults to `~/.ims`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Token refresh endpoint, relative to `api-base-url`. When unset a 401
    /// ends the session immediately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_path: Option<String>,

    /// Enforce the roles/permissions declared on routes.
    pub enforce_route_access: bool,

    /// Route authenticated users land on.
    pub landing_route: String,

    pub request_timeout_secs: u64,

    pub notifications: NotificationSettings,

    pub push: PushSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NotificationSettings {
    /// Page size of the initial fetch.
    pub page_size: usize,
    /// Upper bound on the locally mirrored list.
    pub max_retained: usize,
    /// Non-looping sounds are stopped after this many seconds.
    pub sound_ceiling_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PushSettings {
    pub reconnection_attempts: u32,
    pub reconnection_delay_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            push_url: DEFAULT_PUSH_URL.to_string(),
            data_dir: None,
            refresh_path: None,
            enforce_route_access: false,
            landing_route: crate::guard::LANDING.to_string(),
            request_timeout_secs: 30,
            notifications: NotificationSettings::default(),
            push: PushSettings::default(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            max_retained: 100,
            sound_ceiling_secs: 5,
        }
    }
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            reconnection_attempts: 5,
            reconnection_delay_ms: 1000,
            connect_timeout_secs: 20,
        }
    }
}

impl ConsoleConfig {
    /// Default config file path: ~/.ims/config.toml.
    pub fn default_path() -> PathBuf {
        home_dir().join("config.toml")
    }

    /// Load config from disk, or return default if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, ConsoleError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ConsoleError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConsoleError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ConsoleError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(home_dir)
    }

    /// Path of the local storage database.
    pub fn storage_path(&self) -> PathBuf {
        self.data_dir().join("storage.redb")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sound_ceiling(&self) -> Duration {
        Duration::from_secs(self.notifications.sound_ceiling_secs)
    }

    pub fn push_config(&self) -> PushConfig {
        PushConfig {
            reconnection_attempts: self.push.reconnection_attempts,
            reconnection_delay: Duration::from_millis(self.push.reconnection_delay_ms),
            connect_timeout: Duration::from_secs(self.push.connect_timeout_secs),
            ..PushConfig::new(self.push_url.clone())
        }
    }
}

/// The IMS config directory (~/.ims).
fn home_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".ims")
}
