use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::paths::config_file_path;

pub(crate) const ENV_REMOTE_URL: &str = "CINETRACK_REMOTE_URL";
pub(crate) const ENV_REMOTE_KEY: &str = "CINETRACK_REMOTE_KEY";
pub(crate) const ENV_PLAYER: &str = "CINETRACK_PLAYER";
pub(crate) const ENV_OPENER: &str = "CINETRACK_OPENER";

const DEFAULT_PLAYER: &str = "mpv";
#[cfg(target_os = "macos")]
const DEFAULT_OPENER: &str = "open";
#[cfg(not(target_os = "macos"))]
const DEFAULT_OPENER: &str = "xdg-open";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 15;

/// Settings read from `config.json`. Every field is optional; environment
/// variables win over the file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) remote_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) opener: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) connect_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) read_timeout_secs: Option<u64>,
}

/// Base URL and key of the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteSettings {
    pub(crate) url: String,
    pub(crate) api_key: String,
}

impl Config {
    pub(crate) fn load() -> Result<Self> {
        let path = config_file_path()?;
        let config = Self::from_file(&path)?;
        Ok(config.with_env_overrides(|name| std::env::var(name).ok()))
    }

    /// A missing file reads as the default config.
    pub(crate) fn from_file(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config at {}", path.display()));
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config at {}", path.display()))
    }

    pub(crate) fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(url) = lookup(ENV_REMOTE_URL) {
            self.remote_url = Some(url);
        }
        if let Some(key) = lookup(ENV_REMOTE_KEY) {
            self.remote_key = Some(key);
        }
        if let Some(player) = lookup(ENV_PLAYER) {
            self.player = Some(player);
        }
        if let Some(opener) = lookup(ENV_OPENER) {
            self.opener = Some(opener);
        }
        self
    }

    /// `None` unless both the URL and the key are set.
    pub(crate) fn remote(&self) -> Option<RemoteSettings> {
        let url = self.remote_url.as_deref().map(str::trim).filter(|url| !url.is_empty())?;
        let api_key = self.remote_key.as_deref().map(str::trim).filter(|key| !key.is_empty())?;
        Some(RemoteSettings {
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub(crate) fn player_bin(&self) -> &str {
        self.player.as_deref().unwrap_or(DEFAULT_PLAYER)
    }

    pub(crate) fn opener_bin(&self) -> &str {
        self.opener.as_deref().unwrap_or(DEFAULT_OPENER)
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS))
    }

    pub(crate) fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS))
    }
}
