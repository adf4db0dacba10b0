//! Updater configuration.
//!
//! Layering: defaults, then a JSON file (`from_file`) or `UPDATER_*`
//! environment variables (`from_env`). Binaries apply their own flags on top
//! and call [`UpdaterConfig::validate`] before building an engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Result, UpdaterError};

/// Default poll interval: 30 minutes.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30 * 60 * 1000;

/// Default bound on a single subscriber callback.
pub const DEFAULT_CALLBACK_TIMEOUT_MS: u64 = 60 * 1000;

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".updater";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Period between poll cycles. Must be non-zero.
    pub poll_interval_ms: u64,
    /// Market index URL (`http` or `https`).
    pub catalog_endpoint: String,
    /// Enforce per-registration policies.
    ///
    /// When off, delivery is unrestricted but there are no automatic installs:
    /// every bound callback receives its events, and install requests from
    /// callbacks are refused regardless of `allow_install`. Explicit
    /// installs only need the registration's token.
    pub enable_permission_system: bool,
    /// A callback still pending after this long is abandoned and counted as
    /// failed. `0` disables the bound.
    pub callback_timeout_ms: u64,
    /// Passed through to the installer on every flush.
    pub strict_install: bool,
    pub data_dir: PathBuf,
    /// Save snapshot and policies to `data_dir`.
    pub persist: bool,
    pub request_timeout_secs: u64,
    /// External install command, e.g. `"npm install"`. `None` means dry run.
    pub installer_command: Option<String>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            catalog_endpoint: registry_client::DEFAULT_ENDPOINT.to_string(),
            enable_permission_system: true,
            callback_timeout_ms: DEFAULT_CALLBACK_TIMEOUT_MS,
            strict_install: false,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            persist: true,
            request_timeout_secs: registry_client::DEFAULT_TIMEOUT_SECS,
            installer_command: None,
        }
    }
}

impl UpdaterConfig {
    /// Defaults overridden by `UPDATER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `UPDATER_*` key. Unparseable values are configuration errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("UPDATER_POLL_INTERVAL_MS") {
            config.poll_interval_ms = parse_u64("UPDATER_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("UPDATER_CATALOG_ENDPOINT") {
            config.catalog_endpoint = raw;
        }
        if let Some(raw) = lookup("UPDATER_ENABLE_PERMISSION_SYSTEM") {
            config.enable_permission_system = parse_bool("UPDATER_ENABLE_PERMISSION_SYSTEM", &raw)?;
        }
        if let Some(raw) = lookup("UPDATER_CALLBACK_TIMEOUT_MS") {
            config.callback_timeout_ms = parse_u64("UPDATER_CALLBACK_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("UPDATER_STRICT_INSTALL") {
            config.strict_install = parse_bool("UPDATER_STRICT_INSTALL", &raw)?;
        }
        if let Some(raw) = lookup("UPDATER_DATA_DIR") {
            config.data_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("UPDATER_PERSIST") {
            config.persist = parse_bool("UPDATER_PERSIST", &raw)?;
        }
        if let Some(raw) = lookup("UPDATER_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_u64("UPDATER_REQUEST_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("UPDATER_INSTALLER_COMMAND") {
            let raw = raw.trim();
            config.installer_command = (!raw.is_empty()).then(|| raw.to_string());
        }

        Ok(config)
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(UpdaterError::InvalidConfig(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if !(self.catalog_endpoint.starts_with("http://")
            || self.catalog_endpoint.starts_with("https://"))
        {
            return Err(UpdaterError::InvalidConfig(format!(
                "catalog_endpoint must be an http(s) URL, got {:?}",
                self.catalog_endpoint
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn callback_timeout(&self) -> Option<Duration> {
        (self.callback_timeout_ms > 0).then(|| Duration::from_millis(self.callback_timeout_ms))
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| UpdaterError::InvalidConfig(format!("{key}: expected an integer, got {raw:?}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(UpdaterError::InvalidConfig(format!(
            "{key}: expected a boolean, got {raw:?}"
        ))),
    }
}
