//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     DUKAN_SERVER_URL=https://ledger.example.com                        │
//! │     DUKAN_DEVICE_ID=abc-123                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/dukan-pos/sync.toml (Linux)                              │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device_id, 30s interval, retry ceiling 5            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Counter 1"
//!
//! [server]
//! base_url = "https://ledger.example.com"
//!
//! [sync]
//! interval_secs = 30
//! batch_size = 100
//! retry_ceiling = 5
//! auth_pause_secs = 300
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name (e.g., "Counter 1").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "POS Counter".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Where the shared ledger lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the ledger API, e.g. `https://ledger.example.com`.
    #[serde(default)]
    pub base_url: Option<String>,
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between periodic sync triggers (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Maximum queue entries submitted per family per run.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Failed attempts before an entry is dead-lettered.
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: i64,

    /// Engine-wide cooldown after an authentication rejection (seconds).
    #[serde(default = "default_auth_pause")]
    pub auth_pause_secs: u64,

    /// Per-request HTTP timeout (seconds). A timeout is an ordinary
    /// transient failure, not a distinct case.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_interval() -> u64 {
    30
}
fn default_batch_size() -> usize {
    100
}
fn default_retry_ceiling() -> i64 {
    dukan_core::DEFAULT_RETRY_CEILING
}
fn default_auth_pause() -> u64 {
    300
}
fn default_request_timeout() -> u64 {
    15
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_secs: default_interval(),
            batch_size: default_batch_size(),
            retry_ceiling: default_retry_ceiling(),
            auth_pause_secs: default_auth_pause(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device-specific configuration.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Ledger server location.
    #[serde(default)]
    pub server: ServerConfig,

    /// Sync behavior settings.
    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        if let Some(ref url) = self.server.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(SyncError::InvalidConfig(format!(
                    "Server URL must start with http:// or https://, got: {}",
                    url
                )));
            }
        }

        if self.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if self.sync.retry_ceiling <= 0 {
            return Err(SyncError::InvalidConfig(
                "retry_ceiling must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("DUKAN_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("DUKAN_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(url) = std::env::var("DUKAN_SERVER_URL") {
            debug!(url = %url, "Overriding server URL from environment");
            self.server.base_url = Some(url);
        }

        if let Ok(interval) = std::env::var("DUKAN_SYNC_INTERVAL_SECS") {
            if let Ok(v) = interval.parse() {
                self.sync.interval_secs = v;
            }
        }

        if let Ok(ceiling) = std::env::var("DUKAN_RETRY_CEILING") {
            if let Ok(v) = ceiling.parse() {
                self.sync.retry_ceiling = v;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("pk", "dukan", "pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Returns the server URL if configured.
    pub fn server_url(&self) -> Option<&str> {
        self.server.base_url.as_deref()
    }

    /// Returns the periodic trigger interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    /// Returns the auth-failure cooldown window.
    pub fn auth_pause(&self) -> Duration {
        Duration::from_secs(self.sync.auth_pause_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert_eq!(config.sync.interval_secs, 30);
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.sync.retry_ceiling, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        // Empty device ID should fail
        config.device.id = String::new();
        assert!(config.validate().is_err());

        // Invalid URL should fail
        config.device.id = "test".to_string();
        config.server.base_url = Some("ws://invalid".to_string());
        assert!(config.validate().is_err());

        // Valid HTTP URL should pass
        config.server.base_url = Some("https://ledger.example.com".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[sync]"));
    }

    #[test]
    fn test_toml_partial_parse_applies_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [device]
            id = "dev-1"
            "#,
        )
        .unwrap();
        assert_eq!(config.device.id, "dev-1");
        assert_eq!(config.sync.batch_size, 100);
    }
}
