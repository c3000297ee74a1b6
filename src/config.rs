//! Configuration for the wager engine and its API surface.
//!
//! TOML file with environment variable overrides and validation. The whole
//! config is an explicit value injected into the engine at construction,
//! so tests substitute fixtures instead of reading ambient globals.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub wager: WagerConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./fairline_data".to_string(),
        }
    }
}

/// Wager validation and fairness parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WagerConfig {
    /// House edge in basis points (100 = 1%).
    pub house_edge_bps: u64,
    /// Minimum stake in minor units (cents).
    pub min_stake_minor: u64,
    /// Maximum stake in minor units.
    pub max_stake_minor: u64,
    /// Fixed rate-limit window per user for mutating calls.
    pub rate_limit_window_ms: u64,
    /// Operational kill-switches, by mode name ("mines", "dice", ...).
    pub disabled_modes: Vec<String>,
}

impl Default for WagerConfig {
    fn default() -> Self {
        Self {
            house_edge_bps: 100,
            min_stake_minor: 10,           // 0.10
            max_stake_minor: 1_000_000,    // 10,000.00
            rate_limit_window_ms: 250,
            disabled_modes: vec![],
        }
    }
}

/// Bet feed channel thresholds and backlog depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Stake threshold (minor units) for the `high` channel.
    pub high_stake_minor: u64,
    /// Payout/stake threshold (basis points) for the `lucky` channel.
    pub lucky_multiplier_bps: u64,
    /// Settled bets replayed to a fresh subscriber.
    pub backlog: usize,
    /// Broadcast channel capacity per subscriber before lagging drops.
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            high_stake_minor: 10_000,      // 100.00
            lucky_multiplier_bps: 100_000, // 10x
            backlog: 30,
            channel_capacity: 256,
        }
    }
}

/// Configuration loader with environment variable support.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load from file (if any), apply env overrides, validate.
    pub fn load(&self) -> Result<EngineConfig, ConfigError> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            EngineConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<EngineConfig, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut EngineConfig) -> Result<(), ConfigError> {
        if let Ok(addr) = env::var("FAIRLINE_LISTEN_ADDRESS") {
            config.server.listen_address = addr;
        }
        if let Ok(port) = env::var("FAIRLINE_PORT") {
            config.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "FAIRLINE_PORT".to_string(),
                value: port,
                reason: "invalid port number".to_string(),
            })?;
        }
        if let Ok(data_dir) = env::var("FAIRLINE_DATA_DIR") {
            config.storage.data_dir = data_dir;
        }
        if let Ok(edge) = env::var("FAIRLINE_HOUSE_EDGE_BPS") {
            config.wager.house_edge_bps =
                edge.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "FAIRLINE_HOUSE_EDGE_BPS".to_string(),
                    value: edge,
                    reason: "invalid basis points value".to_string(),
                })?;
        }
        if let Ok(disabled) = env::var("FAIRLINE_DISABLED_MODES") {
            config.wager.disabled_modes = disabled
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        Ok(())
    }

    fn validate(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        if config.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                value: "0".to_string(),
                reason: "port cannot be zero".to_string(),
            });
        }
        if config.storage.data_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.data_dir".to_string(),
                value: String::new(),
                reason: "data dir cannot be empty".to_string(),
            });
        }
        if config.wager.house_edge_bps >= 10_000 {
            return Err(ConfigError::InvalidValue {
                field: "wager.house_edge_bps".to_string(),
                value: config.wager.house_edge_bps.to_string(),
                reason: "edge must be below 100%".to_string(),
            });
        }
        if config.wager.min_stake_minor == 0
            || config.wager.min_stake_minor > config.wager.max_stake_minor
        {
            return Err(ConfigError::InvalidValue {
                field: "wager.min_stake_minor".to_string(),
                value: config.wager.min_stake_minor.to_string(),
                reason: "min stake must be nonzero and not exceed max stake".to_string(),
            });
        }
        if config.feed.backlog == 0 || config.feed.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "feed.backlog".to_string(),
                value: config.feed.backlog.to_string(),
                reason: "feed backlog and capacity must be nonzero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(ConfigLoader::new().validate(&config).is_ok());
        assert_eq!(config.wager.house_edge_bps, 100);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn rejects_invalid_edge() {
        let mut config = EngineConfig::default();
        config.wager.house_edge_bps = 10_000;
        assert!(ConfigLoader::new().validate(&config).is_err());
    }

    #[test]
    fn rejects_inverted_stake_range() {
        let mut config = EngineConfig::default();
        config.wager.min_stake_minor = 2_000_000;
        assert!(ConfigLoader::new().validate(&config).is_err());
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[wager]\nhouse_edge_bps = 200\n\n[feed]\nbacklog = 10"
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_path(file.path())
            .load()
            .unwrap();

        assert_eq!(config.wager.house_edge_bps, 200);
        assert_eq!(config.feed.backlog, 10);
        // Untouched sections keep defaults.
        assert_eq!(config.server.port, 8080);
    }
}
