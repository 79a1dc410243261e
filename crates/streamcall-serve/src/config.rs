// ABOUTME: Server configuration loading for streamcall
// ABOUTME: TOML file with defaults for the listen address, tick stream and chat responder

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use streamcall_grpc::generator::{DEFAULT_PRICE_CEILING, DEFAULT_TICK_COUNT};
use streamcall_grpc::relay::DEFAULT_RESPONDER_NAME;
use streamcall_grpc::{TickerConfig, DEFAULT_CHANNEL_BUFFER};
use thiserror::Error;

/// Default gRPC listen address.
pub const DEFAULT_GRPC_ADDR: &str = "0.0.0.0:50051";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the streaming server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// gRPC listen address (default: 0.0.0.0:50051)
    pub grpc_addr: String,
    /// Buffer size of each call's outbound channel
    pub channel_buffer: usize,
    /// GetStockPrices settings
    pub ticker: TickerSettings,
    /// Chat settings
    pub chat: ChatSettings,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            grpc_addr: DEFAULT_GRPC_ADDR.to_string(),
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            ticker: TickerSettings::default(),
            chat: ChatSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerSettings {
    /// Ticks per call
    pub count: u32,
    /// Delay between ticks in milliseconds
    pub interval_ms: u64,
    /// Exclusive upper bound for prices
    pub price_ceiling: f32,
}

impl Default for TickerSettings {
    fn default() -> Self {
        Self {
            count: DEFAULT_TICK_COUNT,
            interval_ms: 1000,
            price_ceiling: DEFAULT_PRICE_CEILING,
        }
    }
}

impl TickerSettings {
    pub fn ticker_config(&self) -> TickerConfig {
        TickerConfig {
            count: self.count,
            interval: Duration::from_millis(self.interval_ms),
            price_ceiling: self.price_ceiling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Name the server signs chat replies with
    pub display_name: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            display_name: DEFAULT_RESPONDER_NAME.to_string(),
        }
    }
}

impl ServeConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.channel_buffer == 0 {
            return Err(ConfigError::Invalid(
                "channel_buffer must be at least 1".to_string(),
            ));
        }
        if !(self.ticker.price_ceiling > 0.0 && self.ticker.price_ceiling.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "ticker.price_ceiling must be a positive number, got {}",
                self.ticker.price_ceiling
            )));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.grpc_addr.parse().map_err(|e| {
            ConfigError::Invalid(format!("grpc_addr '{}': {}", self.grpc_addr, e))
        })
    }
}
