//! Configuration for the engine and the service around it

use crate::wait::WaitStrategyKind;
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Event-processing engine
    pub engine: EngineConfig,

    /// HTTP transport
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "transfer-processor".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            engine: EngineConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of ring slots (power of two)
    pub ring_capacity: usize,

    /// How the consumer waits for new sequences
    pub wait_strategy: WaitStrategyKind,

    /// Name of the consumer thread
    pub processor_thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 256,
            wait_strategy: WaitStrategyKind::BusySpin,
            processor_thread_name: "transfer-processor".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: String,

    /// Requests taking longer than this are answered with 408
    pub request_timeout_secs: u64,

    /// Maximum accepted request body
    pub max_body_bytes: usize,

    /// Emit logs as JSON
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 120,
            max_body_bytes: 4 * 1024 * 1024, // 4 MiB
            log_json: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> crate::Result<Self> {
        Config::default().with_env_overrides()
    }

    /// Apply `TRANSFER_*` environment variables on top of `self`
    pub fn with_env_overrides(mut self) -> crate::Result<Self> {
        if let Ok(capacity) = std::env::var("TRANSFER_RING_CAPACITY") {
            self.engine.ring_capacity = parse_env("TRANSFER_RING_CAPACITY", &capacity)?;
        }

        if let Ok(strategy) = std::env::var("TRANSFER_WAIT_STRATEGY") {
            self.engine.wait_strategy = strategy.parse().map_err(crate::Error::Config)?;
        }

        if let Ok(addr) = std::env::var("TRANSFER_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Ok(timeout) = std::env::var("TRANSFER_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs =
                parse_env("TRANSFER_REQUEST_TIMEOUT_SECS", &timeout)?;
        }

        if let Ok(json) = std::env::var("TRANSFER_LOG_JSON") {
            self.server.log_json = parse_env("TRANSFER_LOG_JSON", &json)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject settings the engine or server cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let capacity = self.engine.ring_capacity;
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(crate::Error::Config(format!(
                "engine.ring_capacity must be a power of two >= 2, got {}",
                capacity
            )));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "server.request_timeout_secs must be positive".to_string(),
            ));
        }

        if self.server.max_body_bytes == 0 {
            return Err(crate::Error::Config(
                "server.max_body_bytes must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| crate::Error::Config(format!("Invalid {}={}: {}", name, value, e)))
}
