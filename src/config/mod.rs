//! Configuration system for pubsub-gateway.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Broker configuration.
    pub broker: BrokerConfig,
    /// Pull and acknowledgment configuration.
    pub pull: PullConfig,
    /// Push subscriber configuration.
    pub subscriber: SubscriberConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Gateway HTTP port.
    pub port: u16,
    /// Bind address.
    pub bind_address: String,
    /// Seconds to wait for in-flight requests on shutdown.
    pub shutdown_timeout_seconds: u64,
}

/// Broker backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BrokerConfig {
    /// In-process broker.
    InMemory {
        /// Lease duration handed out on pull.
        ack_deadline_seconds: u32,
    },
    /// Google Cloud Pub/Sub v1 REST API (or a compatible emulator).
    Http {
        /// Base URL, e.g. `http://localhost:8085`.
        endpoint: String,
        /// Project that owns topics and subscriptions.
        project_id: String,
        /// Per-request timeout.
        request_timeout_seconds: u64,
    },
}

/// Pull-merge coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullConfig {
    /// Batch size for single-subscription pulls.
    pub single_max_messages: u32,
    /// Batch size per subscription for merged pulls.
    pub merge_max_messages: u32,
    /// Upper bound on waiting for acknowledgment confirmation.
    pub ack_timeout_seconds: u64,
}

impl PullConfig {
    /// Acknowledgment timeout as a `Duration`.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_seconds)
    }
}

/// Push subscriber configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Maximum messages fetched per listener poll.
    pub max_messages_per_poll: u32,
    /// Delay between polls when a subscription is idle.
    pub poll_interval_ms: u64,
}

impl SubscriberConfig {
    /// Idle poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive.
    pub level: String,
    /// Log format (text or json).
    pub format: LogFormat,
}

/// Log format enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format.
    Text,
    /// JSON format.
    Json,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics.
    pub enabled: bool,
    /// Metrics port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "127.0.0.1".to_string(),
            shutdown_timeout_seconds: 5,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig::InMemory {
            ack_deadline_seconds: 10,
        }
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            single_max_messages: 10,
            merge_max_messages: 1000,
            ack_timeout_seconds: 30,
        }
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            max_messages_per_poll: 100,
            poll_interval_ms: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            broker: BrokerConfig::default(),
            pull: PullConfig::default(),
            subscriber: SubscriberConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file. Missing sections take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: GatewayConfig = toml::from_str(contents)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to render TOML: {}", e)))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.pull.single_max_messages == 0 || self.pull.merge_max_messages == 0 {
            return Err(Error::Config(
                "pull batch sizes must be greater than zero".to_string(),
            ));
        }
        if self.pull.ack_timeout_seconds == 0 {
            return Err(Error::Config(
                "pull.ack_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.subscriber.max_messages_per_poll == 0 {
            return Err(Error::Config(
                "subscriber.max_messages_per_poll must be greater than zero".to_string(),
            ));
        }
        match &self.broker {
            BrokerConfig::InMemory {
                ack_deadline_seconds,
            } => {
                if *ack_deadline_seconds == 0 {
                    return Err(Error::Config(
                        "broker.ack_deadline_seconds must be greater than zero".to_string(),
                    ));
                }
            }
            BrokerConfig::Http {
                endpoint,
                project_id,
                ..
            } => {
                if endpoint.is_empty() || project_id.is_empty() {
                    return Err(Error::Config(
                        "HTTP broker requires an endpoint and a project_id".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Gateway socket address as `host:port`.
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}
