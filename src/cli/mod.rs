// CLI module for pubsub-gateway
/// Command execution handlers
pub mod commands;
/// Output formatting utilities
pub mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line interface for pubsub-gateway
#[derive(Parser)]
#[command(name = "pubsub-gateway")]
#[command(author, version, about = "HTTP gateway over a publish/subscribe broker", long_about = None)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Broker backend selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrokerKind {
    /// In-process broker
    Memory,
    /// Pub/Sub REST API
    Http,
}

/// Flags that override the configuration file
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file (TOML)
    #[arg(long, short, env = "GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Gateway HTTP port
    #[arg(long, env = "GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Bind address (use 0.0.0.0 for all interfaces)
    #[arg(long, env = "GATEWAY_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Metrics port
    #[arg(long, env = "GATEWAY_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Broker backend
    #[arg(long, env = "GATEWAY_BROKER", value_enum)]
    pub broker: Option<BrokerKind>,

    /// Pub/Sub REST endpoint (http broker only)
    #[arg(long, env = "GATEWAY_BROKER_ENDPOINT")]
    pub broker_endpoint: Option<String>,

    /// Pub/Sub project id (http broker only)
    #[arg(long, env = "GATEWAY_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Acknowledgment timeout in seconds
    #[arg(long, env = "GATEWAY_ACK_TIMEOUT")]
    pub ack_timeout_seconds: Option<u64>,

    /// Log level or filter directive
    #[arg(long, env = "GATEWAY_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway
    Start(ConfigArgs),

    /// List push subscribers of a running gateway
    Subscribers {
        /// Gateway URL
        #[arg(long, env = "GATEWAY_URL", default_value = "http://localhost:8080")]
        gateway_url: String,

        /// Output format (table | json)
        #[arg(long, short, default_value = "table")]
        format: String,
    },

    /// Health check
    Health {
        /// Gateway URL
        #[arg(long, env = "GATEWAY_URL", default_value = "http://localhost:8080")]
        gateway_url: String,
    },

    /// Show the effective configuration
    Config(ConfigArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
