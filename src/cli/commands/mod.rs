// Commands module
/// Start command implementation
pub mod start;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::cli::{output::*, BrokerKind, Commands, ConfigArgs};
use crate::config::{BrokerConfig, GatewayConfig};
use crate::server::gateway::HealthResponse;

const DEFAULT_BROKER_ENDPOINT: &str = "http://localhost:8085";
const DEFAULT_PROJECT_ID: &str = "local-project";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Subscriber row as listed by the gateway
#[derive(Debug, Serialize, Deserialize, Tabled)]
struct SubscriberRow {
    id: String,
    subscription: String,
    state: String,
    created_at: String,
    messages_delivered: u64,
    messages_acked: u64,
}

/// Execute a CLI command
pub async fn execute_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Start(args) => {
            let config = load_config(&args)?;
            start::execute(config).await
        }
        Commands::Subscribers {
            gateway_url,
            format,
        } => execute_subscribers(gateway_url, format).await,
        Commands::Health { gateway_url } => execute_health(gateway_url).await,
        Commands::Config(args) => execute_config(&args),
    }
}

/// Load the configuration file (if any) and apply command-line overrides.
pub fn load_config(args: &ConfigArgs) -> anyhow::Result<GatewayConfig> {
    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => GatewayConfig::default(),
    };
    apply_overrides(&mut config, args);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut GatewayConfig, args: &ConfigArgs) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }
    if let Some(metrics_port) = args.metrics_port {
        config.metrics.port = metrics_port;
    }
    if let Some(ack_timeout) = args.ack_timeout_seconds {
        config.pull.ack_timeout_seconds = ack_timeout;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    match args.broker {
        Some(BrokerKind::Memory) => {
            if !matches!(config.broker, BrokerConfig::InMemory { .. }) {
                config.broker = BrokerConfig::default();
            }
        }
        Some(BrokerKind::Http) => {
            if !matches!(config.broker, BrokerConfig::Http { .. }) {
                config.broker = BrokerConfig::Http {
                    endpoint: DEFAULT_BROKER_ENDPOINT.to_string(),
                    project_id: DEFAULT_PROJECT_ID.to_string(),
                    request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
                };
            }
        }
        None => {}
    }

    if let BrokerConfig::Http {
        endpoint,
        project_id,
        ..
    } = &mut config.broker
    {
        if let Some(e) = &args.broker_endpoint {
            *endpoint = e.clone();
        }
        if let Some(p) = &args.project_id {
            *project_id = p.clone();
        }
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(url: &str) -> anyhow::Result<T> {
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .context("Failed to connect to gateway")?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        anyhow::bail!("API error ({}): {}", status, error_text);
    }

    response.json().await.context("Failed to parse response")
}

async fn execute_subscribers(gateway_url: String, format: String) -> anyhow::Result<()> {
    let url = format!("{}/subscribers", gateway_url.trim_end_matches('/'));
    let subscribers: Vec<SubscriberRow> = get_json(&url).await?;

    print_list(&subscribers, OutputFormat::parse(&format))?;
    Ok(())
}

async fn execute_health(gateway_url: String) -> anyhow::Result<()> {
    let url = format!("{}/health", gateway_url.trim_end_matches('/'));
    let health: HealthResponse = get_json(&url).await?;

    if health.status == "healthy" {
        print_success(&format!("Gateway is {}", health.status));
        print_info(&format!("Broker: {}", health.broker_status));
    } else {
        print_error(&format!("Gateway is {}", health.status));
        print_warning(&format!("Broker: {}", health.broker_status));
    }
    print_info(&format!("Active subscribers: {}", health.active_subscribers));

    Ok(())
}

fn execute_config(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args)?;
    println!("{}", config.to_toml_string()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_flags() {
        let config = load_config(&ConfigArgs::default()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(matches!(config.broker, BrokerConfig::InMemory { .. }));
    }

    #[test]
    fn test_flags_override_config() {
        let args = ConfigArgs {
            port: Some(9999),
            ack_timeout_seconds: Some(3),
            broker: Some(BrokerKind::Http),
            project_id: Some("p1".to_string()),
            ..ConfigArgs::default()
        };
        let config = load_config(&args).unwrap();

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.pull.ack_timeout_seconds, 3);
        match config.broker {
            BrokerConfig::Http {
                endpoint,
                project_id,
                ..
            } => {
                assert_eq!(endpoint, DEFAULT_BROKER_ENDPOINT);
                assert_eq!(project_id, "p1");
            }
            other => panic!("unexpected broker config: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = ConfigArgs {
            ack_timeout_seconds: Some(0),
            ..ConfigArgs::default()
        };
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_subscriber_row_parses_gateway_listing() {
        let json = r#"[{"id":"0b6c3d1e-9a56-4d9b-8f59-2f4c7a0f1c11","subscription":"sub-a","state":"running","created_at":"2024-01-01T00:00:00Z","messages_delivered":3,"messages_acked":3}]"#;
        let rows: Vec<SubscriberRow> = serde_json::from_str(json).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, "running");
    }
}
