//! Message broker client abstraction and implementations.
//!
//! The gateway talks to the messaging service only through [`MessageBroker`].
//! Two implementations ship with the crate:
//! - [`memory::InMemoryBroker`]: in-process topics and subscriptions with
//!   leases and redelivery on lease expiry
//! - [`http::HttpBroker`]: Google Cloud Pub/Sub v1 REST client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{BrokerConfig, GatewayConfig};
use crate::types::{AckHandle, Attributes, LeasedMessage, MessageId};
use crate::Result;

pub mod http;
pub mod lease;
pub mod listener;
pub mod memory;

pub use listener::{AckReply, ListenerOptions, MessageHandler, SubscriberTask};

/// Broker health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Broker is healthy.
    Healthy,
    /// Broker is unhealthy.
    Unhealthy(String),
}

/// Message broker client.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Create a topic.
    async fn create_topic(&self, topic: &str) -> Result<()>;

    /// Create a subscription bound to a topic.
    async fn create_subscription(&self, subscription: &str, topic: &str) -> Result<()>;

    /// Delete a topic.
    async fn delete_topic(&self, topic: &str) -> Result<()>;

    /// Delete a subscription.
    async fn delete_subscription(&self, subscription: &str) -> Result<()>;

    /// Publish one message and return its broker identity.
    async fn publish(&self, topic: &str, data: Vec<u8>, attributes: Attributes)
        -> Result<MessageId>;

    /// Lease up to `max_messages` messages from a subscription.
    async fn pull(
        &self,
        subscription: &str,
        max_messages: u32,
        return_immediately: bool,
    ) -> Result<Vec<LeasedMessage>>;

    /// Acknowledge a batch of leases. Fails if any lease is rejected.
    async fn acknowledge(&self, handles: &[AckHandle]) -> Result<()>;

    /// Change the lease deadline of a batch; `0` releases the leases.
    async fn modify_ack_deadline(&self, handles: &[AckHandle], ack_deadline_seconds: u32)
        -> Result<()>;

    /// Start a background listener that feeds every delivered message to `handler`.
    async fn push_subscribe(
        &self,
        subscription: &str,
        handler: MessageHandler,
    ) -> Result<SubscriberTask>;

    /// Health check.
    async fn health_check(&self) -> Result<HealthStatus>;
}

/// Shared broker reference used across the gateway.
pub type SharedBroker = Arc<dyn MessageBroker>;

/// Build the broker selected by the configuration.
pub fn connect(config: &GatewayConfig) -> Result<SharedBroker> {
    let listener = ListenerOptions {
        max_messages: config.subscriber.max_messages_per_poll,
        poll_interval: config.subscriber.poll_interval(),
    };

    match &config.broker {
        BrokerConfig::InMemory {
            ack_deadline_seconds,
        } => {
            info!(ack_deadline_seconds, "Using in-memory broker");
            Ok(Arc::new(memory::InMemoryBroker::with_config(
                memory::InMemoryBrokerConfig {
                    ack_deadline_seconds: *ack_deadline_seconds,
                    listener,
                },
            )))
        }
        BrokerConfig::Http {
            endpoint,
            project_id,
            request_timeout_seconds,
        } => {
            info!(endpoint = %endpoint, project_id = %project_id, "Using Pub/Sub REST broker");
            Ok(Arc::new(http::HttpBroker::new(http::HttpBrokerConfig {
                endpoint: endpoint.clone(),
                project_id: project_id.clone(),
                request_timeout: Duration::from_secs(*request_timeout_seconds),
                listener,
            })?))
        }
    }
}
