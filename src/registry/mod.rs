//! Registry of push subscribers.
//!
//! Every successful subscribe appends one entry. Entries are never removed:
//! stopping a subscriber cancels its listener and leaves the entry behind in
//! the `stopped` state, so the registry doubles as a record of what ran.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::broker::listener::ListenerStats;
use crate::broker::{AckReply, MessageHandler, SharedBroker, SubscriberTask};
use crate::metrics::get_metrics;
use crate::types::validation::validate_subscription_name;
use crate::types::LeasedMessage;
use crate::{Error, Result};

/// Opaque identifier of a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        SubscriberId(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriberId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(SubscriberId)
            .map_err(|_| Error::SubscriberNotFound(s.to_string()))
    }
}

/// Lifecycle state of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberState {
    /// Listener is consuming its subscription.
    Running,
    /// Listener was stopped or exited on its own.
    Stopped,
}

impl std::fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriberState::Running => write!(f, "running"),
            SubscriberState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberInfo {
    /// Subscriber id.
    pub id: SubscriberId,
    /// Subscription consumed.
    pub subscription: String,
    /// Current state.
    pub state: SubscriberState,
    /// When the subscriber was registered.
    pub created_at: DateTime<Utc>,
    /// Messages handed to the callback.
    pub messages_delivered: u64,
    /// Messages acknowledged.
    pub messages_acked: u64,
}

struct RegistryEntry {
    id: SubscriberId,
    subscription: String,
    created_at: DateTime<Utc>,
    stats: Arc<ListenerStats>,
    /// `None` once stopped.
    task: Option<SubscriberTask>,
}

impl RegistryEntry {
    fn state(&self) -> SubscriberState {
        match &self.task {
            Some(task) if task.is_running() => SubscriberState::Running,
            _ => SubscriberState::Stopped,
        }
    }

    fn info(&self) -> SubscriberInfo {
        SubscriberInfo {
            id: self.id,
            subscription: self.subscription.clone(),
            state: self.state(),
            created_at: self.created_at,
            messages_delivered: self.stats.delivered(),
            messages_acked: self.stats.acked(),
        }
    }
}

/// Process-wide registry of push subscribers.
pub struct SubscriberRegistry {
    broker: SharedBroker,
    entries: RwLock<Vec<RegistryEntry>>,
    closed: AtomicBool,
}

impl SubscriberRegistry {
    /// Create an empty registry over `broker`.
    pub fn new(broker: SharedBroker) -> Self {
        Self {
            broker,
            entries: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Start a subscriber that acknowledges every message it receives.
    ///
    /// Nothing is registered if the broker refuses the subscription.
    pub async fn subscribe(&self, subscription: &str) -> Result<SubscriberId> {
        let ack_all: MessageHandler = Arc::new(|_: &LeasedMessage| AckReply::Ack);
        self.subscribe_with(subscription, ack_all).await
    }

    /// Start a subscriber with a custom message handler.
    ///
    /// Fails with [`Error::RegistryClosed`] once [`shutdown`](Self::shutdown)
    /// has run.
    pub async fn subscribe_with(
        &self,
        subscription: &str,
        handler: MessageHandler,
    ) -> Result<SubscriberId> {
        let metrics = get_metrics();
        validate_subscription_name(subscription)?;
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::RegistryClosed);
        }

        let task = match self.broker.push_subscribe(subscription, handler).await {
            Ok(task) => task,
            Err(e) => {
                metrics
                    .subscribe_requests_total
                    .with_label_values(&["failed"])
                    .inc();
                return Err(e);
            }
        };

        let entry = RegistryEntry {
            id: SubscriberId::new(),
            subscription: subscription.to_string(),
            created_at: Utc::now(),
            stats: task.stats(),
            task: Some(task),
        };
        let id = entry.id;
        {
            // Checked again under the lock: shutdown may have run while the
            // broker call was in flight.
            let mut entries = self.entries.write().await;
            if self.closed.load(Ordering::Acquire) {
                drop(entries);
                if let Some(task) = entry.task {
                    task.stop().await;
                }
                return Err(Error::RegistryClosed);
            }
            entries.push(entry);
        }

        metrics
            .subscribe_requests_total
            .with_label_values(&["subscribed"])
            .inc();
        info!(subscriber_id = %id, subscription = %subscription, "Subscriber registered");
        Ok(id)
    }

    /// Snapshot of all entries in registration order.
    pub async fn list(&self) -> Vec<SubscriberInfo> {
        self.entries
            .read()
            .await
            .iter()
            .map(RegistryEntry::info)
            .collect()
    }

    /// Snapshot of one entry.
    pub async fn get(&self, id: SubscriberId) -> Result<SubscriberInfo> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .map(RegistryEntry::info)
            .ok_or_else(|| Error::SubscriberNotFound(id.to_string()))
    }

    /// Number of entries, stopped ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing was ever registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Number of entries whose listener is running.
    pub async fn running(&self) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.state() == SubscriberState::Running)
            .count()
    }

    /// Stop one subscriber and wait for its listener to exit.
    ///
    /// Stopping an already stopped subscriber is a no-op.
    pub async fn stop(&self, id: SubscriberId) -> Result<()> {
        let task = {
            let mut entries = self.entries.write().await;
            let entry = entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| Error::SubscriberNotFound(id.to_string()))?;
            entry.task.take()
        };

        if let Some(task) = task {
            task.stop().await;
            info!(subscriber_id = %id, "Subscriber stopped");
        }
        Ok(())
    }

    /// Stop every running subscriber and refuse new ones from now on.
    pub async fn shutdown(&self) {
        let tasks: Vec<SubscriberTask> = {
            let mut entries = self.entries.write().await;
            self.closed.store(true, Ordering::Release);
            entries.iter_mut().filter_map(|e| e.task.take()).collect()
        };

        let count = tasks.iter().filter(|t| t.is_running()).count();
        join_all(tasks.into_iter().map(SubscriberTask::stop)).await;
        info!("Stopped {} subscriber(s)", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::InMemoryBroker;
    use crate::broker::MessageBroker;

    async fn registry_with_subscription() -> (InMemoryBroker, SubscriberRegistry) {
        let broker = InMemoryBroker::new();
        broker.create_topic("docs").await.unwrap();
        broker.create_subscription("sub-a", "docs").await.unwrap();
        let registry = SubscriberRegistry::new(Arc::new(broker.clone()));
        (broker, registry)
    }

    #[tokio::test]
    async fn test_subscribe_appends_entry() {
        let (_broker, registry) = registry_with_subscription().await;

        let id = registry.subscribe("sub-a").await.unwrap();

        let entries = registry.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].subscription, "sub-a");
        assert_eq!(entries[0].state, SubscriberState::Running);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_subscribe_appends_nothing() {
        let (_broker, registry) = registry_with_subscription().await;

        let result = registry.subscribe("missing").await;
        assert!(matches!(result, Err(Error::SubscriptionNotFound(_))));
        assert!(registry.is_empty().await);

        assert!(registry.subscribe("").await.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_stop_keeps_entry_as_stopped() {
        let (_broker, registry) = registry_with_subscription().await;
        let id = registry.subscribe("sub-a").await.unwrap();

        registry.stop(id).await.unwrap();
        let info = registry.get(id).await.unwrap();
        assert_eq!(info.state, SubscriberState::Stopped);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.running().await, 0);

        // Second stop is a no-op.
        registry.stop(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_unknown_id() {
        let (_broker, registry) = registry_with_subscription().await;
        let unknown: SubscriberId = Uuid::new_v4().to_string().parse().unwrap();
        assert!(matches!(
            registry.stop(unknown).await,
            Err(Error::SubscriberNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_subscriber_id_parsing() {
        assert!("not-a-uuid".parse::<SubscriberId>().is_err());
        let id = SubscriberId::new();
        assert_eq!(id.to_string().parse::<SubscriberId>().unwrap(), id);
    }

    #[tokio::test]
    async fn test_shutdown_stops_all() {
        let (_broker, registry) = registry_with_subscription().await;
        registry.subscribe("sub-a").await.unwrap();
        registry.subscribe("sub-a").await.unwrap();
        assert_eq!(registry.running().await, 2);

        registry.shutdown().await;

        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.running().await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_is_refused() {
        let (broker, registry) = registry_with_subscription().await;
        registry.shutdown().await;

        let result = registry.subscribe("sub-a").await;

        assert!(matches!(result, Err(Error::RegistryClosed)));
        assert!(registry.is_empty().await);
        let stats = broker.subscription_stats("sub-a").await.unwrap();
        assert_eq!(stats.leased, 0);
    }
}
