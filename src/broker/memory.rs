//! In-memory broker implementation.
//!
//! Topics fan out every published message to all of their subscriptions.
//! Each subscription keeps its own backlog and a table of leased messages;
//! a lease that is neither acknowledged nor extended before its deadline
//! puts the message back into the backlog on the next pull.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use crate::broker::lease::{generate_lease_token, parse_lease_token};
use crate::broker::listener::{spawn_listener, ListenerOptions};
use crate::broker::{HealthStatus, MessageBroker, MessageHandler, SubscriberTask};
use crate::types::{AckHandle, Attributes, LeasedMessage, MessageId};
use crate::{Error, Result};

/// Upper bound on messages returned by one pull.
pub const MAX_PULL_MESSAGES: u32 = 1000;

/// How long a pull with `return_immediately = false` waits for a message.
const LONG_POLL_WAIT: StdDuration = StdDuration::from_secs(10);

/// Configuration for the in-memory broker.
#[derive(Debug, Clone)]
pub struct InMemoryBrokerConfig {
    /// Lease duration handed out on pull.
    pub ack_deadline_seconds: u32,
    /// Polling parameters for push subscribers.
    pub listener: ListenerOptions,
}

impl Default for InMemoryBrokerConfig {
    fn default() -> Self {
        Self {
            ack_deadline_seconds: 10,
            listener: ListenerOptions::default(),
        }
    }
}

/// Backlog and lease counts of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Messages waiting to be leased.
    pub available: usize,
    /// Messages currently leased.
    pub leased: usize,
}

/// In-memory broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<InMemoryBrokerInner>,
}

struct InMemoryBrokerInner {
    state: RwLock<BrokerState>,
    /// Wakes long-polling pulls on publish.
    published: Notify,
    config: InMemoryBrokerConfig,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicData>,
    subscriptions: HashMap<String, SubscriptionData>,
}

struct TopicData {
    created_at: DateTime<Utc>,
}

struct SubscriptionData {
    topic: String,
    available: VecDeque<StoredMessage>,
    /// Leased messages keyed by lease token.
    leased: HashMap<String, LeasedEntry>,
}

#[derive(Clone)]
struct StoredMessage {
    id: MessageId,
    data: Vec<u8>,
    attributes: Attributes,
    publish_time: DateTime<Utc>,
    delivery_attempt: u32,
}

struct LeasedEntry {
    message: StoredMessage,
    expires_at: DateTime<Utc>,
}

impl SubscriptionData {
    fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            available: VecDeque::new(),
            leased: HashMap::new(),
        }
    }

    /// Return messages whose lease ran out to the backlog.
    fn reclaim_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .leased
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(token, _)| token.clone())
            .collect();

        for token in expired {
            if let Some(entry) = self.leased.remove(&token) {
                debug!(message_id = %entry.message.id, "Lease expired, message will be redelivered");
                self.available.push_back(entry.message);
            }
        }
    }
}

impl InMemoryBroker {
    /// Create a new in-memory broker with default configuration.
    pub fn new() -> Self {
        Self::with_config(InMemoryBrokerConfig::default())
    }

    /// Create a new in-memory broker with custom configuration.
    pub fn with_config(config: InMemoryBrokerConfig) -> Self {
        info!(
            "Initializing in-memory broker with ack_deadline_seconds={}",
            config.ack_deadline_seconds
        );

        Self {
            inner: Arc::new(InMemoryBrokerInner {
                state: RwLock::new(BrokerState::default()),
                published: Notify::new(),
                config,
            }),
        }
    }

    /// Backlog and lease counts for a subscription.
    pub async fn subscription_stats(&self, subscription: &str) -> Result<SubscriptionStats> {
        let mut state = self.inner.state.write().await;
        let sub = state
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))?;

        sub.reclaim_expired(Utc::now());

        Ok(SubscriptionStats {
            available: sub.available.len(),
            leased: sub.leased.len(),
        })
    }

    /// Names of all topics, sorted.
    pub async fn list_topics(&self) -> Vec<String> {
        let state = self.inner.state.read().await;
        let mut topics: Vec<String> = state.topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Names of all subscriptions, sorted.
    pub async fn list_subscriptions(&self) -> Vec<String> {
        let state = self.inner.state.read().await;
        let mut subscriptions: Vec<String> = state.subscriptions.keys().cloned().collect();
        subscriptions.sort();
        subscriptions
    }

    async fn try_pull(&self, subscription: &str, max_messages: u32) -> Result<Vec<LeasedMessage>> {
        let mut state = self.inner.state.write().await;
        let sub = state
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))?;

        let now = Utc::now();
        sub.reclaim_expired(now);

        let expires_at = now + Duration::seconds(self.inner.config.ack_deadline_seconds as i64);
        let max = max_messages.min(MAX_PULL_MESSAGES) as usize;
        let mut pulled = Vec::new();

        while pulled.len() < max {
            let Some(mut message) = sub.available.pop_front() else {
                break;
            };
            message.delivery_attempt += 1;

            let token = generate_lease_token(subscription, &message.id);
            pulled.push(LeasedMessage {
                message_id: message.id.clone(),
                ack_handle: AckHandle::new(subscription, token.clone()),
                attributes: message.attributes.clone(),
                data: message.data.clone(),
                publish_time: message.publish_time,
                delivery_attempt: message.delivery_attempt,
            });
            sub.leased.insert(token, LeasedEntry { message, expires_at });
        }

        Ok(pulled)
    }

    /// The token must have been issued by the subscription the handle names.
    fn check_handle(handle: &AckHandle) -> Result<()> {
        let data = parse_lease_token(&handle.ack_id)?;
        if data.subscription != handle.subscription {
            return Err(Error::InvalidAckHandle);
        }
        Ok(())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn create_topic(&self, topic: &str) -> Result<()> {
        let mut state = self.inner.state.write().await;
        if state.topics.contains_key(topic) {
            return Err(Error::TopicAlreadyExists(topic.to_string()));
        }
        state.topics.insert(
            topic.to_string(),
            TopicData {
                created_at: Utc::now(),
            },
        );
        info!(topic = %topic, "Topic created");
        Ok(())
    }

    async fn create_subscription(&self, subscription: &str, topic: &str) -> Result<()> {
        let mut state = self.inner.state.write().await;
        if !state.topics.contains_key(topic) {
            return Err(Error::TopicNotFound(topic.to_string()));
        }
        if state.subscriptions.contains_key(subscription) {
            return Err(Error::SubscriptionAlreadyExists(subscription.to_string()));
        }
        state
            .subscriptions
            .insert(subscription.to_string(), SubscriptionData::new(topic));
        info!(subscription = %subscription, topic = %topic, "Subscription created");
        Ok(())
    }

    async fn delete_topic(&self, topic: &str) -> Result<()> {
        let mut state = self.inner.state.write().await;
        let removed = state
            .topics
            .remove(topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;

        // Subscriptions outlive their topic but stop receiving messages.
        info!(
            topic = %topic,
            age_seconds = (Utc::now() - removed.created_at).num_seconds(),
            "Topic deleted"
        );
        Ok(())
    }

    async fn delete_subscription(&self, subscription: &str) -> Result<()> {
        let mut state = self.inner.state.write().await;
        state
            .subscriptions
            .remove(subscription)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))?;
        info!(subscription = %subscription, "Subscription deleted");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        data: Vec<u8>,
        attributes: Attributes,
    ) -> Result<MessageId> {
        let mut state = self.inner.state.write().await;
        if !state.topics.contains_key(topic) {
            return Err(Error::TopicNotFound(topic.to_string()));
        }

        let message = StoredMessage {
            id: MessageId::new(),
            data,
            attributes,
            publish_time: Utc::now(),
            delivery_attempt: 0,
        };

        let mut fan_out = 0;
        for sub in state.subscriptions.values_mut().filter(|s| s.topic == topic) {
            sub.available.push_back(message.clone());
            fan_out += 1;
        }
        drop(state);

        self.inner.published.notify_waiters();
        debug!(topic = %topic, message_id = %message.id, subscriptions = fan_out, "Message published");
        Ok(message.id)
    }

    async fn pull(
        &self,
        subscription: &str,
        max_messages: u32,
        return_immediately: bool,
    ) -> Result<Vec<LeasedMessage>> {
        debug!(subscription = %subscription, max_messages, return_immediately, "Pulling messages");

        // Register interest before checking so a publish in between is not missed.
        let notified = self.inner.published.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let pulled = self.try_pull(subscription, max_messages).await?;
        if !pulled.is_empty() || return_immediately {
            return Ok(pulled);
        }

        if tokio::time::timeout(LONG_POLL_WAIT, notified).await.is_err() {
            return Ok(Vec::new());
        }
        self.try_pull(subscription, max_messages).await
    }

    async fn acknowledge(&self, handles: &[AckHandle]) -> Result<()> {
        let mut state = self.inner.state.write().await;
        let now = Utc::now();
        let mut rejected = 0;

        for handle in handles {
            if Self::check_handle(handle).is_err() {
                rejected += 1;
                continue;
            }
            let lease = state
                .subscriptions
                .get_mut(&handle.subscription)
                .and_then(|sub| sub.leased.remove(&handle.ack_id).map(|entry| (sub, entry)));

            match lease {
                Some((_, entry)) if entry.expires_at > now => {}
                Some((sub, entry)) => {
                    // Too late: the message goes back to the backlog.
                    sub.available.push_back(entry.message);
                    rejected += 1;
                }
                None => rejected += 1,
            }
        }

        if rejected > 0 {
            warn!(rejected, total = handles.len(), "Acknowledgment partially rejected");
            return Err(Error::AckRejected {
                rejected,
                total: handles.len(),
            });
        }

        debug!(count = handles.len(), "Messages acknowledged");
        Ok(())
    }

    async fn modify_ack_deadline(
        &self,
        handles: &[AckHandle],
        ack_deadline_seconds: u32,
    ) -> Result<()> {
        let mut state = self.inner.state.write().await;
        let now = Utc::now();
        let mut rejected = 0;

        for handle in handles {
            if Self::check_handle(handle).is_err() {
                rejected += 1;
                continue;
            }
            let Some(sub) = state.subscriptions.get_mut(&handle.subscription) else {
                rejected += 1;
                continue;
            };

            if ack_deadline_seconds == 0 {
                match sub.leased.remove(&handle.ack_id) {
                    Some(entry) => sub.available.push_front(entry.message),
                    None => rejected += 1,
                }
            } else {
                match sub.leased.get_mut(&handle.ack_id) {
                    Some(entry) if entry.expires_at > now => {
                        entry.expires_at = now + Duration::seconds(ack_deadline_seconds as i64);
                    }
                    _ => rejected += 1,
                }
            }
        }

        if rejected > 0 {
            return Err(Error::AckRejected {
                rejected,
                total: handles.len(),
            });
        }
        Ok(())
    }

    async fn push_subscribe(
        &self,
        subscription: &str,
        handler: MessageHandler,
    ) -> Result<SubscriberTask> {
        if !self
            .inner
            .state
            .read()
            .await
            .subscriptions
            .contains_key(subscription)
        {
            return Err(Error::SubscriptionNotFound(subscription.to_string()));
        }

        Ok(spawn_listener(
            self.clone(),
            subscription.to_string(),
            handler,
            self.inner.config.listener,
        ))
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }
}
