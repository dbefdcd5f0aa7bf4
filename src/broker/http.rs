//! Google Cloud Pub/Sub v1 REST client.
//!
//! Speaks the JSON/HTTP flavour of the Pub/Sub API, so it works against the
//! Pub/Sub emulator and other compatible local services.
//!
//! ## Endpoints used
//! - `PUT /v1/projects/{project}/topics/{topic}` - Create a topic
//! - `DELETE /v1/projects/{project}/topics/{topic}` - Delete a topic
//! - `POST /v1/projects/{project}/topics/{topic}:publish` - Publish messages
//! - `GET /v1/projects/{project}/topics` - Health probe
//! - `PUT /v1/projects/{project}/subscriptions/{subscription}` - Create a subscription
//! - `DELETE /v1/projects/{project}/subscriptions/{subscription}` - Delete a subscription
//! - `POST /v1/projects/{project}/subscriptions/{subscription}:pull` - Pull messages
//! - `POST /v1/projects/{project}/subscriptions/{subscription}:acknowledge` - Acknowledge messages
//! - `POST /v1/projects/{project}/subscriptions/{subscription}:modifyAckDeadline` - Modify ack deadline

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::broker::listener::{spawn_listener, ListenerOptions};
use crate::broker::{HealthStatus, MessageBroker, MessageHandler, SubscriberTask};
use crate::types::{AckHandle, Attributes, LeasedMessage, MessageId};
use crate::{Error, Result};

/// Configuration for the REST broker client.
#[derive(Debug, Clone)]
pub struct HttpBrokerConfig {
    /// Base URL, e.g. `http://localhost:8085`.
    pub endpoint: String,
    /// Project owning topics and subscriptions.
    pub project_id: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Polling parameters for push subscribers.
    pub listener: ListenerOptions,
}

/// Pub/Sub REST broker client.
#[derive(Clone)]
pub struct HttpBroker {
    client: Client,
    config: HttpBrokerConfig,
}

// ============================================================================
// Wire types
// ============================================================================

/// A Pub/Sub message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubsubMessage {
    /// Message data (base64-encoded on the wire).
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
    /// Message attributes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<HashMap<String, String>>,
    /// Message ID (set by server).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Publish timestamp (set by server).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

/// Request for publishing messages.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// Messages to publish.
    pub messages: Vec<PubsubMessage>,
}

/// Response for publishing messages.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    /// Message IDs assigned by the server.
    pub message_ids: Vec<String>,
}

/// Body of a create-subscription request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResource {
    /// Topic name (`projects/{project}/topics/{topic}`).
    pub topic: String,
}

/// Request for pulling messages.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Maximum number of messages to return.
    pub max_messages: u32,
    /// Whether to return immediately if no messages are available.
    pub return_immediately: bool,
}

/// Response for pulling messages.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Received messages; absent when nothing was available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_messages: Option<Vec<ReceivedMessage>>,
}

/// A received message.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    /// Acknowledgment ID.
    pub ack_id: String,
    /// The message.
    pub message: PubsubMessage,
    /// Delivery attempt counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_attempt: Option<u32>,
}

/// Request for acknowledging messages.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    /// Acknowledgment IDs.
    pub ack_ids: Vec<String>,
}

/// Request for modifying the acknowledgment deadline.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyAckDeadlineRequest {
    /// Acknowledgment IDs.
    pub ack_ids: Vec<String>,
    /// New acknowledgment deadline in seconds.
    pub ack_deadline_seconds: u32,
}

/// Error body returned by Google APIs.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Resource a request targets, used to pick the not-found / conflict error.
#[derive(Debug, Clone, Copy)]
enum Resource<'a> {
    Topic(&'a str),
    Subscription(&'a str),
}

impl HttpBroker {
    /// Create a new REST broker client.
    pub fn new(config: HttpBrokerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(format!("pubsub-gateway/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "HTTP broker targeting {} (project {})",
            config.endpoint, config.project_id
        );

        Ok(Self { client, config })
    }

    fn topic_path(&self, topic: &str) -> String {
        format!("projects/{}/topics/{}", self.config.project_id, topic)
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/v1/{}", self.base(), self.topic_path(topic))
    }

    fn subscription_url(&self, subscription: &str) -> String {
        format!(
            "{}/v1/projects/{}/subscriptions/{}",
            self.base(),
            self.config.project_id,
            subscription
        )
    }

    fn base(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    /// Turn a non-success response into the matching gateway error.
    async fn check(response: Response, resource: Resource<'_>) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error.message)
            .unwrap_or(text);

        Err(match (status, resource) {
            (StatusCode::NOT_FOUND, Resource::Topic(name)) => Error::TopicNotFound(name.to_string()),
            (StatusCode::NOT_FOUND, Resource::Subscription(name)) => {
                Error::SubscriptionNotFound(name.to_string())
            }
            (StatusCode::CONFLICT, Resource::Topic(name)) => {
                Error::TopicAlreadyExists(name.to_string())
            }
            (StatusCode::CONFLICT, Resource::Subscription(name)) => {
                Error::SubscriptionAlreadyExists(name.to_string())
            }
            (status, _) => Error::BrokerUnavailable(format!("HTTP {}: {}", status, message)),
        })
    }

    /// Group ack ids per subscription; the REST API acks one subscription per call.
    fn group_by_subscription(handles: &[AckHandle]) -> BTreeMap<&str, Vec<String>> {
        let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for handle in handles {
            groups
                .entry(handle.subscription.as_str())
                .or_default()
                .push(handle.ack_id.clone());
        }
        groups
    }

    fn to_leased(subscription: &str, received: ReceivedMessage) -> LeasedMessage {
        let publish_time = received
            .message
            .publish_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        LeasedMessage {
            message_id: received
                .message
                .message_id
                .map(MessageId::from_string)
                .unwrap_or_default(),
            ack_handle: AckHandle::new(subscription, received.ack_id),
            attributes: received.message.attributes.unwrap_or_default(),
            data: received.message.data,
            publish_time,
            delivery_attempt: received.delivery_attempt.unwrap_or(1),
        }
    }
}

#[async_trait]
impl MessageBroker for HttpBroker {
    async fn create_topic(&self, topic: &str) -> Result<()> {
        info!(topic = %topic, "REST: CreateTopic");
        let response = self
            .client
            .put(self.topic_url(topic))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::check(response, Resource::Topic(topic)).await?;
        Ok(())
    }

    async fn create_subscription(&self, subscription: &str, topic: &str) -> Result<()> {
        info!(subscription = %subscription, topic = %topic, "REST: CreateSubscription");
        let response = self
            .client
            .put(self.subscription_url(subscription))
            .json(&SubscriptionResource {
                topic: self.topic_path(topic),
            })
            .send()
            .await?;

        // A 404 here means the topic is missing, not the subscription.
        match Self::check(response, Resource::Subscription(subscription)).await {
            Err(Error::SubscriptionNotFound(_)) => Err(Error::TopicNotFound(topic.to_string())),
            other => other.map(|_| ()),
        }
    }

    async fn delete_topic(&self, topic: &str) -> Result<()> {
        info!(topic = %topic, "REST: DeleteTopic");
        let response = self.client.delete(self.topic_url(topic)).send().await?;
        Self::check(response, Resource::Topic(topic)).await?;
        Ok(())
    }

    async fn delete_subscription(&self, subscription: &str) -> Result<()> {
        info!(subscription = %subscription, "REST: DeleteSubscription");
        let response = self
            .client
            .delete(self.subscription_url(subscription))
            .send()
            .await?;
        Self::check(response, Resource::Subscription(subscription)).await?;
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        data: Vec<u8>,
        attributes: Attributes,
    ) -> Result<MessageId> {
        debug!(topic = %topic, bytes = data.len(), "REST: Publish");
        let request = PublishRequest {
            messages: vec![PubsubMessage {
                data,
                attributes: if attributes.is_empty() { None } else { Some(attributes) },
                ..Default::default()
            }],
        };

        let response = self
            .client
            .post(format!("{}:publish", self.topic_url(topic)))
            .json(&request)
            .send()
            .await?;
        let body: PublishResponse = Self::check(response, Resource::Topic(topic))
            .await?
            .json()
            .await?;

        body.message_ids
            .into_iter()
            .next()
            .map(MessageId::from_string)
            .ok_or_else(|| Error::BrokerUnavailable("Publish returned no message id".to_string()))
    }

    async fn pull(
        &self,
        subscription: &str,
        max_messages: u32,
        return_immediately: bool,
    ) -> Result<Vec<LeasedMessage>> {
        debug!(subscription = %subscription, max_messages, "REST: Pull");
        let response = self
            .client
            .post(format!("{}:pull", self.subscription_url(subscription)))
            .json(&PullRequest {
                max_messages,
                return_immediately,
            })
            .send()
            .await?;
        let body: PullResponse = Self::check(response, Resource::Subscription(subscription))
            .await?
            .json()
            .await?;

        Ok(body
            .received_messages
            .unwrap_or_default()
            .into_iter()
            .map(|received| Self::to_leased(subscription, received))
            .collect())
    }

    async fn acknowledge(&self, handles: &[AckHandle]) -> Result<()> {
        for (subscription, ack_ids) in Self::group_by_subscription(handles) {
            debug!(subscription = %subscription, count = ack_ids.len(), "REST: Acknowledge");
            let response = self
                .client
                .post(format!("{}:acknowledge", self.subscription_url(subscription)))
                .json(&AcknowledgeRequest { ack_ids })
                .send()
                .await?;
            Self::check(response, Resource::Subscription(subscription)).await?;
        }
        Ok(())
    }

    async fn modify_ack_deadline(
        &self,
        handles: &[AckHandle],
        ack_deadline_seconds: u32,
    ) -> Result<()> {
        for (subscription, ack_ids) in Self::group_by_subscription(handles) {
            debug!(subscription = %subscription, count = ack_ids.len(), ack_deadline_seconds, "REST: ModifyAckDeadline");
            let response = self
                .client
                .post(format!(
                    "{}:modifyAckDeadline",
                    self.subscription_url(subscription)
                ))
                .json(&ModifyAckDeadlineRequest {
                    ack_ids,
                    ack_deadline_seconds,
                })
                .send()
                .await?;
            Self::check(response, Resource::Subscription(subscription)).await?;
        }
        Ok(())
    }

    async fn push_subscribe(
        &self,
        subscription: &str,
        handler: MessageHandler,
    ) -> Result<SubscriberTask> {
        // Fail fast if the subscription does not exist.
        let response = self
            .client
            .get(self.subscription_url(subscription))
            .send()
            .await?;
        Self::check(response, Resource::Subscription(subscription)).await?;

        Ok(spawn_listener(
            self.clone(),
            subscription.to_string(),
            handler,
            self.config.listener,
        ))
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        let url = format!(
            "{}/v1/projects/{}/topics",
            self.base(),
            self.config.project_id
        );
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(response) => Ok(HealthStatus::Unhealthy(format!(
                "HTTP {}",
                response.status()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}
