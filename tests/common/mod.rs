//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pubsub_gateway::broker::memory::InMemoryBroker;
use pubsub_gateway::broker::{HealthStatus, MessageBroker, MessageHandler, SubscriberTask};
use pubsub_gateway::types::{AckHandle, Attributes, LeasedMessage, MessageId, DOCUMENT_ID_ATTRIBUTE};
use pubsub_gateway::{Error, Result};

/// Broker wrapper that injects failures into an in-memory broker.
#[derive(Clone, Default)]
pub struct FaultyBroker {
    pub inner: InMemoryBroker,
    pub fail_ack: Arc<AtomicBool>,
    pub hang_ack: Arc<AtomicBool>,
    pub fail_pull: Arc<AtomicBool>,
    pub fail_subscribe: Arc<AtomicBool>,
    pub ack_calls: Arc<AtomicUsize>,
    pub acked_handles: Arc<AtomicUsize>,
}

impl FaultyBroker {
    pub fn new(inner: InMemoryBroker) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn ack_calls(&self) -> usize {
        self.ack_calls.load(Ordering::SeqCst)
    }

    pub fn acked_handles(&self) -> usize {
        self.acked_handles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBroker for FaultyBroker {
    async fn create_topic(&self, topic: &str) -> Result<()> {
        self.inner.create_topic(topic).await
    }

    async fn create_subscription(&self, subscription: &str, topic: &str) -> Result<()> {
        self.inner.create_subscription(subscription, topic).await
    }

    async fn delete_topic(&self, topic: &str) -> Result<()> {
        self.inner.delete_topic(topic).await
    }

    async fn delete_subscription(&self, subscription: &str) -> Result<()> {
        self.inner.delete_subscription(subscription).await
    }

    async fn publish(
        &self,
        topic: &str,
        data: Vec<u8>,
        attributes: Attributes,
    ) -> Result<MessageId> {
        self.inner.publish(topic, data, attributes).await
    }

    async fn pull(
        &self,
        subscription: &str,
        max_messages: u32,
        return_immediately: bool,
    ) -> Result<Vec<LeasedMessage>> {
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(Error::BrokerUnavailable("injected pull failure".to_string()));
        }
        self.inner
            .pull(subscription, max_messages, return_immediately)
            .await
    }

    async fn acknowledge(&self, handles: &[AckHandle]) -> Result<()> {
        self.ack_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_ack.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_ack.load(Ordering::SeqCst) {
            return Err(Error::BrokerUnavailable("injected ack failure".to_string()));
        }
        self.inner.acknowledge(handles).await?;
        self.acked_handles.fetch_add(handles.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn modify_ack_deadline(
        &self,
        handles: &[AckHandle],
        ack_deadline_seconds: u32,
    ) -> Result<()> {
        self.inner
            .modify_ack_deadline(handles, ack_deadline_seconds)
            .await
    }

    async fn push_subscribe(
        &self,
        subscription: &str,
        handler: MessageHandler,
    ) -> Result<SubscriberTask> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::BrokerUnavailable(
                "injected subscribe failure".to_string(),
            ));
        }
        self.inner.push_subscribe(subscription, handler).await
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        self.inner.health_check().await
    }
}

/// In-memory broker with topic `docs` and subscriptions `sub-a`, `sub-b` on it.
pub async fn seeded_broker() -> InMemoryBroker {
    let broker = InMemoryBroker::new();
    broker.create_topic("docs").await.unwrap();
    broker.create_subscription("sub-a", "docs").await.unwrap();
    broker.create_subscription("sub-b", "docs").await.unwrap();
    broker
}

/// Publish a document with a `documentId` attribute.
pub async fn publish_doc<B: MessageBroker + ?Sized>(
    broker: &B,
    topic: &str,
    document_id: &str,
    body: &str,
) -> MessageId {
    let mut attributes = Attributes::new();
    attributes.insert(DOCUMENT_ID_ATTRIBUTE.to_string(), document_id.to_string());
    broker
        .publish(topic, body.as_bytes().to_vec(), attributes)
        .await
        .unwrap()
}
