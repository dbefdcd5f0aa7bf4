//! Common data types for the gateway.

pub mod validation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Broker-assigned message identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a new random message ID.
    pub fn new() -> Self {
        MessageId(Uuid::new_v4().to_string())
    }

    /// Create a message ID from a string.
    pub fn from_string(s: String) -> Self {
        MessageId(s)
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message attributes.
pub type Attributes = HashMap<String, String>;

/// Attribute carrying the application-level document identifier.
pub const DOCUMENT_ID_ATTRIBUTE: &str = "documentId";

/// Opaque, single-use token for acknowledging one leased message.
///
/// The handle remembers the subscription it was leased from, so a batch may
/// mix handles from several subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AckHandle {
    /// Subscription the lease belongs to.
    pub subscription: String,
    /// Broker ack id.
    pub ack_id: String,
}

impl AckHandle {
    /// Create a new ack handle.
    pub fn new(subscription: impl Into<String>, ack_id: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            ack_id: ack_id.into(),
        }
    }
}

/// A message pulled from a subscription and not yet acknowledged.
///
/// Equality and hashing use the broker identity only, so the same underlying
/// message leased twice compares equal.
#[derive(Debug, Clone)]
pub struct LeasedMessage {
    /// Broker identity.
    pub message_id: MessageId,
    /// Lease token.
    pub ack_handle: AckHandle,
    /// Message attributes.
    pub attributes: Attributes,
    /// Message payload.
    pub data: Vec<u8>,
    /// When the broker accepted the message.
    pub publish_time: DateTime<Utc>,
    /// How many times the broker has handed this message out.
    pub delivery_attempt: u32,
}

impl LeasedMessage {
    /// Value of the `documentId` attribute, if any.
    pub fn document_id(&self) -> Option<&str> {
        self.attributes.get(DOCUMENT_ID_ATTRIBUTE).map(String::as_str)
    }

    /// Payload decoded as UTF-8; invalid sequences are replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Project this message into the shape returned by `/pull`.
    pub fn to_document(&self) -> DocumentPayload {
        DocumentPayload {
            document_id: self.document_id().map(str::to_string),
            body: self.body_text(),
        }
    }
}

impl PartialEq for LeasedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.message_id == other.message_id
    }
}

impl Eq for LeasedMessage {}

impl Hash for LeasedMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.message_id.hash(state);
    }
}

/// Projection of a pulled message returned to HTTP callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPayload {
    /// Value of the `documentId` attribute.
    #[serde(rename = "documentId")]
    pub document_id: Option<String>,
    /// UTF-8 body.
    pub body: String,
}
