//! Lease token generation and parsing for the in-memory broker.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::MessageId;
use crate::{Error, Result};

/// Data encoded in a lease token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseTokenData {
    /// Subscription that granted the lease.
    pub subscription: String,
    /// Leased message.
    pub message_id: MessageId,
    /// Distinguishes successive leases of the same message.
    pub nonce: String,
}

/// Generate a lease token for a message leased from `subscription`.
pub fn generate_lease_token(subscription: &str, message_id: &MessageId) -> String {
    let data = LeaseTokenData {
        subscription: subscription.to_string(),
        message_id: message_id.clone(),
        nonce: Uuid::new_v4().to_string(),
    };

    // A struct of strings always serializes.
    let json = serde_json::to_string(&data).unwrap_or_default();
    STANDARD.encode(json.as_bytes())
}

/// Parse a lease token and extract the data.
pub fn parse_lease_token(token: &str) -> Result<LeaseTokenData> {
    let decoded = STANDARD.decode(token).map_err(|_| Error::InvalidAckHandle)?;

    let json = String::from_utf8(decoded).map_err(|_| Error::InvalidAckHandle)?;

    serde_json::from_str(&json).map_err(|_| Error::InvalidAckHandle)
}
