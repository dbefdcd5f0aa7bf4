//! Error types for pubsub-gateway.

use thiserror::Error;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The broker could not be reached or returned a transport-level failure.
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Topic already exists.
    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// Subscription already exists.
    #[error("Subscription already exists: {0}")]
    SubscriptionAlreadyExists(String),

    /// Topic not found.
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// Subscription not found.
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Subscriber handle not found in the registry.
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(String),

    /// The registry was shut down and accepts no new subscribers.
    #[error("Subscriber registry is closed")]
    RegistryClosed,

    /// Ack handle is malformed or its lease is no longer held.
    #[error("Invalid ack handle")]
    InvalidAckHandle,

    /// The broker rejected part or all of an acknowledgment batch.
    #[error("Acknowledgment rejected: {rejected} of {total} message(s)")]
    AckRejected {
        /// Number of handles the broker refused.
        rejected: usize,
        /// Size of the batch.
        total: usize,
    },

    /// Acknowledgment confirmation did not arrive in time.
    #[error("Acknowledgment timed out after {0:?}")]
    AckTimeout(std::time::Duration),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::BrokerUnavailable(err.to_string())
    }
}

/// Validation error types.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid topic name.
    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    /// Invalid subscription name.
    #[error("Invalid subscription name: {0}")]
    InvalidSubscriptionName(String),

    /// Message too large.
    #[error("Message too large: {size} bytes (max: {max} bytes)")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid attribute.
    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Invalid parameter.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Reason for invalidity.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_rejected_display() {
        let err = Error::AckRejected {
            rejected: 2,
            total: 5,
        };
        assert_eq!(err.to_string(), "Acknowledgment rejected: 2 of 5 message(s)");
    }

    #[test]
    fn test_validation_error_converts() {
        let err: Error = ValidationError::InvalidTopicName("x".to_string()).into();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.to_string(), "Validation error: Invalid topic name: x");
    }
}
