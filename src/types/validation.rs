//! Validation of topic names, subscription names and message contents.

use crate::error::ValidationError;
use crate::types::Attributes;
use crate::Result;

/// Maximum length of a topic or subscription name.
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum message payload size (10 MB).
pub const MAX_MESSAGE_SIZE: usize = 10_485_760;

/// Maximum attribute key size in bytes.
pub const MAX_ATTRIBUTE_KEY_SIZE: usize = 256;

/// Maximum attribute value size in bytes.
pub const MAX_ATTRIBUTE_VALUE_SIZE: usize = 1024;

/// Topic name validation (1-255 chars, alphanumeric plus `-_.~+%`).
pub fn validate_topic_name(name: &str) -> Result<()> {
    check_name(name).map_err(|reason| ValidationError::InvalidTopicName(reason).into())
}

/// Subscription name validation (1-255 chars, alphanumeric plus `-_.~+%`).
pub fn validate_subscription_name(name: &str) -> Result<()> {
    check_name(name).map_err(|reason| ValidationError::InvalidSubscriptionName(reason).into())
}

fn check_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(format!(
            "Name must be 1-{} characters, got {}",
            MAX_NAME_LENGTH,
            name.len()
        ));
    }

    for ch in name.chars() {
        if !ch.is_alphanumeric() && !matches!(ch, '-' | '_' | '.' | '~' | '+' | '%') {
            return Err(format!("Name contains invalid character: '{}'", ch));
        }
    }

    Ok(())
}

/// Validate message size.
pub fn validate_message_size(size: usize) -> Result<()> {
    if size > MAX_MESSAGE_SIZE {
        return Err(ValidationError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        }
        .into());
    }
    Ok(())
}

/// Validate message attributes.
pub fn validate_attributes(attributes: &Attributes) -> Result<()> {
    for (key, value) in attributes {
        if key.is_empty() || key.len() > MAX_ATTRIBUTE_KEY_SIZE {
            return Err(ValidationError::InvalidAttribute(format!(
                "Attribute key must be 1-{} bytes, got {}",
                MAX_ATTRIBUTE_KEY_SIZE,
                key.len()
            ))
            .into());
        }
        if value.len() > MAX_ATTRIBUTE_VALUE_SIZE {
            return Err(ValidationError::InvalidAttribute(format!(
                "Value of attribute '{}' exceeds {} bytes",
                key, MAX_ATTRIBUTE_VALUE_SIZE
            ))
            .into());
        }
    }
    Ok(())
}

/// Validate a `max_messages` pull parameter.
pub fn validate_max_messages(max_messages: u32) -> Result<()> {
    if max_messages == 0 {
        return Err(ValidationError::InvalidParameter {
            name: "max_messages".to_string(),
            reason: "must be greater than zero".to_string(),
        }
        .into());
    }
    Ok(())
}
