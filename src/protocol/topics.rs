//! Topic argument validation
//!
//! Wildcard matching and filter syntax belong to the protocol engine. The
//! facade only guarantees that it never forwards a blank topic.

use crate::error::MqttError;

/// Trim `topic` and reject it when nothing is left
pub fn normalize_topic(topic: &str) -> Result<&str, MqttError> {
    let trimmed = topic.trim();
    if trimmed.is_empty() {
        return Err(MqttError::EmptyTopic);
    }
    Ok(trimmed)
}
