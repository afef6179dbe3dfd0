//! Subscription path
//!
//! Unlike publishing, subscription failures never go through the error
//! handler; they always come back to the caller.

use crate::error::{MqttError, MqttResult};
use crate::protocol::normalize_topic;
use crate::transport::ProtocolEngine;
use std::sync::Arc;
use tracing::info;

/// Adds and removes topic interest on the live connection
#[derive(Clone)]
pub struct SubscriptionManager {
    engine: Arc<dyn ProtocolEngine>,
}

impl SubscriptionManager {
    pub fn new(engine: Arc<dyn ProtocolEngine>) -> Self {
        Self { engine }
    }

    pub async fn subscribe(&self, topic: &str) -> MqttResult<()> {
        let topic = self.checked_topic(topic)?;
        self.engine.subscribe(topic).await?;
        info!(topic = %topic, "Subscribed to topic");
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: &str) -> MqttResult<()> {
        let topic = self.checked_topic(topic)?;
        self.engine.unsubscribe(topic).await?;
        info!(topic = %topic, "Unsubscribed from topic");
        Ok(())
    }

    /// Topic must be non-blank and the engine itself must report a live link
    fn checked_topic<'a>(&self, topic: &'a str) -> MqttResult<&'a str> {
        let topic = normalize_topic(topic)?;
        if !self.engine.is_connected() {
            return Err(MqttError::NotConnected);
        }
        Ok(topic)
    }
}
