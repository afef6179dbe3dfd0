//! Publish path

use super::supervisor::ReconnectSupervisor;
use crate::error::{ErrorRouter, MqttError, MqttResult};
use crate::protocol::{normalize_topic, OutboundMessage, Payload, PublishQos};
use crate::transport::ProtocolEngine;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Builds outbound messages and hands them to the engine
#[derive(Clone)]
pub struct Publisher {
    engine: Arc<dyn ProtocolEngine>,
    supervisor: Arc<ReconnectSupervisor>,
    errors: ErrorRouter,
}

impl Publisher {
    pub fn new(
        engine: Arc<dyn ProtocolEngine>,
        supervisor: Arc<ReconnectSupervisor>,
        errors: ErrorRouter,
    ) -> Self {
        Self {
            engine,
            supervisor,
            errors,
        }
    }

    /// Publish `payload` to `topic` with the retain flag set.
    ///
    /// A blank topic fails with [`MqttError::EmptyTopic`] whatever the
    /// connection state. Engine failures go to the error handler when one is
    /// configured.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Payload>,
        qos: PublishQos,
    ) -> MqttResult<()> {
        let topic = normalize_topic(topic)?;
        self.supervisor.ensure_connected();

        let message = OutboundMessage::retained(topic, payload.into(), qos);
        debug!(
            topic = %message.topic,
            qos = %message.qos,
            bytes = message.payload.len(),
            "Publishing message"
        );

        match self.engine.publish(message).await {
            Ok(()) => Ok(()),
            Err(e) => self.errors.route(MqttError::Engine(e)),
        }
    }

    /// Drain `reader` and publish its contents as one message
    pub async fn publish_reader<R>(&self, topic: &str, mut reader: R, qos: PublishQos) -> MqttResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let topic = normalize_topic(topic)?;

        let mut buffer = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buffer).await {
            return self.errors.route(MqttError::Io(e));
        }

        self.publish(topic, buffer, qos).await
    }
}
