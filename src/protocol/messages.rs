//! Message records exchanged between the host and the facade

use super::qos::{PublishQos, QosLevel};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw message body accepted by the publish path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload(Bytes::from(text))
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload(Bytes::copy_from_slice(bytes))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload(Bytes::from(bytes))
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload(bytes)
    }
}

/// A message handed to the protocol engine for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QosLevel,
    pub retain: bool,
}

impl OutboundMessage {
    /// Build a publish-path message. The retain flag is always set.
    pub fn retained(topic: impl Into<String>, payload: Payload, qos: PublishQos) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into_bytes(),
            qos: qos.to_protocol_level(),
            retain: true,
        }
    }
}

/// Inbound message delivered to the client's message callback
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub topic: String,
    pub payload: Bytes,
    /// Payload decoded as UTF-8, with invalid sequences replaced
    pub payload_utf8: String,
    pub qos: QosLevel,
    pub retain: bool,
    pub received_at: DateTime<Utc>,
}

impl ReceivedMessage {
    pub fn new(topic: impl Into<String>, payload: Bytes, qos: QosLevel, retain: bool) -> Self {
        let payload_utf8 = String::from_utf8_lossy(&payload).into_owned();
        Self {
            topic: topic.into(),
            payload,
            payload_utf8,
            qos,
            retain,
            received_at: Utc::now(),
        }
    }
}

/// Kind of broker-side notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerEventKind {
    ClientConnected,
    ClientDisconnected,
    Subscribed,
    Unsubscribed,
    MessageReceived,
}

/// Broker-side notification delivered to the server callbacks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEvent {
    pub kind: ServerEventKind,
    pub client_id: String,
    pub topic: Option<String>,
    /// Message payload as text, only set for received messages
    pub payload: Option<String>,
    pub qos: Option<QosLevel>,
    pub retain: bool,
    /// Human-readable one-line summary
    pub message: String,
    pub received_at: DateTime<Utc>,
}
