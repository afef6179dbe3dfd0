//! Protocol engine contract
//!
//! The facade never speaks the wire protocol itself. It drives an engine
//! through the small operation surface below and reacts to the events the
//! engine reports through registered hooks.
//!
//! - [`ProtocolEngine`] is the client-role engine; [`mqtt::RumqttcEngine`] is
//!   the production implementation.
//! - [`BrokerEngine`] is the server-role engine. It also consults an
//!   [`AdmissionHook`] for every inbound connection before accepting it.
//!   With the `embedded-broker` feature, `embedded::EmbeddedBrokerEngine`
//!   runs an in-process `mqtt5` broker.

use crate::protocol::{OutboundMessage, QosLevel};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "embedded-broker")]
pub mod embedded;
pub mod mqtt;

/// Errors reported by a protocol engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection refused by broker: {0}")]
    ConnectionRefused(String),
    #[error("Connection attempt timed out waiting for acknowledgement")]
    Timeout,
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Engine has no active connection")]
    NotConnected,
    #[error("Broker failed to start")]
    StartFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Broker failed to stop")]
    StopFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Engine failure: {0}")]
    Other(String),
}

/// Parameters for opening a client connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
}

/// Message delivered by the engine, before translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPublish {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QosLevel,
    pub retain: bool,
}

/// Events emitted by a client-role engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEngineEvent {
    /// The broker acknowledged the connection
    Connected,
    /// An established connection was lost or closed by the broker
    Disconnected { reason: String },
    MessageReceived(InboundPublish),
}

/// Hook the engine calls, on its own dispatch context, for every client event
pub type ClientEventHook = Arc<dyn Fn(ClientEngineEvent) + Send + Sync>;

/// Client-role protocol engine
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Open a connection and resolve once the broker has acknowledged it
    async fn connect(&self, options: &ConnectOptions) -> Result<(), EngineError>;

    /// Close the connection normally and resolve once it is closed
    async fn disconnect(&self) -> Result<(), EngineError>;

    /// Hand a message to the engine and resolve once it has been accepted for transmission
    async fn publish(&self, message: OutboundMessage) -> Result<(), EngineError>;

    async fn subscribe(&self, topic_filter: &str) -> Result<(), EngineError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), EngineError>;

    /// Current connection state as seen by the engine
    fn is_connected(&self) -> bool;

    /// Register the event hook, replacing any earlier one
    fn set_event_hook(&self, hook: ClientEventHook);
}

/// Listening endpoint for a broker engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOptions {
    pub bind_address: String,
    pub port: u16,
}

/// Events emitted by a server-role engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEngineEvent {
    ClientConnected {
        client_id: String,
    },
    ClientDisconnected {
        client_id: String,
    },
    Subscribed {
        client_id: String,
        topic_filter: String,
    },
    Unsubscribed {
        client_id: String,
        topic_filter: String,
    },
    MessageReceived {
        client_id: String,
        message: InboundPublish,
    },
}

/// Hook the engine calls for every broker event; may run concurrently across clients
pub type BrokerEventHook = Arc<dyn Fn(BrokerEngineEvent) + Send + Sync>;

/// An inbound connection attempt awaiting admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub peer_addr: Option<SocketAddr>,
}

/// Why an inbound connection was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RejectReason {
    #[error("client identifier not valid")]
    ClientIdentifierNotValid,
    #[error("bad username or password")]
    BadUserNameOrPassword,
}

impl RejectReason {
    /// MQTT v5 CONNACK reason code
    pub fn reason_code(self) -> u8 {
        match self {
            RejectReason::ClientIdentifierNotValid => 0x85,
            RejectReason::BadUserNameOrPassword => 0x86,
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Accept,
    Reject(RejectReason),
}

impl AdmissionDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AdmissionDecision::Accept)
    }
}

/// Hook the engine calls synchronously before accepting a connection
pub type AdmissionHook = Arc<dyn Fn(&ConnectionRequest) -> AdmissionDecision + Send + Sync>;

/// Server-role protocol engine
#[async_trait]
pub trait BrokerEngine: Send + Sync {
    /// Bind the listening endpoint and start accepting clients
    async fn start(&self, options: &BrokerOptions) -> Result<(), EngineError>;

    async fn stop(&self) -> Result<(), EngineError>;

    fn set_event_hook(&self, hook: BrokerEventHook);

    fn set_admission_hook(&self, hook: AdmissionHook);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_text() {
        assert_eq!(
            RejectReason::ClientIdentifierNotValid.to_string(),
            "client identifier not valid"
        );
        assert_eq!(
            RejectReason::BadUserNameOrPassword.to_string(),
            "bad username or password"
        );
    }

    #[test]
    fn test_reject_reason_codes() {
        assert_eq!(RejectReason::ClientIdentifierNotValid.reason_code(), 0x85);
        assert_eq!(RejectReason::BadUserNameOrPassword.reason_code(), 0x86);
    }

    #[test]
    fn test_admission_decision() {
        assert!(AdmissionDecision::Accept.is_accepted());
        assert!(!AdmissionDecision::Reject(RejectReason::BadUserNameOrPassword).is_accepted());
    }

    #[test]
    fn test_engine_error_display() {
        let errors = vec![
            EngineError::StopFailed("test".to_string().into()),
            EngineError::ConnectionRefused("NotAuthorized".to_string()),
            EngineError::Timeout,
            EngineError::PublishFailed("test".to_string().into()),
            EngineError::SubscriptionFailed("test".to_string().into()),
            EngineError::NotConnected,
            EngineError::Other("test".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
