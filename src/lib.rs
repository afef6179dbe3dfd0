//! MQTT client and embedded-broker facade
//!
//! Lets a host application publish and receive topic-addressed messages,
//! and gate broker-side client admission, without touching the protocol
//! engine's own API.
//!
//! # Overview
//!
//! - [`client::MqttClient`] - connection lifecycle, reconnect supervisor,
//!   publish and subscription paths
//! - [`server::MqttServer`] - broker facade with allow-list admission
//! - [`events`] - translation of engine events into host callbacks
//! - [`transport`] - the engine contract, a rumqttc-backed client engine and,
//!   with the `embedded-broker` feature, an in-process broker engine
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_facade::client::MqttClient;
//! use mqtt_facade::config::ConnectionConfig;
//! use mqtt_facade::protocol::{PublishQos, QosLevel};
//! use mqtt_facade::testing::MockEngine;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let engine = Arc::new(MockEngine::new());
//! let config = ConnectionConfig::new("localhost", 1883).unwrap();
//!
//! let client = MqttClient::start_new(config, engine.clone()).await.unwrap();
//! client.publish("/sensor/1", "25.3", PublishQos::Qos2).await.unwrap();
//!
//! let sent = engine.get_published_messages().await;
//! assert_eq!(sent[0].qos, QosLevel::ExactlyOnce);
//! assert!(sent[0].retain);
//! # });
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod observability;
pub mod protocol;
pub mod server;
pub mod testing;
pub mod transport;

pub use client::{MqttClient, SupervisorState};
pub use config::{
    AdmissionPolicyConfig, ClientSettings, ConfigError, ConnectionConfig, CredentialMatching,
    ServerConfig, ServerSettings,
};
pub use error::{ErrorHandler, MqttError, MqttResult};
pub use events::{MessageCallback, ServerCallbacks};
pub use protocol::{Payload, PublishQos, QosLevel, ReceivedMessage, ServerEvent, ServerEventKind};
pub use server::{MqttServer, ServerAdmissionPolicy};
#[cfg(feature = "embedded-broker")]
pub use transport::embedded::EmbeddedBrokerEngine;
pub use transport::mqtt::RumqttcEngine;
pub use transport::{BrokerEngine, EngineError, ProtocolEngine, RejectReason};
