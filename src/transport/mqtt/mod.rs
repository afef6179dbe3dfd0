//! rumqttc-backed client engine
//!
//! Split the same way as the rest of the transport layer: pure functions
//! first, I/O last.
//!
//! - [`connection`] - option building and QoS conversion
//! - [`message_handler`] - pure routing of rumqttc events
//! - [`engine`] - the polling task and the [`ProtocolEngine`](crate::transport::ProtocolEngine) impl
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt_facade::transport::mqtt::RumqttcEngine;
//! use mqtt_facade::transport::{ConnectOptions, ProtocolEngine};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let engine = RumqttcEngine::new();
//! engine
//!     .connect(&ConnectOptions {
//!         host: "localhost".to_string(),
//!         port: 1883,
//!         client_id: "sensor-gateway".to_string(),
//!         username: None,
//!         password: None,
//!         keep_alive: Duration::from_secs(60),
//!     })
//!     .await?;
//! engine.subscribe("/sensor/#").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod connection;
pub mod engine;
pub mod message_handler;

pub use connection::{configure_mqtt_options, SUBSCRIPTION_QOS};
pub use engine::RumqttcEngine;
pub use message_handler::{EventRoute, MessageHandler};
