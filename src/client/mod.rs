//! Client facade
//!
//! [`MqttClient`] owns the connection lifecycle. Construction resolves the
//! client identifier, freezes the connect options and registers the engine
//! event hook; after that the config is only read.
//!
//! - [`supervisor`] - reconnect state machine
//! - [`publisher`] - publish path
//! - [`subscriptions`] - subscribe and unsubscribe
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt_facade::client::MqttClient;
//! use mqtt_facade::config::ConnectionConfig;
//! use mqtt_facade::protocol::PublishQos;
//!
//! # tokio_test::block_on(async {
//! let config = ConnectionConfig::new("localhost", 1883)?
//!     .with_reconnect_interval_secs(5.0)?
//!     .with_message_callback(|message| println!("{}: {}", message.topic, message.payload_utf8));
//!
//! let client = MqttClient::new(config);
//! client.start().await?;
//! client.subscribe("/sensor/#").await?;
//! client.publish("/sensor/1", "25.3", PublishQos::Qos2).await?;
//! client.stop().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod publisher;
pub mod subscriptions;
pub mod supervisor;

pub use publisher::Publisher;
pub use subscriptions::SubscriptionManager;
pub use supervisor::{ReconnectSupervisor, SupervisorState};

use crate::config::ConnectionConfig;
use crate::error::{ErrorRouter, MqttError, MqttResult};
use crate::events::ClientEventTranslator;
use crate::lifecycle_span;
use crate::protocol::{Payload, PublishQos};
use crate::transport::mqtt::RumqttcEngine;
use crate::transport::{ClientEngineEvent, ConnectOptions, ProtocolEngine};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{info, Instrument};

/// Build the engine connect options from a validated config
pub fn connect_options(config: &ConnectionConfig) -> ConnectOptions {
    ConnectOptions {
        host: config.server_address().to_string(),
        port: config.port(),
        client_id: config.client_id().to_string(),
        username: config.username().map(str::to_string),
        password: config.password().map(str::to_string),
        keep_alive: config.keep_alive(),
    }
}

/// Connection lifecycle manager for the client role
pub struct MqttClient {
    config: Arc<ConnectionConfig>,
    engine: Arc<dyn ProtocolEngine>,
    options: Arc<ConnectOptions>,
    supervisor: Arc<ReconnectSupervisor>,
    publisher: Publisher,
    subscriptions: SubscriptionManager,
    errors: ErrorRouter,
}

impl MqttClient {
    /// Client backed by the rumqttc engine
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_engine(config, Arc::new(RumqttcEngine::new()))
    }

    /// Client backed by any engine implementation
    pub fn with_engine(config: ConnectionConfig, engine: Arc<dyn ProtocolEngine>) -> Self {
        let config = Arc::new(config);
        let options = Arc::new(connect_options(&config));
        let errors = ErrorRouter::new(config.error_handler().cloned());

        let supervisor = Arc::new(ReconnectSupervisor::new(
            engine.clone(),
            options.clone(),
            config.reconnect_interval(),
            errors.clone(),
        ));

        // The supervisor owns the engine, so the engine's hook only holds it weakly
        let translator = ClientEventTranslator::new(config.message_callback().cloned());
        let weak_supervisor = Arc::downgrade(&supervisor);
        engine.set_event_hook(Arc::new(move |event: ClientEngineEvent| match event {
            ClientEngineEvent::MessageReceived(message) => {
                translator.dispatch(message);
            }
            ClientEngineEvent::Connected => {
                if let Some(supervisor) = weak_supervisor.upgrade() {
                    supervisor.on_link_up();
                }
            }
            ClientEngineEvent::Disconnected { reason } => {
                if let Some(supervisor) = weak_supervisor.upgrade() {
                    supervisor.on_disconnect(&reason);
                }
            }
        }));

        info!(
            client_id = %options.client_id,
            server = %options.host,
            port = options.port,
            "MQTT client initialized"
        );

        Self {
            publisher: Publisher::new(engine.clone(), supervisor.clone(), errors.clone()),
            subscriptions: SubscriptionManager::new(engine.clone()),
            config,
            engine,
            options,
            supervisor,
            errors,
        }
    }

    /// Build a client and start it straight away
    pub async fn start_new(
        config: ConnectionConfig,
        engine: Arc<dyn ProtocolEngine>,
    ) -> MqttResult<Self> {
        let client = Self::with_engine(config, engine);
        client.start().await?;
        Ok(client)
    }

    /// Connect and wait for the broker's acknowledgement. A reconnect attempt
    /// still waiting out its interval is cancelled first.
    pub async fn start(&self) -> MqttResult<()> {
        let span = lifecycle_span!(operation = "start", client_id = %self.options.client_id);
        async {
            self.supervisor.preempt();
            match self.engine.connect(&self.options).await {
                Ok(()) => {
                    self.supervisor.mark_connected();
                    info!(
                        server = %self.options.host,
                        port = self.options.port,
                        "Connected to MQTT broker"
                    );
                    Ok(())
                }
                Err(e) => self.errors.route(MqttError::Engine(e)),
            }
        }
        .instrument(span)
        .await
    }

    /// Disconnect normally. The supervisor is disarmed first, so this never triggers a reconnect.
    pub async fn stop(&self) -> MqttResult<()> {
        let span = lifecycle_span!(operation = "stop", client_id = %self.options.client_id);
        async {
            self.supervisor.disarm();
            match self.engine.disconnect().await {
                Ok(()) => {
                    info!("Disconnected from MQTT broker");
                    Ok(())
                }
                Err(e) => self.errors.route(MqttError::Engine(e)),
            }
        }
        .instrument(span)
        .await
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Payload>,
        qos: PublishQos,
    ) -> MqttResult<()> {
        self.publisher.publish(topic, payload, qos).await
    }

    /// Publish everything `reader` yields as a single message
    pub async fn publish_reader<R>(&self, topic: &str, reader: R, qos: PublishQos) -> MqttResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.publisher.publish_reader(topic, reader, qos).await
    }

    pub async fn subscribe(&self, topic: &str) -> MqttResult<()> {
        self.subscriptions.subscribe(topic).await
    }

    pub async fn unsubscribe(&self, topic: &str) -> MqttResult<()> {
        self.subscriptions.unsubscribe(topic).await
    }

    /// Engine-reported connection state
    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    pub fn client_id(&self) -> &str {
        &self.options.client_id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        self.supervisor.disarm();
    }
}

impl std::fmt::Debug for MqttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttClient")
            .field("config", &self.config)
            .field("supervisor", &self.supervisor)
            .finish()
    }
}
