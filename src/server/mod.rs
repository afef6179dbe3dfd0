//! Embedded broker facade
//!
//! [`MqttServer`] wires a [`BrokerEngine`] to the host: broker events go
//! through [`ServerEventTranslator`] to the configured callbacks, and every
//! inbound connection is checked by [`ServerAdmissionPolicy`] first.
//!
//! The `embedded-broker` feature provides `EmbeddedBrokerEngine`, an
//! in-process broker; any other [`BrokerEngine`] plugs in the same way.

pub mod admission;

pub use admission::ServerAdmissionPolicy;

use crate::config::ServerConfig;
use crate::error::{ErrorRouter, MqttError, MqttResult};
use crate::events::ServerEventTranslator;
use crate::lifecycle_span;
use crate::transport::{BrokerEngine, BrokerEngineEvent, BrokerOptions, ConnectionRequest};
use std::sync::Arc;
use tracing::{info, Instrument};

/// Listening endpoint for `config`, with the admission port override applied
pub fn broker_options(config: &ServerConfig) -> BrokerOptions {
    let port = config
        .admission()
        .and_then(|admission| ServerAdmissionPolicy::new(admission.clone()).port_override())
        .unwrap_or(config.port());

    BrokerOptions {
        bind_address: config.bind_address().to_string(),
        port,
    }
}

/// Server-role facade
pub struct MqttServer {
    config: Arc<ServerConfig>,
    engine: Arc<dyn BrokerEngine>,
    options: BrokerOptions,
    errors: ErrorRouter,
}

impl MqttServer {
    pub fn with_engine(config: ServerConfig, engine: Arc<dyn BrokerEngine>) -> Self {
        let config = Arc::new(config);
        let options = broker_options(&config);
        let errors = ErrorRouter::new(config.error_handler().cloned());

        let translator = ServerEventTranslator::new(config.callbacks().clone());
        engine.set_event_hook(Arc::new(move |event: BrokerEngineEvent| {
            translator.dispatch(event);
        }));

        if let Some(admission) = config.admission() {
            let policy = ServerAdmissionPolicy::new(admission.clone());
            engine.set_admission_hook(Arc::new(move |request: &ConnectionRequest| {
                policy.evaluate(request)
            }));
        }

        Self {
            config,
            engine,
            options,
            errors,
        }
    }

    /// Build a server and start it straight away
    pub async fn start_new(config: ServerConfig, engine: Arc<dyn BrokerEngine>) -> MqttResult<Self> {
        let server = Self::with_engine(config, engine);
        server.start().await?;
        Ok(server)
    }

    pub async fn start(&self) -> MqttResult<()> {
        let span = lifecycle_span!(
            operation = "broker_start",
            bind_address = %self.options.bind_address,
            port = self.options.port
        );
        async {
            match self.engine.start(&self.options).await {
                Ok(()) => {
                    info!("MQTT broker started");
                    Ok(())
                }
                Err(e) => self.errors.route(MqttError::Engine(e)),
            }
        }
        .instrument(span)
        .await
    }

    pub async fn stop(&self) -> MqttResult<()> {
        let span = lifecycle_span!(operation = "broker_stop", port = self.options.port);
        async {
            match self.engine.stop().await {
                Ok(()) => {
                    info!("MQTT broker stopped");
                    Ok(())
                }
                Err(e) => self.errors.route(MqttError::Engine(e)),
            }
        }
        .instrument(span)
        .await
    }

    /// Endpoint the engine is asked to listen on
    pub fn options(&self) -> &BrokerOptions {
        &self.options
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for MqttServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttServer")
            .field("config", &self.config)
            .field("options", &self.options)
            .finish()
    }
}
