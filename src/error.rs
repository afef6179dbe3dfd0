//! Error taxonomy for the client and server facades
//!
//! Validation failures (`EmptyTopic`, `NotConnected`) are caller bugs and
//! always surface directly. Runtime failures reported by the protocol
//! engine go through an [`ErrorRouter`], which hands them to the host's
//! error handler when one is configured and propagates them otherwise.

use crate::config::ConfigError;
use crate::transport::EngineError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Main error type for facade operations
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Topic must not be empty")]
    EmptyTopic,

    #[error("MQTT client is not connected - start the connection first")]
    NotConnected,

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Failed to read payload stream: {0}")]
    Io(#[from] std::io::Error),
}

impl MqttError {
    /// True for errors caused by invalid caller input rather than runtime conditions
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MqttError::EmptyTopic | MqttError::NotConnected | MqttError::Configuration(_)
        )
    }
}

/// Result type for facade operations
pub type MqttResult<T> = Result<T, MqttError>;

/// Host-supplied sink for runtime failures
pub type ErrorHandler = Arc<dyn Fn(&MqttError) + Send + Sync>;

/// Routes runtime failures to the configured handler, or back to the caller
#[derive(Clone, Default)]
pub struct ErrorRouter {
    handler: Option<ErrorHandler>,
}

impl ErrorRouter {
    pub fn new(handler: Option<ErrorHandler>) -> Self {
        Self { handler }
    }

    /// Deliver `error` to the handler and swallow it, or return it when no handler is set
    pub fn route(&self, error: MqttError) -> MqttResult<()> {
        match &self.handler {
            Some(handler) => {
                debug!(error = %error, "Routing error to configured handler");
                handler(&error);
                Ok(())
            }
            None => Err(error),
        }
    }
}

impl fmt::Debug for ErrorRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorRouter")
            .field("handler", &self.handler.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
