//! Observability helpers
//!
//! Structured logging setup and span macros for client and server operations.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macro for lifecycle operations
pub use logging::lifecycle_span;
