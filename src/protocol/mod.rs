//! Message types, QoS levels and topic validation
//!
//! Everything in this module is pure data or pure functions; the engine and
//! facade layers build on top of it.

pub mod messages;
pub mod qos;
pub mod topics;

pub use messages::*;
pub use qos::{PublishQos, QosLevel};
pub use topics::normalize_topic;
