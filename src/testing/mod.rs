//! Testing utilities and mock implementations
//!
//! Mock client and broker engines for exercising the facades without an
//! MQTT broker.

pub mod mocks;

pub use mocks::*;
