//! Quality-of-service levels
//!
//! [`QosLevel`] is the delivery guarantee the protocol engine applies.
//! [`PublishQos`] is the level a caller requests from the publish path; the
//! two are related by the fixed table in [`PublishQos::to_protocol_level`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery guarantee as understood by the protocol engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QosLevel {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QosLevel {
    /// Wire value (0, 1 or 2)
    pub fn as_u8(self) -> u8 {
        match self {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(QosLevel::AtMostOnce),
            1 => Some(QosLevel::AtLeastOnce),
            2 => Some(QosLevel::ExactlyOnce),
            _ => None,
        }
    }
}

impl fmt::Display for QosLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QosLevel::AtMostOnce => "AtMostOnce",
            QosLevel::AtLeastOnce => "AtLeastOnce",
            QosLevel::ExactlyOnce => "ExactlyOnce",
        };
        f.write_str(name)
    }
}

/// Level requested by callers of the publish path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublishQos {
    #[default]
    Qos0,
    Qos1,
    Qos2,
}

impl PublishQos {
    /// Map the requested level to the engine level.
    ///
    /// The table is deliberately literal and differs from the MQTT numbering
    /// for the two lower levels:
    ///
    /// | requested | engine level  |
    /// |-----------|---------------|
    /// | `Qos0`    | `AtLeastOnce` |
    /// | `Qos1`    | `AtMostOnce`  |
    /// | `Qos2`    | `ExactlyOnce` |
    ///
    /// Existing publishers depend on this behaviour; changing it changes
    /// delivery guarantees on the wire.
    pub const fn to_protocol_level(self) -> QosLevel {
        match self {
            PublishQos::Qos0 => QosLevel::AtLeastOnce,
            PublishQos::Qos1 => QosLevel::AtMostOnce,
            PublishQos::Qos2 => QosLevel::ExactlyOnce,
        }
    }
}

impl From<PublishQos> for QosLevel {
    fn from(qos: PublishQos) -> Self {
        qos.to_protocol_level()
    }
}

impl TryFrom<u8> for PublishQos {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PublishQos::Qos0),
            1 => Ok(PublishQos::Qos1),
            2 => Ok(PublishQos::Qos2),
            other => Err(other),
        }
    }
}
