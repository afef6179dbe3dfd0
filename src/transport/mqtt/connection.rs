//! Pure option and QoS mapping between the facade and rumqttc
//!
//! Nothing here performs I/O, so every mapping can be tested without a broker.

use crate::protocol::QosLevel;
use crate::transport::ConnectOptions;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};

/// Largest packet the client will accept from the broker
pub const MAX_PACKET_SIZE: u32 = 256 * 1024;

/// QoS used for topic filters created by the subscription path
pub const SUBSCRIPTION_QOS: QosLevel = QosLevel::AtMostOnce;

/// Build rumqttc options from the facade's connect options
pub fn configure_mqtt_options(options: &ConnectOptions) -> MqttOptions {
    let mut mqtt_options =
        MqttOptions::new(options.client_id.clone(), options.host.clone(), options.port);

    if let Some(username) = &options.username {
        let password = options.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username.clone(), password);
    }

    mqtt_options.set_keep_alive(options.keep_alive);
    mqtt_options.set_clean_start(true);
    mqtt_options.set_max_packet_size(Some(MAX_PACKET_SIZE));

    mqtt_options
}

pub fn to_rumqttc_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

pub fn from_rumqttc_qos(qos: QoS) -> QosLevel {
    match qos {
        QoS::AtMostOnce => QosLevel::AtMostOnce,
        QoS::AtLeastOnce => QosLevel::AtLeastOnce,
        QoS::ExactlyOnce => QosLevel::ExactlyOnce,
    }
}
