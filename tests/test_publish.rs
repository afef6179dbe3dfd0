//! Publish path: topic validation, QoS table, retain flag, error routing

use mqtt_facade::client::MqttClient;
use mqtt_facade::config::ConnectionConfig;
use mqtt_facade::testing::MockEngine;
use mqtt_facade::{EngineError, MqttError, PublishQos, QosLevel, SupervisorState};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn connected_client(config: ConnectionConfig) -> (MqttClient, Arc<MockEngine>) {
    let engine = Arc::new(MockEngine::new());
    let client = MqttClient::start_new(config, engine.clone()).await.unwrap();
    (client, engine)
}

fn config() -> ConnectionConfig {
    ConnectionConfig::new("localhost", 1883).unwrap()
}

#[tokio::test]
async fn test_sensor_reading_published_exactly_once_and_retained() {
    let (client, engine) = connected_client(config()).await;

    client.publish("/sensor/1", "25.3", PublishQos::Qos2).await.unwrap();

    let sent = engine.get_published_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "/sensor/1");
    assert_eq!(&sent[0].payload[..], "25.3".as_bytes());
    assert_eq!(sent[0].qos, QosLevel::ExactlyOnce);
    assert!(sent[0].retain);
}

#[tokio::test]
async fn test_requested_levels_map_through_fixed_table() {
    let (client, engine) = connected_client(config()).await;

    client.publish("/a", "x", PublishQos::Qos0).await.unwrap();
    client.publish("/a", "x", PublishQos::Qos1).await.unwrap();
    client.publish("/a", "x", PublishQos::Qos2).await.unwrap();

    let levels: Vec<QosLevel> = engine
        .get_published_messages()
        .await
        .into_iter()
        .map(|m| m.qos)
        .collect();
    assert_eq!(
        levels,
        vec![
            QosLevel::AtLeastOnce,
            QosLevel::AtMostOnce,
            QosLevel::ExactlyOnce
        ]
    );
}

#[tokio::test]
async fn test_every_payload_shape_is_retained() {
    let (client, engine) = connected_client(config()).await;

    client.publish("/text", "hello", PublishQos::Qos0).await.unwrap();
    client
        .publish("/owned", String::from("hello"), PublishQos::Qos1)
        .await
        .unwrap();
    client
        .publish("/bytes", vec![1u8, 2, 3], PublishQos::Qos2)
        .await
        .unwrap();
    client
        .publish_reader("/stream", Cursor::new(b"streamed".to_vec()), PublishQos::Qos0)
        .await
        .unwrap();

    let sent = engine.get_published_messages().await;
    assert_eq!(sent.len(), 4);
    assert!(sent.iter().all(|m| m.retain));
    assert_eq!(&sent[3].payload[..], b"streamed");
}

#[tokio::test]
async fn test_topic_is_trimmed() {
    let (client, engine) = connected_client(config()).await;

    client.publish("  /sensor/1 ", "1", PublishQos::Qos0).await.unwrap();

    assert_eq!(engine.get_published_messages().await[0].topic, "/sensor/1");
}

#[tokio::test]
async fn test_blank_topic_rejected_regardless_of_state() {
    let engine = Arc::new(MockEngine::new());
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();
    let config = config().with_error_handler(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let client = MqttClient::with_engine(config, engine.clone());

    for topic in ["", "   "] {
        assert!(matches!(
            client.publish(topic, "x", PublishQos::Qos0).await,
            Err(MqttError::EmptyTopic)
        ));
    }

    client.start().await.unwrap();

    for topic in ["", "   "] {
        assert!(matches!(
            client.publish(topic, "x", PublishQos::Qos0).await,
            Err(MqttError::EmptyTopic)
        ));
        assert!(matches!(
            client
                .publish_reader(topic, Cursor::new(Vec::new()), PublishQos::Qos0)
                .await,
            Err(MqttError::EmptyTopic)
        ));
    }

    assert_eq!(handled.load(Ordering::SeqCst), 0, "Validation errors bypass the handler");
    assert!(engine.get_published_messages().await.is_empty());
}

#[tokio::test]
async fn test_engine_failure_propagates_without_handler() {
    let (client, engine) = connected_client(config()).await;
    engine.set_fail_publish(true);

    let result = client.publish("/a", "x", PublishQos::Qos0).await;

    assert!(matches!(
        result,
        Err(MqttError::Engine(EngineError::PublishFailed(_)))
    ));
}

#[tokio::test]
async fn test_engine_failure_routed_to_handler() {
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();
    let config = config().with_error_handler(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (client, engine) = connected_client(config).await;
    engine.set_fail_publish(true);

    assert!(client.publish("/a", "x", PublishQos::Qos0).await.is_ok());
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_publish_before_start_does_not_arm_supervisor() {
    let engine = Arc::new(MockEngine::new());
    let client = MqttClient::with_engine(config(), engine.clone());

    let result = client.publish("/a", "x", PublishQos::Qos0).await;

    assert!(matches!(
        result,
        Err(MqttError::Engine(EngineError::NotConnected))
    ));
    assert_eq!(client.supervisor_state(), SupervisorState::Idle);
    assert_eq!(engine.connect_count(), 0);
}
