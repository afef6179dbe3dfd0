//! Mock implementations for testing
//!
//! Provides in-process client and broker engines so the facades can be
//! exercised without a running MQTT broker. Both record every call and let
//! tests inject the events a real engine would emit.

use crate::protocol::OutboundMessage;
use crate::transport::{
    AdmissionDecision, AdmissionHook, BrokerEngine, BrokerEngineEvent, BrokerEventHook,
    BrokerOptions, ClientEngineEvent, ClientEventHook, ConnectOptions, ConnectionRequest,
    EngineError, InboundPublish, ProtocolEngine,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

fn current_hook<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    match slot.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn replace_hook<T>(slot: &RwLock<Option<T>>, hook: T) {
    match slot.write() {
        Ok(mut guard) => *guard = Some(hook),
        Err(poisoned) => *poisoned.into_inner() = Some(hook),
    }
}

/// Mock client engine
#[derive(Default)]
pub struct MockEngine {
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
    connect_delay_ms: AtomicU64,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    last_options: Mutex<Option<ConnectOptions>>,
    pub published_messages: Arc<Mutex<Vec<OutboundMessage>>>,
    pub subscriptions: Arc<Mutex<Vec<String>>>,
    pub unsubscriptions: Arc<Mutex<Vec<String>>>,
    hook: RwLock<Option<ClientEventHook>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose every connect attempt is refused
    pub fn with_connect_failure() -> Self {
        let engine = Self::default();
        engine.set_fail_connect(true);
        engine
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make every connect take `delay` before the broker "acknowledges"
    pub fn set_connect_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.connect_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn has_event_hook(&self) -> bool {
        current_hook(&self.hook).is_some()
    }

    pub async fn last_connect_options(&self) -> Option<ConnectOptions> {
        self.last_options.lock().await.clone()
    }

    pub async fn get_published_messages(&self) -> Vec<OutboundMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().await.clone()
    }

    pub async fn get_unsubscriptions(&self) -> Vec<String> {
        self.unsubscriptions.lock().await.clone()
    }

    /// Deliver `event` to the registered hook, as the engine's I/O task would
    pub fn emit(&self, event: ClientEngineEvent) {
        if let Some(hook) = current_hook(&self.hook) {
            hook(event);
        }
    }

    /// Drop the link as if the broker went away
    pub fn simulate_disconnect(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.emit(ClientEngineEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Deliver an inbound message on `topic`
    pub fn deliver(&self, topic: &str, payload: impl Into<Bytes>) {
        self.emit(ClientEngineEvent::MessageReceived(InboundPublish {
            topic: topic.to_string(),
            payload: payload.into(),
            qos: crate::protocol::QosLevel::AtMostOnce,
            retain: false,
        }));
    }
}

#[async_trait]
impl ProtocolEngine for MockEngine {
    async fn connect(&self, options: &ConnectOptions) -> Result<(), EngineError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().await = Some(options.clone());

        let delay_ms = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(EngineError::ConnectionRefused(
                "Mock connection failure".to_string(),
            ));
        }

        self.connected.store(true, Ordering::SeqCst);
        self.emit(ClientEngineEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), EngineError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), EngineError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(EngineError::PublishFailed("Mock publish failure".into()));
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(EngineError::NotConnected);
        }

        self.published_messages.lock().await.push(message);
        Ok(())
    }

    async fn subscribe(&self, topic_filter: &str) -> Result<(), EngineError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(EngineError::NotConnected);
        }
        self.subscriptions.lock().await.push(topic_filter.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), EngineError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(EngineError::NotConnected);
        }
        self.unsubscriptions.lock().await.push(topic.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_event_hook(&self, hook: ClientEventHook) {
        replace_hook(&self.hook, hook);
    }
}

/// Mock broker engine
#[derive(Default)]
pub struct MockBrokerEngine {
    running: AtomicBool,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    started_with: Mutex<Option<BrokerOptions>>,
    event_hook: RwLock<Option<BrokerEventHook>>,
    admission_hook: RwLock<Option<AdmissionHook>>,
}

impl MockBrokerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that fails to bind its listener
    pub fn with_start_failure() -> Self {
        let engine = Self::default();
        engine.fail_start.store(true, Ordering::SeqCst);
        engine
    }

    /// Engine whose listener refuses to shut down
    pub fn with_stop_failure() -> Self {
        let engine = Self::default();
        engine.fail_stop.store(true, Ordering::SeqCst);
        engine
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn has_admission_hook(&self) -> bool {
        current_hook(&self.admission_hook).is_some()
    }

    pub async fn get_started_with(&self) -> Option<BrokerOptions> {
        self.started_with.lock().await.clone()
    }

    pub fn emit(&self, event: BrokerEngineEvent) {
        if let Some(hook) = current_hook(&self.event_hook) {
            hook(event);
        }
    }

    /// Run the admission hook for `request`; accepted clients raise `ClientConnected`
    pub fn attempt_connection(&self, request: ConnectionRequest) -> AdmissionDecision {
        let decision = match current_hook(&self.admission_hook) {
            Some(hook) => hook(&request),
            None => AdmissionDecision::Accept,
        };

        if decision.is_accepted() {
            self.emit(BrokerEngineEvent::ClientConnected {
                client_id: request.client_id,
            });
        }
        decision
    }
}

#[async_trait]
impl BrokerEngine for MockBrokerEngine {
    async fn start(&self, options: &BrokerOptions) -> Result<(), EngineError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(EngineError::StartFailed(
                format!("Mock bind failure on port {}", options.port).into(),
            ));
        }
        *self.started_with.lock().await = Some(options.clone());
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(EngineError::StopFailed("Mock listener stuck".into()));
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_event_hook(&self, hook: BrokerEventHook) {
        replace_hook(&self.event_hook, hook);
    }

    fn set_admission_hook(&self, hook: AdmissionHook) {
        replace_hook(&self.admission_hook, hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Payload, PublishQos};

    fn options() -> ConnectOptions {
        ConnectOptions {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "mock".to_string(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_mock_engine_records_publishes() {
        let engine = MockEngine::new();
        engine.connect(&options()).await.unwrap();

        let message = OutboundMessage::retained("/a", Payload::from("x"), PublishQos::Qos1);
        engine.publish(message.clone()).await.unwrap();

        assert_eq!(engine.get_published_messages().await, vec![message]);
        assert_eq!(engine.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_engine_failure_knobs() {
        let engine = MockEngine::with_connect_failure();
        assert!(engine.connect(&options()).await.is_err());
        assert!(!engine.is_connected());

        engine.set_fail_connect(false);
        engine.connect(&options()).await.unwrap();
        engine.set_fail_publish(true);
        let message = OutboundMessage::retained("/a", Payload::from("x"), PublishQos::Qos0);
        assert!(matches!(
            engine.publish(message).await,
            Err(EngineError::PublishFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_broker_without_admission_hook_accepts() {
        let broker = MockBrokerEngine::new();
        let decision = broker.attempt_connection(ConnectionRequest {
            client_id: "dev-1".to_string(),
            username: None,
            password: None,
            peer_addr: None,
        });
        assert!(decision.is_accepted());
    }
}
