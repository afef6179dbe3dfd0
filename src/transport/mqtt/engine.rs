//! rumqttc-backed client engine
//!
//! Every `connect` builds a fresh `AsyncClient`/`EventLoop` pair and spawns a
//! task that polls the event loop. The task reports CONNACK through a watch
//! channel so `connect` only resolves on an actual acknowledgement, forwards
//! inbound messages to the registered hook, and exits on the first
//! connection error after emitting a single `Disconnected` event. Retry is
//! left entirely to the caller.

use super::connection::{configure_mqtt_options, to_rumqttc_qos, SUBSCRIPTION_QOS};
use super::message_handler::{EventRoute, MessageHandler};
use crate::protocol::OutboundMessage;
use crate::transport::{
    ClientEngineEvent, ClientEventHook, ConnectOptions, EngineError, ProtocolEngine,
};
use async_trait::async_trait;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const DEFAULT_CHANNEL_CAPACITY: usize = 10;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Link state published by the polling task
#[derive(Debug, Clone, PartialEq)]
enum LinkState {
    Connecting,
    Connected,
    Closed(String),
}

type SharedHook = Arc<RwLock<Option<ClientEventHook>>>;

struct Session {
    client: AsyncClient,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Session {
    fn abort(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

/// Production [`ProtocolEngine`] built on rumqttc's MQTT v5 client
pub struct RumqttcEngine {
    session: Mutex<Option<Session>>,
    connected: Arc<AtomicBool>,
    hook: SharedHook,
    channel_capacity: usize,
    connect_timeout: Duration,
}

impl RumqttcEngine {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            hook: Arc::new(RwLock::new(None)),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// How long `connect` waits for CONNACK
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Request channel capacity of the underlying rumqttc client
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<LinkState>,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                match &*state_rx.borrow_and_update() {
                    LinkState::Connected => return Ok(()),
                    LinkState::Closed(reason) => {
                        return Err(EngineError::ConnectionRefused(reason.clone()));
                    }
                    LinkState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(EngineError::Other(
                        "event loop stopped before acknowledging the connection".to_string(),
                    ));
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout),
        }
    }

    async fn active_client(&self) -> Result<AsyncClient, EngineError> {
        let session = self.session.lock().await;
        match session.as_ref() {
            Some(session) if self.connected.load(Ordering::SeqCst) => Ok(session.client.clone()),
            _ => Err(EngineError::NotConnected),
        }
    }
}

impl Default for RumqttcEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn emit(hook: &SharedHook, event: ClientEngineEvent) {
    let hook = match hook.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    if let Some(hook) = hook {
        hook(event);
    }
}

/// Poll the event loop until the link closes or shutdown is signalled
async fn run_event_loop(
    mut event_loop: EventLoop,
    state_tx: watch::Sender<LinkState>,
    mut shutdown_rx: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
    hook: SharedHook,
) {
    let mut was_connected = false;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Shutdown signal received, stopping MQTT event loop");
                    connected.store(false, Ordering::SeqCst);
                    break;
                }
            }

            event = event_loop.poll() => {
                match event {
                    Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                        EventRoute::ConnectionAcknowledged => {
                            connected.store(true, Ordering::SeqCst);
                            was_connected = true;
                            let _ = state_tx.send(LinkState::Connected);
                            info!("MQTT connection acknowledged by broker");
                            emit(&hook, ClientEngineEvent::Connected);
                        }
                        EventRoute::MessageReceived(message) => {
                            debug!(topic = %message.topic, bytes = message.payload.len(), "Received MQTT message");
                            emit(&hook, ClientEngineEvent::MessageReceived(message));
                        }
                        EventRoute::Disconnected(reason) => {
                            warn!(reason = %reason, "Broker closed the MQTT connection");
                            close_link(&state_tx, &connected, &hook, was_connected, reason);
                            break;
                        }
                        EventRoute::DisconnectSent => {
                            connected.store(false, Ordering::SeqCst);
                            let _ = state_tx.send(LinkState::Closed("client disconnected".to_string()));
                            break;
                        }
                        EventRoute::Ignored => {}
                    },
                    Err(e) => {
                        error!("MQTT event loop error: {}", e);
                        close_link(&state_tx, &connected, &hook, was_connected, e.to_string());
                        break;
                    }
                }
            }
        }
    }
}

fn close_link(
    state_tx: &watch::Sender<LinkState>,
    connected: &AtomicBool,
    hook: &SharedHook,
    was_connected: bool,
    reason: String,
) {
    connected.store(false, Ordering::SeqCst);
    let _ = state_tx.send(LinkState::Closed(reason.clone()));
    if was_connected {
        emit(hook, ClientEngineEvent::Disconnected { reason });
    }
}

#[async_trait]
impl ProtocolEngine for RumqttcEngine {
    async fn connect(&self, options: &ConnectOptions) -> Result<(), EngineError> {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            debug!("Replacing previous MQTT session");
            previous.abort();
        }
        self.connected.store(false, Ordering::SeqCst);

        let (client, event_loop) =
            AsyncClient::new(configure_mqtt_options(options), self.channel_capacity);
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            host = %options.host,
            port = options.port,
            client_id = %options.client_id,
            "Connecting to MQTT broker"
        );

        let handle = tokio::spawn(run_event_loop(
            event_loop,
            state_tx,
            shutdown_rx,
            self.connected.clone(),
            self.hook.clone(),
        ));

        *session = Some(Session {
            client,
            shutdown_tx,
            handle,
        });
        drop(session);

        if let Err(e) = Self::wait_for_connection_confirmation(state_rx, self.connect_timeout).await {
            if let Some(failed) = self.session.lock().await.take() {
                failed.abort();
            }
            self.connected.store(false, Ordering::SeqCst);
            return Err(e);
        }

        Ok(())
    }

    async fn disconnect(&self) -> Result<(), EngineError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        if self.connected.load(Ordering::SeqCst) {
            if let Err(e) = session.client.disconnect().await {
                session.abort();
                self.connected.store(false, Ordering::SeqCst);
                return Err(EngineError::DisconnectFailed(Box::new(e)));
            }
        } else {
            let _ = session.shutdown_tx.send(true);
        }

        let Session {
            shutdown_tx,
            mut handle,
            ..
        } = session;

        match tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await {
            Ok(Ok(())) => debug!("MQTT event loop shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("MQTT event loop ended with error: {}", e),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("MQTT event loop didn't shut down gracefully, forcing abort");
                let _ = shutdown_tx.send(true);
                handle.abort();
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!("MQTT client disconnected");
        Ok(())
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), EngineError> {
        let client = self.active_client().await?;
        client
            .publish(
                message.topic,
                to_rumqttc_qos(message.qos),
                message.retain,
                message.payload,
            )
            .await
            .map_err(|e| EngineError::PublishFailed(Box::new(e)))
    }

    async fn subscribe(&self, topic_filter: &str) -> Result<(), EngineError> {
        let client = self.active_client().await?;
        client
            .subscribe(topic_filter, to_rumqttc_qos(SUBSCRIPTION_QOS))
            .await
            .map_err(|e| EngineError::SubscriptionFailed(Box::new(e)))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), EngineError> {
        let client = self.active_client().await?;
        client
            .unsubscribe(topic)
            .await
            .map_err(|e| EngineError::SubscriptionFailed(Box::new(e)))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_event_hook(&self, hook: ClientEventHook) {
        match self.hook.write() {
            Ok(mut guard) => *guard = Some(hook),
            Err(poisoned) => *poisoned.into_inner() = Some(hook),
        }
    }
}

impl Drop for RumqttcEngine {
    fn drop(&mut self) {
        // No async in Drop: only make sure the polling task does not outlive the engine
        if let Ok(mut session) = self.session.try_lock() {
            if let Some(session) = session.take() {
                session.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OutboundMessage, Payload, PublishQos};
    use std::sync::Mutex as StdMutex;

    fn unreachable_options() -> ConnectOptions {
        ConnectOptions {
            host: "127.0.0.1".to_string(),
            // Port 1 is reserved and closed on test machines
            port: 1,
            client_id: "engine-test".to_string(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_success() {
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(LinkState::Connected);
        });

        let result =
            RumqttcEngine::wait_for_connection_confirmation(state_rx, Duration::from_millis(500))
                .await;
        assert!(result.is_ok(), "Should successfully wait for connection");
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_timeout() {
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);

        let result =
            RumqttcEngine::wait_for_connection_confirmation(state_rx, Duration::from_millis(10))
                .await;
        drop(state_tx);

        assert!(matches!(result, Err(EngineError::Timeout)));
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_closed() {
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(LinkState::Closed("Test disconnect".to_string()));
        });

        let result =
            RumqttcEngine::wait_for_connection_confirmation(state_rx, Duration::from_millis(500))
                .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Test disconnect"));
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_sender_dropped() {
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        drop(state_tx);

        let result =
            RumqttcEngine::wait_for_connection_confirmation(state_rx, Duration::from_millis(500))
                .await;
        assert!(matches!(result, Err(EngineError::Other(_))));
    }

    #[tokio::test]
    async fn test_operations_fail_without_connection() {
        let engine = RumqttcEngine::new();
        assert!(!engine.is_connected());

        let message = OutboundMessage::retained("/a", Payload::from("x"), PublishQos::Qos0);
        assert!(matches!(
            engine.publish(message).await,
            Err(EngineError::NotConnected)
        ));
        assert!(matches!(
            engine.subscribe("/a").await,
            Err(EngineError::NotConnected)
        ));
        assert!(matches!(
            engine.unsubscribe("/a").await,
            Err(EngineError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let engine = RumqttcEngine::new();
        assert!(engine.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails_without_disconnect_event() {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = events.clone();

        let engine = RumqttcEngine::new().with_connect_timeout(Duration::from_secs(5));
        engine.set_event_hook(Arc::new(move |event: ClientEngineEvent| {
            sink.lock().unwrap().push(event);
        }));

        let result = engine.connect(&unreachable_options()).await;

        assert!(result.is_err(), "Connecting to a closed port should fail");
        assert!(!engine.is_connected());
        assert!(
            events.lock().unwrap().is_empty(),
            "A connection that never came up must not report a disconnect"
        );
    }
}
