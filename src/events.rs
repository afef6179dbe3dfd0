//! Translation of engine events into host notifications
//!
//! Both translators are stateless apart from the callbacks they were built
//! with. Each engine event becomes exactly one notification record; the
//! record is handed to the matching callback on the engine's dispatch
//! context, or dropped when the host registered no callback for it.

use crate::protocol::{ReceivedMessage, ServerEvent, ServerEventKind};
use crate::transport::{BrokerEngineEvent, InboundPublish};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Client-side sink for inbound messages
pub type MessageCallback = Arc<dyn Fn(ReceivedMessage) + Send + Sync>;

/// Server-side sink for one kind of broker notification
pub type ServerEventCallback = Arc<dyn Fn(ServerEvent) + Send + Sync>;

/// Per-event-kind callbacks for the server role
#[derive(Clone, Default)]
pub struct ServerCallbacks {
    pub on_subscribed: Option<ServerEventCallback>,
    pub on_unsubscribed: Option<ServerEventCallback>,
    pub on_message_received: Option<ServerEventCallback>,
    pub on_client_connected: Option<ServerEventCallback>,
    pub on_client_disconnected: Option<ServerEventCallback>,
}

impl ServerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_subscribed<F>(mut self, callback: F) -> Self
    where
        F: Fn(ServerEvent) + Send + Sync + 'static,
    {
        self.on_subscribed = Some(Arc::new(callback));
        self
    }

    pub fn on_unsubscribed<F>(mut self, callback: F) -> Self
    where
        F: Fn(ServerEvent) + Send + Sync + 'static,
    {
        self.on_unsubscribed = Some(Arc::new(callback));
        self
    }

    pub fn on_message_received<F>(mut self, callback: F) -> Self
    where
        F: Fn(ServerEvent) + Send + Sync + 'static,
    {
        self.on_message_received = Some(Arc::new(callback));
        self
    }

    pub fn on_client_connected<F>(mut self, callback: F) -> Self
    where
        F: Fn(ServerEvent) + Send + Sync + 'static,
    {
        self.on_client_connected = Some(Arc::new(callback));
        self
    }

    pub fn on_client_disconnected<F>(mut self, callback: F) -> Self
    where
        F: Fn(ServerEvent) + Send + Sync + 'static,
    {
        self.on_client_disconnected = Some(Arc::new(callback));
        self
    }

    /// Callback registered for `kind`, if any
    pub fn for_kind(&self, kind: ServerEventKind) -> Option<&ServerEventCallback> {
        match kind {
            ServerEventKind::ClientConnected => self.on_client_connected.as_ref(),
            ServerEventKind::ClientDisconnected => self.on_client_disconnected.as_ref(),
            ServerEventKind::Subscribed => self.on_subscribed.as_ref(),
            ServerEventKind::Unsubscribed => self.on_unsubscribed.as_ref(),
            ServerEventKind::MessageReceived => self.on_message_received.as_ref(),
        }
    }
}

impl fmt::Debug for ServerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCallbacks")
            .field("on_subscribed", &self.on_subscribed.is_some())
            .field("on_unsubscribed", &self.on_unsubscribed.is_some())
            .field("on_message_received", &self.on_message_received.is_some())
            .field("on_client_connected", &self.on_client_connected.is_some())
            .field("on_client_disconnected", &self.on_client_disconnected.is_some())
            .finish()
    }
}

/// Client-role translator: inbound publishes to [`ReceivedMessage`]
#[derive(Clone, Default)]
pub struct ClientEventTranslator {
    callback: Option<MessageCallback>,
}

impl ClientEventTranslator {
    pub fn new(callback: Option<MessageCallback>) -> Self {
        Self { callback }
    }

    pub fn to_received_message(message: InboundPublish) -> ReceivedMessage {
        ReceivedMessage::new(message.topic, message.payload, message.qos, message.retain)
    }

    /// Build the record and hand it to the callback. Returns whether a callback ran.
    pub fn dispatch(&self, message: InboundPublish) -> bool {
        let Some(callback) = &self.callback else {
            trace!(topic = %message.topic, "No message callback configured, dropping message");
            return false;
        };

        let received = Self::to_received_message(message);
        debug!(topic = %received.topic, bytes = received.payload.len(), "Dispatching received message");
        callback(received);
        true
    }
}

impl fmt::Debug for ClientEventTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientEventTranslator")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Server-role translator: broker events to [`ServerEvent`]
#[derive(Debug, Clone, Default)]
pub struct ServerEventTranslator {
    callbacks: ServerCallbacks,
}

impl ServerEventTranslator {
    pub fn new(callbacks: ServerCallbacks) -> Self {
        Self { callbacks }
    }

    /// Build the notification record, summary line included
    pub fn to_server_event(event: BrokerEngineEvent) -> ServerEvent {
        let received_at = Utc::now();
        match event {
            BrokerEngineEvent::ClientConnected { client_id } => ServerEvent {
                kind: ServerEventKind::ClientConnected,
                message: format!("client [{client_id}] connected"),
                client_id,
                topic: None,
                payload: None,
                qos: None,
                retain: false,
                received_at,
            },
            BrokerEngineEvent::ClientDisconnected { client_id } => ServerEvent {
                kind: ServerEventKind::ClientDisconnected,
                message: format!("client [{client_id}] disconnected"),
                client_id,
                topic: None,
                payload: None,
                qos: None,
                retain: false,
                received_at,
            },
            BrokerEngineEvent::Subscribed {
                client_id,
                topic_filter,
            } => ServerEvent {
                kind: ServerEventKind::Subscribed,
                message: format!("client [{client_id}] subscribed to topic: {topic_filter}"),
                client_id,
                topic: Some(topic_filter),
                payload: None,
                qos: None,
                retain: false,
                received_at,
            },
            BrokerEngineEvent::Unsubscribed {
                client_id,
                topic_filter,
            } => ServerEvent {
                kind: ServerEventKind::Unsubscribed,
                message: format!("client [{client_id}] unsubscribed from topic: {topic_filter}"),
                client_id,
                topic: Some(topic_filter),
                payload: None,
                qos: None,
                retain: false,
                received_at,
            },
            BrokerEngineEvent::MessageReceived { client_id, message } => {
                let text = String::from_utf8_lossy(&message.payload).into_owned();
                ServerEvent {
                    kind: ServerEventKind::MessageReceived,
                    message: format!(
                        "client [{}] >> topic: [{}] payload: [{}] qos: [{}] retain: [{}]",
                        client_id, message.topic, text, message.qos, message.retain
                    ),
                    client_id,
                    topic: Some(message.topic),
                    payload: Some(text),
                    qos: Some(message.qos),
                    retain: message.retain,
                    received_at,
                }
            }
        }
    }

    /// Build the record and hand it to the matching callback. Returns whether a callback ran.
    pub fn dispatch(&self, event: BrokerEngineEvent) -> bool {
        let kind = kind_of(&event);
        let Some(callback) = self.callbacks.for_kind(kind) else {
            trace!(?kind, "No server callback configured, dropping event");
            return false;
        };

        let server_event = Self::to_server_event(event);
        debug!(?kind, "{}", server_event.message);
        callback(server_event);
        true
    }
}

fn kind_of(event: &BrokerEngineEvent) -> ServerEventKind {
    match event {
        BrokerEngineEvent::ClientConnected { .. } => ServerEventKind::ClientConnected,
        BrokerEngineEvent::ClientDisconnected { .. } => ServerEventKind::ClientDisconnected,
        BrokerEngineEvent::Subscribed { .. } => ServerEventKind::Subscribed,
        BrokerEngineEvent::Unsubscribed { .. } => ServerEventKind::Unsubscribed,
        BrokerEngineEvent::MessageReceived { .. } => ServerEventKind::MessageReceived,
    }
}
