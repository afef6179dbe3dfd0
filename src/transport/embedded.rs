//! Broker engine on the `mqtt5` embeddable broker
//!
//! Admission runs inside the broker's authentication step, so a rejected
//! client receives a CONNACK carrying the matching v5 reason code. The
//! broker only exposes its connect and subscribe authorization hooks, so
//! this engine reports `ClientConnected` for admitted clients and
//! `Subscribed` for authorized topic filters.

use crate::transport::{
    AdmissionDecision, AdmissionHook, BrokerEngine, BrokerEngineEvent, BrokerEventHook,
    BrokerOptions, ConnectionRequest, EngineError, RejectReason,
};
use async_trait::async_trait;
use mqtt5::broker::{AuthProvider, AuthResult, BrokerConfig, MqttBroker, StorageConfig};
use mqtt5::packet::connect::ConnectPacket;
use mqtt5::protocol::v5::reason_codes::ReasonCode;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Slot<T> = Arc<RwLock<Option<T>>>;
type BrokerTask = JoinHandle<mqtt5::Result<()>>;

fn current<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    match slot.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn replace<T>(slot: &RwLock<Option<T>>, value: T) {
    match slot.write() {
        Ok(mut guard) => *guard = Some(value),
        Err(poisoned) => *poisoned.into_inner() = Some(value),
    }
}

/// Socket address for `options`; the bind address must be an IP literal
pub fn listen_address(options: &BrokerOptions) -> Result<SocketAddr, EngineError> {
    let ip: IpAddr = options
        .bind_address
        .parse()
        .map_err(|e| EngineError::StartFailed(Box::new(e)))?;
    Ok(SocketAddr::new(ip, options.port))
}

fn reason_code(reason: RejectReason) -> ReasonCode {
    match reason {
        RejectReason::ClientIdentifierNotValid => ReasonCode::ClientIdentifierNotValid,
        RejectReason::BadUserNameOrPassword => ReasonCode::BadUsernameOrPassword,
    }
}

fn auth_result(decision: AdmissionDecision) -> AuthResult {
    match decision {
        AdmissionDecision::Accept => AuthResult::success(),
        AdmissionDecision::Reject(reason) => {
            AuthResult::fail_with_reason(reason_code(reason), reason.to_string())
        }
    }
}

fn connection_request(connect: &ConnectPacket, peer: SocketAddr) -> ConnectionRequest {
    ConnectionRequest {
        client_id: connect.client_id.clone(),
        username: connect.username.clone(),
        password: connect
            .password
            .as_deref()
            .map(|password| String::from_utf8_lossy(password).into_owned()),
        peer_addr: Some(peer),
    }
}

/// Feeds the broker's auth callbacks into the facade hooks
struct HookedAuth {
    events: Slot<BrokerEventHook>,
    admission: Slot<AdmissionHook>,
}

impl HookedAuth {
    fn emit(&self, event: BrokerEngineEvent) {
        if let Some(hook) = current(&self.events) {
            hook(event);
        }
    }

    fn admit(&self, request: ConnectionRequest) -> AdmissionDecision {
        let decision = match current(&self.admission) {
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

impl AuthProvider for HookedAuth {
    fn authenticate<'a>(
        &'a self,
        connect: &'a ConnectPacket,
        client_addr: SocketAddr,
    ) -> Pin<Box<dyn Future<Output = mqtt5::Result<AuthResult>> + Send + 'a>> {
        Box::pin(async move {
            let decision = self.admit(connection_request(connect, client_addr));
            Ok(auth_result(decision))
        })
    }

    fn authorize_publish<'a>(
        &'a self,
        _client_id: &str,
        _user_id: Option<&'a str>,
        _topic: &'a str,
    ) -> Pin<Box<dyn Future<Output = mqtt5::Result<bool>> + Send + 'a>> {
        Box::pin(async move { Ok(true) })
    }

    fn authorize_subscribe<'a>(
        &'a self,
        client_id: &str,
        _user_id: Option<&'a str>,
        topic_filter: &'a str,
    ) -> Pin<Box<dyn Future<Output = mqtt5::Result<bool>> + Send + 'a>> {
        let client_id = client_id.to_string();
        Box::pin(async move {
            self.emit(BrokerEngineEvent::Subscribed {
                client_id,
                topic_filter: topic_filter.to_string(),
            });
            Ok(true)
        })
    }
}

/// Production [`BrokerEngine`] running an in-process `mqtt5` broker
pub struct EmbeddedBrokerEngine {
    task: Mutex<Option<BrokerTask>>,
    events: Slot<BrokerEventHook>,
    admission: Slot<AdmissionHook>,
}

impl EmbeddedBrokerEngine {
    pub fn new() -> Self {
        Self {
            task: Mutex::new(None),
            events: Arc::new(RwLock::new(None)),
            admission: Arc::new(RwLock::new(None)),
        }
    }

    fn auth_provider(&self) -> Arc<HookedAuth> {
        Arc::new(HookedAuth {
            events: self.events.clone(),
            admission: self.admission.clone(),
        })
    }
}

impl Default for EmbeddedBrokerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerEngine for EmbeddedBrokerEngine {
    async fn start(&self, options: &BrokerOptions) -> Result<(), EngineError> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|running| !running.is_finished()) {
            return Err(EngineError::StartFailed("broker is already running".into()));
        }

        let address = listen_address(options)?;
        // Sessions and retained messages live in memory only
        let config = BrokerConfig::default()
            .with_bind_address(address)
            .with_storage(StorageConfig {
                enable_persistence: false,
                ..StorageConfig::default()
            });
        let mut broker = MqttBroker::with_config(config)
            .await
            .map_err(|e| EngineError::StartFailed(Box::new(e)))?
            .with_auth_provider(self.auth_provider());

        info!(%address, "Embedded MQTT broker listening");
        *task = Some(tokio::spawn(async move { broker.run().await }));
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        let Some(handle) = self.task.lock().await.take() else {
            debug!("Embedded broker not running, nothing to stop");
            return Ok(());
        };

        if handle.is_finished() {
            return match handle.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(EngineError::StopFailed(Box::new(e))),
                Err(e) => Err(EngineError::StopFailed(Box::new(e))),
            };
        }

        // Dropping the broker closes its shutdown channel, which ends every client session
        handle.abort();
        match handle.await {
            Err(e) if e.is_panic() => Err(EngineError::StopFailed(Box::new(e))),
            _ => {
                info!("Embedded MQTT broker stopped");
                Ok(())
            }
        }
    }

    fn set_event_hook(&self, hook: BrokerEventHook) {
        replace(&self.events, hook);
    }

    fn set_admission_hook(&self, hook: AdmissionHook) {
        replace(&self.admission, hook);
    }
}

impl Drop for EmbeddedBrokerEngine {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(handle) = task.take().filter(|handle| !handle.is_finished()) {
                warn!("Embedded broker dropped while running, aborting it");
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn options(bind_address: &str, port: u16) -> BrokerOptions {
        BrokerOptions {
            bind_address: bind_address.to_string(),
            port,
        }
    }

    fn request(client_id: &str) -> ConnectionRequest {
        ConnectionRequest {
            client_id: client_id.to_string(),
            username: None,
            password: None,
            peer_addr: None,
        }
    }

    #[test]
    fn test_listen_address() {
        let address = listen_address(&options("0.0.0.0", 1884)).unwrap();
        assert_eq!(address.port(), 1884);
        assert!(address.ip().is_unspecified());

        assert!(listen_address(&options("::1", 1883)).unwrap().is_ipv6());
        assert!(matches!(
            listen_address(&options("broker.local", 1883)),
            Err(EngineError::StartFailed(_))
        ));
    }

    #[test]
    fn test_rejections_carry_connack_codes() {
        let rejected = auth_result(AdmissionDecision::Reject(
            RejectReason::BadUserNameOrPassword,
        ));
        assert!(!rejected.authenticated);
        assert_eq!(rejected.reason_code, ReasonCode::BadUsernameOrPassword);
        assert_eq!(
            rejected.reason_string.as_deref(),
            Some("bad username or password")
        );

        let rejected = auth_result(AdmissionDecision::Reject(
            RejectReason::ClientIdentifierNotValid,
        ));
        assert_eq!(rejected.reason_code, ReasonCode::ClientIdentifierNotValid);

        assert!(auth_result(AdmissionDecision::Accept).authenticated);
    }

    #[test]
    fn test_admission_hook_gates_connected_event() {
        let engine = EmbeddedBrokerEngine::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        engine.set_event_hook(Arc::new(move |event: BrokerEngineEvent| {
            sink.lock().unwrap().push(event);
        }));
        engine.set_admission_hook(Arc::new(|request: &ConnectionRequest| {
            if request.client_id == "dev-1" {
                AdmissionDecision::Accept
            } else {
                AdmissionDecision::Reject(RejectReason::ClientIdentifierNotValid)
            }
        }));

        let auth = engine.auth_provider();
        assert!(!auth.admit(request("intruder")).is_accepted());
        assert!(auth.admit(request("dev-1")).is_accepted());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![BrokerEngineEvent::ClientConnected {
                client_id: "dev-1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_start_and_stop_on_ephemeral_port() {
        let engine = EmbeddedBrokerEngine::new();
        engine.start(&options("127.0.0.1", 0)).await.unwrap();
        assert!(matches!(
            engine.start(&options("127.0.0.1", 0)).await,
            Err(EngineError::StartFailed(_))
        ));

        engine.stop().await.unwrap();
        // Second stop is a no-op
        engine.stop().await.unwrap();
    }
}
