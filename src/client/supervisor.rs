//! Reconnect supervisor
//!
//! One supervisor exists per client connection. Its state lives in a single
//! `watch` channel and every transition goes through `send_if_modified`, so
//! arming is idempotent: however many disconnect events or publish checks
//! race each other, at most one reconnect attempt is in flight.
//!
//! ```text
//!            mark_connected
//!   Idle ──────────────────────► Connected
//!    ▲                            │  ▲
//!    │ disarm      link lost /    │  │ attempt succeeded
//!    │             dead on publish▼  │
//!    └──────────────────────── Reconnecting { attempt, in_flight }
//! ```
//!
//! An attempt waits the configured interval, then reconnects with the stored
//! options. A failed attempt leaves the state at `Reconnecting` with nothing
//! in flight; the next disconnect event or publish re-arms it. A host
//! `start` or `stop` preempts a waiting attempt, which then never connects.

use crate::error::{ErrorRouter, MqttError};
use crate::transport::{ConnectOptions, ProtocolEngine};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Supervisor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Never started, or stopped by the host
    Idle,
    Connected,
    /// Link lost; `attempt` counts attempts since the last good connection
    Reconnecting { attempt: u32, in_flight: bool },
}

/// Something that may arm the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmTrigger {
    /// The engine reported that an established link went down
    LinkLost,
    /// Health check made before every publish
    PublishCheck { engine_connected: bool },
}

/// Attempt number to launch for `trigger` in `state`, or `None` to do nothing
pub fn arm_decision(state: SupervisorState, trigger: ArmTrigger) -> Option<u32> {
    match (state, trigger) {
        (SupervisorState::Idle, _) => None,
        (SupervisorState::Connected, ArmTrigger::LinkLost) => Some(1),
        (SupervisorState::Connected, ArmTrigger::PublishCheck { engine_connected }) => {
            (!engine_connected).then_some(1)
        }
        (SupervisorState::Reconnecting { in_flight: true, .. }, _) => None,
        (SupervisorState::Reconnecting { attempt, .. }, ArmTrigger::LinkLost) => Some(attempt + 1),
        (
            SupervisorState::Reconnecting { attempt, .. },
            ArmTrigger::PublishCheck { engine_connected },
        ) => (!engine_connected).then_some(attempt + 1),
    }
}

/// Sleep for `delay`, returning false if the supervisor was disarmed first
async fn interruptible_sleep(cancel_rx: &mut watch::Receiver<u64>, delay: Duration) -> bool {
    tokio::select! {
        changed = cancel_rx.changed() => {
            if changed.is_ok() {
                info!("Supervisor disarmed during reconnection delay, stopping");
            }
            false
        }
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Owns the retry policy for one client connection
pub struct ReconnectSupervisor {
    engine: Arc<dyn ProtocolEngine>,
    options: Arc<ConnectOptions>,
    interval: Duration,
    errors: ErrorRouter,
    state: watch::Sender<SupervisorState>,
    // Bumped on every disarm and preempt; waiting attempts watch it
    cancel: watch::Sender<u64>,
    // Id of the most recently launched attempt
    launches: AtomicU64,
}

impl ReconnectSupervisor {
    pub fn new(
        engine: Arc<dyn ProtocolEngine>,
        options: Arc<ConnectOptions>,
        interval: Duration,
        errors: ErrorRouter,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        let (cancel, _) = watch::channel(0);
        Self {
            engine,
            options,
            interval,
            errors,
            state,
            cancel,
            launches: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// The host is connecting directly; a waiting attempt stands down
    pub fn preempt(&self) {
        self.cancel.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }

    /// The host's `start` succeeded
    pub fn mark_connected(&self) {
        self.state.send_replace(SupervisorState::Connected);
    }

    /// The engine acknowledged a connection; only completes a pending reconnect
    pub fn on_link_up(&self) {
        self.state.send_if_modified(|state| match *state {
            SupervisorState::Reconnecting { attempt, .. } => {
                info!(attempt, "Connection re-established");
                *state = SupervisorState::Connected;
                true
            }
            _ => false,
        });
    }

    /// Cancel any pending attempt and return to `Idle`
    pub fn disarm(&self) {
        // Idle first: an arm racing this either sees Idle or already holds a receiver
        let previous = self.state.send_replace(SupervisorState::Idle);
        self.cancel.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
        if previous != SupervisorState::Idle {
            debug!(?previous, "Reconnect supervisor disarmed");
        }
    }

    /// The engine reported that an established link went down
    pub fn on_disconnect(self: &Arc<Self>, reason: &str) {
        warn!(reason = %reason, "MQTT connection lost");
        self.arm(ArmTrigger::LinkLost);
    }

    /// Called before every publish: a no-op on a healthy link, otherwise arms
    pub fn ensure_connected(self: &Arc<Self>) {
        let engine_connected = self.engine.is_connected();
        if engine_connected {
            return;
        }
        if self.state() == SupervisorState::Idle {
            debug!("Publish requested before start, not arming reconnect supervisor");
            return;
        }
        self.arm(ArmTrigger::PublishCheck { engine_connected });
    }

    fn arm(self: &Arc<Self>, trigger: ArmTrigger) {
        let cancel_rx = self.cancel.subscribe();
        let mut launch = None;
        self.state.send_if_modified(|state| match arm_decision(*state, trigger) {
            Some(attempt) => {
                *state = SupervisorState::Reconnecting {
                    attempt,
                    in_flight: true,
                };
                let id = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
                launch = Some((attempt, id));
                true
            }
            None => false,
        });

        if let Some((attempt, id)) = launch {
            self.spawn_attempt(attempt, id, cancel_rx);
        }
    }

    fn spawn_attempt(self: &Arc<Self>, attempt: u32, id: u64, cancel_rx: watch::Receiver<u64>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("No async runtime available for reconnect attempt: {}", e);
                self.release_attempt(attempt, id);
                return;
            }
        };

        info!(
            attempt,
            delay_secs = self.interval.as_secs_f64(),
            "Scheduling reconnect attempt"
        );
        let supervisor = Arc::clone(self);
        runtime.spawn(async move { supervisor.run_attempt(attempt, id, cancel_rx).await });
    }

    async fn run_attempt(&self, attempt: u32, id: u64, mut cancel_rx: watch::Receiver<u64>) {
        if !interruptible_sleep(&mut cancel_rx, self.interval).await {
            self.release_attempt(attempt, id);
            return;
        }

        info!(
            attempt,
            host = %self.options.host,
            port = self.options.port,
            "Attempting to reconnect"
        );

        match self.engine.connect(&self.options).await {
            Ok(()) => {
                let adopted = self.state.send_if_modified(|state| {
                    if matches!(state, SupervisorState::Reconnecting { .. }) {
                        *state = SupervisorState::Connected;
                        return true;
                    }
                    false
                });
                if adopted {
                    info!(attempt, "Reconnected to MQTT broker");
                } else if self.state() == SupervisorState::Idle {
                    info!("Supervisor disarmed while reconnecting, closing new connection");
                    if let Err(e) = self.engine.disconnect().await {
                        warn!("Failed to close connection after disarm: {}", e);
                    }
                }
            }
            Err(e) => {
                self.release_attempt(attempt, id);
                if cancel_rx.has_changed().unwrap_or(true) {
                    debug!(attempt, "Preempted reconnect attempt failed: {}", e);
                    return;
                }
                if let Err(unhandled) = self.errors.route(MqttError::Engine(e)) {
                    error!(attempt, "Reconnect attempt failed: {}", unhandled);
                }
            }
        }
    }

    /// Clear `in_flight` so the next trigger can arm again. A stale attempt
    /// never releases a newer one.
    fn release_attempt(&self, attempt: u32, id: u64) {
        self.state.send_if_modified(|state| match state {
            SupervisorState::Reconnecting {
                in_flight: true, ..
            } if self.launches.load(Ordering::SeqCst) == id => {
                *state = SupervisorState::Reconnecting {
                    attempt,
                    in_flight: false,
                };
                true
            }
            _ => false,
        });
    }
}

impl std::fmt::Debug for ReconnectSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectSupervisor")
            .field("state", &self.state())
            .field("interval", &self.interval)
            .field("errors", &self.errors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECONNECTING_IDLE: SupervisorState = SupervisorState::Reconnecting {
        attempt: 2,
        in_flight: false,
    };
    const RECONNECTING_BUSY: SupervisorState = SupervisorState::Reconnecting {
        attempt: 2,
        in_flight: true,
    };

    #[test]
    fn test_idle_never_arms() {
        assert_eq!(arm_decision(SupervisorState::Idle, ArmTrigger::LinkLost), None);
        assert_eq!(
            arm_decision(
                SupervisorState::Idle,
                ArmTrigger::PublishCheck {
                    engine_connected: false
                }
            ),
            None
        );
    }

    #[test]
    fn test_link_lost_from_connected_starts_first_attempt() {
        assert_eq!(
            arm_decision(SupervisorState::Connected, ArmTrigger::LinkLost),
            Some(1)
        );
    }

    #[test]
    fn test_healthy_publish_check_is_noop() {
        let healthy = ArmTrigger::PublishCheck {
            engine_connected: true,
        };
        assert_eq!(arm_decision(SupervisorState::Connected, healthy), None);
        assert_eq!(arm_decision(RECONNECTING_IDLE, healthy), None);
    }

    #[test]
    fn test_dead_link_on_publish_arms() {
        let dead = ArmTrigger::PublishCheck {
            engine_connected: false,
        };
        assert_eq!(arm_decision(SupervisorState::Connected, dead), Some(1));
        assert_eq!(arm_decision(RECONNECTING_IDLE, dead), Some(3));
    }

    #[test]
    fn test_in_flight_attempt_blocks_rearming() {
        assert_eq!(arm_decision(RECONNECTING_BUSY, ArmTrigger::LinkLost), None);
        assert_eq!(
            arm_decision(
                RECONNECTING_BUSY,
                ArmTrigger::PublishCheck {
                    engine_connected: false
                }
            ),
            None
        );
    }

    #[test]
    fn test_failed_attempt_rearms_on_next_trigger() {
        assert_eq!(arm_decision(RECONNECTING_IDLE, ArmTrigger::LinkLost), Some(3));
    }

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        let (_cancel, mut cancel_rx) = watch::channel(0u64);
        assert!(interruptible_sleep(&mut cancel_rx, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_interruptible_sleep_interrupted() {
        let (cancel, mut cancel_rx) = watch::channel(0u64);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.send_modify(|epoch| *epoch += 1);
        });

        assert!(!interruptible_sleep(&mut cancel_rx, Duration::from_secs(10)).await);
    }
}
