//! Capability-gated attachment to the telephony event source.
//!
//! The monitor only receives raw symbols once [`SubscriptionRegistrar`] has
//! subscribed it to a [`CallEventSource`]. That requires every capability in
//! [`CapabilityKind::CALL_MONITOR`]. Without them registration is deferred
//! and a single retry is armed; the first grant signal that finds the full
//! set spends it. Registration itself is idempotent.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::event::RawCallEvent;
use crate::permissions::{CapabilityKind, SharedCapabilityStore};

/// Platform telephony broadcast source.
pub trait CallEventSource: Send + Sync + 'static {
    /// Start delivering raw symbols into `tx`, in arrival order.
    fn subscribe(&self, tx: mpsc::Sender<RawCallEvent>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// No registration attempted yet.
    Unregistered,
    /// Capabilities missing; waiting for a grant signal.
    Deferred,
    /// Attached to the event source.
    Registered,
    /// The single retry was spent and the source refused the subscription.
    Failed,
}

impl RegistrationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Deferred => "deferred",
            Self::Registered => "registered",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug)]
struct RegistrarState {
    status: RegistrationStatus,
    retry_armed: bool,
}

#[derive(Clone)]
pub struct SubscriptionRegistrar {
    state: Arc<Mutex<RegistrarState>>,
    source: Arc<dyn CallEventSource>,
    capabilities: SharedCapabilityStore,
    events_tx: mpsc::Sender<RawCallEvent>,
}

impl SubscriptionRegistrar {
    pub fn new(
        source: Arc<dyn CallEventSource>,
        capabilities: SharedCapabilityStore,
        events_tx: mpsc::Sender<RawCallEvent>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistrarState {
                status: RegistrationStatus::Unregistered,
                retry_armed: false,
            })),
            source,
            capabilities,
            events_tx,
        }
    }

    /// Attach to the event source if allowed; otherwise defer until a grant.
    pub fn register(&self) -> RegistrationStatus {
        let Ok(mut state) = self.state.lock() else {
            error!("registrar state lock poisoned");
            return RegistrationStatus::Failed;
        };

        match state.status {
            RegistrationStatus::Registered => {
                debug!("telephony listener already registered");
                return state.status;
            }
            RegistrationStatus::Failed => return state.status,
            RegistrationStatus::Unregistered | RegistrationStatus::Deferred => {}
        }

        let missing = self.missing_capabilities();
        if !missing.is_empty() {
            info!(?missing, "telephony listener deferred until capabilities are granted");
            state.status = RegistrationStatus::Deferred;
            state.retry_armed = true;
            return state.status;
        }

        self.attempt(&mut state)
    }

    /// Signal from the shell that one or more capabilities were granted.
    pub fn on_capability_granted(&self) -> RegistrationStatus {
        let Ok(mut state) = self.state.lock() else {
            error!("registrar state lock poisoned");
            return RegistrationStatus::Failed;
        };

        if state.status != RegistrationStatus::Deferred || !state.retry_armed {
            return state.status;
        }

        let missing = self.missing_capabilities();
        if !missing.is_empty() {
            debug!(?missing, "grant received but capabilities still missing");
            return state.status;
        }

        state.retry_armed = false;
        info!("capabilities granted; retrying telephony registration");
        self.attempt(&mut state)
    }

    #[must_use]
    pub fn status(&self) -> RegistrationStatus {
        self.state
            .lock()
            .map(|s| s.status)
            .unwrap_or(RegistrationStatus::Failed)
    }

    fn attempt(&self, state: &mut RegistrarState) -> RegistrationStatus {
        state.status = match self.source.subscribe(self.events_tx.clone()) {
            Ok(()) => {
                info!("telephony listener registered");
                RegistrationStatus::Registered
            }
            Err(e) => {
                error!(error = %e, "telephony listener registration failed");
                RegistrationStatus::Failed
            }
        };
        state.status
    }

    fn missing_capabilities(&self) -> Vec<CapabilityKind> {
        self.capabilities
            .lock()
            .map(|store| store.missing(CapabilityKind::CALL_MONITOR))
            .unwrap_or_else(|_| CapabilityKind::CALL_MONITOR.to_vec())
    }
}

/// Event source fed by the shell over the host command channel.
///
/// Until something subscribes, forwarded symbols are dropped, exactly as a
/// platform broadcast is lost when no receiver is registered. Once
/// subscribed, symbols go through an unbounded relay into the monitor queue,
/// so a momentarily full queue delays them instead of losing them.
#[derive(Debug, Clone, Default)]
pub struct ForwardingSource {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<RawCallEvent>>>>,
}

impl ForwardingSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.tx.lock().map(|tx| tx.is_some()).unwrap_or(false)
    }

    /// Push one symbol to the subscriber. Returns whether it was queued.
    pub fn forward(&self, event: RawCallEvent) -> bool {
        let Some(tx) = self.tx.lock().ok().and_then(|tx| tx.clone()) else {
            debug!(?event, "telephony symbol dropped; no listener registered");
            return false;
        };
        if tx.send(event).is_err() {
            warn!("call monitor stopped; symbol dropped");
            return false;
        }
        true
    }
}

/// Move symbols from the relay into the bounded monitor queue, in order.
async fn relay(
    mut relay_rx: mpsc::UnboundedReceiver<RawCallEvent>,
    monitor_tx: mpsc::Sender<RawCallEvent>,
) {
    while let Some(event) = relay_rx.recv().await {
        if monitor_tx.send(event).await.is_err() {
            debug!("call monitor stopped; telephony relay closing");
            break;
        }
    }
}

impl CallEventSource for ForwardingSource {
    fn subscribe(&self, tx: mpsc::Sender<RawCallEvent>) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| anyhow::anyhow!("forwarding source needs a tokio runtime: {e}"))?;
        let mut slot = self
            .tx
            .lock()
            .map_err(|_| anyhow::anyhow!("forwarding source lock poisoned"))?;
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        runtime.spawn(relay(relay_rx, tx));
        *slot = Some(relay_tx);
        Ok(())
    }
}
