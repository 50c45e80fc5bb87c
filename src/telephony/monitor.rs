//! The single task that owns the call state machine.
//!
//! Raw symbols arrive on an `mpsc` queue in platform order. Withheld-number
//! fallbacks are short-lived timer tasks that post their generation back to
//! this task, so every state mutation (including the "already recorded?"
//! check that settles the timer/late-number race) happens here, one message
//! at a time. Readers see a snapshot copied out after each transition.
//!
//! Identity lookups and sink calls run on a separate notifier task, in the
//! order the machine produced them. A slow directory never stalls the raw
//! queue, and a panicking directory or sink costs one notification.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::{CallState, PendingCall, RawCallEvent};
use super::identity::IdentityResolver;
use super::machine::{CallAction, CallStateMachine};
use super::sink::CallEventSink;
use crate::config::CallConfig;
use crate::error::{BridgeError, Result};

/// Point-in-time view of the monitor, published after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CallSnapshot {
    pub state: CallState,
    pub pending: PendingCall,
}

/// Cloneable front door to a running [`CallMonitor`].
#[derive(Clone)]
pub struct CallMonitorHandle {
    events_tx: mpsc::Sender<RawCallEvent>,
    snapshot: Arc<Mutex<CallSnapshot>>,
}

impl CallMonitorHandle {
    /// Sender the telephony event source delivers raw symbols into.
    #[must_use]
    pub fn event_sender(&self) -> mpsc::Sender<RawCallEvent> {
        self.events_tx.clone()
    }

    /// Queue one raw symbol.
    pub async fn deliver(&self, event: RawCallEvent) -> Result<()> {
        self.events_tx
            .send(event)
            .await
            .map_err(|e| BridgeError::Channel(format!("call monitor is not running: {e}")))
    }

    #[must_use]
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

pub struct CallMonitor {
    machine: CallStateMachine,
    resolver: IdentityResolver,
    sink: Arc<dyn CallEventSink>,
    events_rx: mpsc::Receiver<RawCallEvent>,
    fallback_tx: mpsc::UnboundedSender<u64>,
    fallback_rx: mpsc::UnboundedReceiver<u64>,
    fallback_delay: Duration,
    snapshot: Arc<Mutex<CallSnapshot>>,
    cancel: CancellationToken,
}

impl CallMonitor {
    /// Create the monitor and its handle. Spawn [`run`](Self::run) to start it.
    pub fn new(
        config: &CallConfig,
        resolver: IdentityResolver,
        sink: Arc<dyn CallEventSink>,
        cancel: CancellationToken,
    ) -> (Self, CallMonitorHandle) {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let (fallback_tx, fallback_rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(Mutex::new(CallSnapshot::default()));

        (
            Self {
                machine: CallStateMachine::new(),
                resolver,
                sink,
                events_rx,
                fallback_tx,
                fallback_rx,
                fallback_delay: config.hidden_number_fallback(),
                snapshot: Arc::clone(&snapshot),
                cancel,
            },
            CallMonitorHandle {
                events_tx,
                snapshot,
            },
        )
    }

    /// Process events until cancelled or every event sender is dropped.
    pub async fn run(mut self) {
        info!("call monitor started");

        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let notifier = tokio::spawn(notify(
            self.resolver.clone(),
            Arc::clone(&self.sink),
            notice_rx,
        ));
        let mut cancelled = false;

        loop {
            let action = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("call monitor cancelled");
                    cancelled = true;
                    break;
                }
                Some(generation) = self.fallback_rx.recv() => {
                    self.machine.fallback_elapsed(generation)
                }
                event = self.events_rx.recv() => match event {
                    Some(event) => self.machine.apply(&event),
                    None => {
                        info!("telephony event source closed; call monitor stopping");
                        break;
                    }
                },
            };

            self.publish_snapshot();
            if let Some(action) = action {
                self.perform(action, &notice_tx);
            }
        }

        drop(notice_tx);
        if cancelled {
            notifier.abort();
        } else if let Err(e) = notifier.await {
            warn!(error = %e, "call notifier ended abnormally");
        }
    }

    fn perform(&self, action: CallAction, notices: &mpsc::UnboundedSender<CallAction>) {
        match action {
            CallAction::ArmFallback { generation } => {
                let tx = self.fallback_tx.clone();
                let delay = self.fallback_delay;
                debug!(generation, delay_ms = delay.as_millis() as u64, "arming withheld-number fallback");
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // Monitor gone means nothing left to announce.
                    let _ = tx.send(generation);
                });
            }
            notice => {
                if notices.send(notice).is_err() {
                    warn!("call notifier stopped; notification dropped");
                }
            }
        }
    }

    fn publish_snapshot(&self) {
        let Ok(mut snapshot) = self.snapshot.lock() else {
            warn!("call snapshot lock poisoned");
            return;
        };
        snapshot.state = self.machine.state();
        snapshot.pending = self.machine.pending();
    }
}

/// Drain notices in order. Each one runs in its own task so a panic in the
/// directory or sink is logged and the next notice still goes out.
async fn notify(
    resolver: IdentityResolver,
    sink: Arc<dyn CallEventSink>,
    mut notices: mpsc::UnboundedReceiver<CallAction>,
) {
    while let Some(notice) = notices.recv().await {
        let resolver = resolver.clone();
        let sink = Arc::clone(&sink);
        let outcome =
            tokio::spawn(async move { deliver(&resolver, sink.as_ref(), notice).await }).await;
        if let Err(e) = outcome {
            warn!(error = %e, "call notification aborted");
        }
    }
}

/// Hand one event to the sink. A failing sink costs this notification only.
async fn deliver(resolver: &IdentityResolver, sink: &dyn CallEventSink, notice: CallAction) {
    let (event, result) = match notice {
        CallAction::Announce { number } => {
            let name = resolver.resolve(&number).await;
            debug!(caller = %name, "announcing incoming call");
            ("call.incoming", sink.on_incoming_call(&name))
        }
        CallAction::Ended => {
            debug!("announcing call ended");
            ("call.ended", sink.on_call_ended())
        }
        CallAction::ArmFallback { .. } => return,
    };
    if let Err(e) = result {
        warn!(event, error = %e, "call event delivery failed");
    }
}
