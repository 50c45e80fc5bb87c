//! Call-state monitoring.
//!
//! Turns the platform's noisy telephony broadcasts into a clean two-event
//! lifecycle:
//!
//! ```text
//! CallEventSource ─► mpsc ─► CallMonitor ─► CallStateMachine ─► DebounceGate
//!                              │                     │
//!                              │◄─ fallback timer ◄──┘
//!                              ├─► IdentityResolver ─► ContactDirectory
//!                              └─► CallEventSink (on_incoming_call / on_call_ended)
//! ```
//!
//! [`CallService`] wires the pieces together and owns registration.

pub mod debounce;
pub mod event;
pub mod identity;
pub mod machine;
pub mod monitor;
pub mod registration;
pub mod sink;

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::CallConfig;
use crate::permissions::SharedCapabilityStore;

pub use event::{CallLifecycleEvent, CallState, PendingCall, RawCallEvent};
pub use identity::{ContactDirectory, IdentityResolver, StaticDirectory};
pub use monitor::{CallMonitor, CallMonitorHandle, CallSnapshot};
pub use registration::{CallEventSource, ForwardingSource, RegistrationStatus, SubscriptionRegistrar};
pub use sink::{CallEventSink, ChannelSink, HostEventSink, channel_sink};

/// Running call subsystem: monitor task plus its registrar.
pub struct CallService {
    handle: CallMonitorHandle,
    registrar: SubscriptionRegistrar,
    /// Child of the caller's token; shutdown cancels only this.
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl CallService {
    /// Spawn the monitor and attempt registration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &CallConfig,
        capabilities: SharedCapabilityStore,
        directory: Arc<dyn ContactDirectory>,
        source: Arc<dyn CallEventSource>,
        sink: Arc<dyn CallEventSink>,
        cancel: CancellationToken,
    ) -> Self {
        let resolver = IdentityResolver::new(
            directory,
            Arc::clone(&capabilities),
            config.lookup_timeout(),
        );
        let cancel = cancel.child_token();
        let (monitor, handle) = CallMonitor::new(config, resolver, sink, cancel.clone());
        let task = tokio::spawn(monitor.run());

        let registrar = SubscriptionRegistrar::new(source, capabilities, handle.event_sender());
        registrar.register();

        Self {
            handle,
            registrar,
            cancel,
            task,
        }
    }

    /// Forward a capability-grant signal to the registrar.
    pub fn capability_granted(&self) -> RegistrationStatus {
        self.registrar.on_capability_granted()
    }

    #[must_use]
    pub fn registration_status(&self) -> RegistrationStatus {
        self.registrar.status()
    }

    #[must_use]
    pub fn snapshot(&self) -> CallSnapshot {
        self.handle.snapshot()
    }

    #[must_use]
    pub fn handle(&self) -> &CallMonitorHandle {
        &self.handle
    }

    #[must_use]
    pub fn registrar(&self) -> &SubscriptionRegistrar {
        &self.registrar
    }

    /// Stop the monitor and wait for it to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "call monitor task ended abnormally");
        }
    }
}
