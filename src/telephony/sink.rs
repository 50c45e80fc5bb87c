//! Outbound lifecycle notifications.
//!
//! The monitor task never calls into the consumer directly; it hands each
//! event to a [`CallEventSink`], which moves it onto whatever execution
//! context the consumer needs (a channel drained by a UI loop, or the host
//! event bus).

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use super::event::CallLifecycleEvent;
use crate::host::contract::EventEnvelope;

/// Receiver of the two-event call lifecycle.
pub trait CallEventSink: Send + Sync + 'static {
    /// At most once per episode, after debounce and identity resolution.
    fn on_incoming_call(&self, name: &str) -> anyhow::Result<()>;
    /// At most once per episode that reached off-hook.
    fn on_call_ended(&self) -> anyhow::Result<()>;
}

/// Hands events to a consumer-owned unbounded receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CallLifecycleEvent>,
}

/// Create a [`ChannelSink`] and the receiver the consumer drains.
#[must_use]
pub fn channel_sink() -> (ChannelSink, mpsc::UnboundedReceiver<CallLifecycleEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

impl ChannelSink {
    fn deliver(&self, event: CallLifecycleEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .map_err(|e| anyhow::anyhow!("call event consumer is gone: {e}"))
    }
}

impl CallEventSink for ChannelSink {
    fn on_incoming_call(&self, name: &str) -> anyhow::Result<()> {
        self.deliver(CallLifecycleEvent::IncomingCall {
            name: name.to_owned(),
        })
    }

    fn on_call_ended(&self) -> anyhow::Result<()> {
        self.deliver(CallLifecycleEvent::CallEnded)
    }
}

/// Publishes `call.incoming` / `call.ended` on the host event bus.
#[derive(Debug, Clone)]
pub struct HostEventSink {
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostEventSink {
    #[must_use]
    pub fn new(event_tx: broadcast::Sender<EventEnvelope>) -> Self {
        Self { event_tx }
    }

    fn publish(&self, event: &str, payload: serde_json::Value) {
        let envelope =
            EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event.to_owned(), payload);
        if self.event_tx.send(envelope).is_err() {
            debug!(event, "no host event subscribers; dropping call event");
        }
    }
}

impl CallEventSink for HostEventSink {
    fn on_incoming_call(&self, name: &str) -> anyhow::Result<()> {
        self.publish("call.incoming", serde_json::json!({"name": name}));
        Ok(())
    }

    fn on_call_ended(&self) -> anyhow::Result<()> {
        self.publish("call.ended", serde_json::json!({}));
        Ok(())
    }
}
