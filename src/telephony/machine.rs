//! Call lifecycle reconstruction from raw telephony symbols.
//!
//! [`CallStateMachine`] is a synchronous transition function. It never
//! performs I/O: each transition returns at most one [`CallAction`] which the
//! monitor task carries out (identity lookup, event delivery, fallback timer).
//!
//! A bare `IDLE` is ambiguous: it follows both a finished call and a ring
//! that stopped without being answered. The off-hook marker (`was_active`)
//! decides whether it ends a call.

use tracing::debug;

use super::debounce::{DebounceGate, GateDecision};
use super::event::{CallState, PendingCall, RawCallEvent};

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    /// Resolve `number` and announce an incoming call.
    Announce { number: String },
    /// Start the withheld-number fallback timer for `generation`.
    ArmFallback { generation: u64 },
    /// Announce that the active call ended.
    Ended,
}

#[derive(Debug, Default)]
pub struct CallStateMachine {
    state: CallState,
    was_active: bool,
    gate: DebounceGate,
}

impl CallStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one raw symbol.
    pub fn apply(&mut self, event: &RawCallEvent) -> Option<CallAction> {
        let action = match event {
            RawCallEvent::Ringing { number } => {
                self.state = CallState::Ringing;
                match self.gate.accept(number.as_deref()) {
                    GateDecision::New(number) => Some(CallAction::Announce { number }),
                    GateDecision::ArmFallback { generation } => {
                        Some(CallAction::ArmFallback { generation })
                    }
                    GateDecision::Duplicate => None,
                }
            }
            RawCallEvent::OffHook => {
                self.state = CallState::OffHook;
                self.was_active = true;
                None
            }
            RawCallEvent::Idle => {
                self.state = CallState::Idle;
                self.gate.reset();
                if std::mem::take(&mut self.was_active) {
                    Some(CallAction::Ended)
                } else {
                    None
                }
            }
        };
        debug!(?event, state = %self.state, ?action, "telephony transition");
        action
    }

    /// Report that the fallback timer armed for `generation` fired.
    pub fn fallback_elapsed(&mut self, generation: u64) -> Option<CallAction> {
        let number = self.gate.fallback_elapsed(generation)?;
        debug!(generation, "no caller number arrived; announcing as withheld");
        Some(CallAction::Announce { number })
    }

    #[must_use]
    pub fn state(&self) -> CallState {
        self.state
    }

    #[must_use]
    pub fn pending(&self) -> PendingCall {
        PendingCall {
            last_announced_number: self.gate.recorded().map(str::to_owned),
            was_active: self.was_active,
        }
    }
}
