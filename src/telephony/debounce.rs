//! Duplicate suppression for ringing bursts.
//!
//! The platform may deliver several ringing symbols for one call: the first
//! often without a number, later ones repeating it. [`DebounceGate`] decides
//! which of them is a new call worth announcing. A ring without a number arms
//! a one-shot fallback; the caller owns the timer and reports back through
//! [`DebounceGate::fallback_elapsed`], which only announces if nothing was
//! recorded in the meantime.

use super::event::HIDDEN_NUMBER;

/// Outcome of offering a candidate number to the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// A call not yet announced in this episode; the number is now recorded.
    New(String),
    /// Already announced (or a fallback is already pending).
    Duplicate,
    /// No number yet. Arm a fallback timer for this generation and report it
    /// through [`DebounceGate::fallback_elapsed`] when it fires.
    ArmFallback { generation: u64 },
}

#[derive(Debug, Default)]
pub struct DebounceGate {
    recorded: Option<String>,
    fallback_armed: bool,
    generation: u64,
}

impl DebounceGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate number from a ringing symbol.
    pub fn accept(&mut self, candidate: Option<&str>) -> GateDecision {
        match candidate {
            Some(number) if self.recorded.as_deref() == Some(number) => GateDecision::Duplicate,
            Some(number) => {
                self.recorded = Some(number.to_owned());
                GateDecision::New(number.to_owned())
            }
            None if self.recorded.is_some() || self.fallback_armed => GateDecision::Duplicate,
            None => {
                self.fallback_armed = true;
                GateDecision::ArmFallback {
                    generation: self.generation,
                }
            }
        }
    }

    /// Called when a fallback timer armed for `generation` fires.
    ///
    /// Returns the sentinel to announce, or `None` when a number was recorded
    /// first or the episode has since ended.
    pub fn fallback_elapsed(&mut self, generation: u64) -> Option<String> {
        if generation != self.generation {
            return None;
        }
        self.fallback_armed = false;
        if self.recorded.is_some() {
            return None;
        }
        self.recorded = Some(HIDDEN_NUMBER.to_owned());
        Some(HIDDEN_NUMBER.to_owned())
    }

    /// Forget the recorded number and invalidate any armed fallback.
    pub fn reset(&mut self) {
        self.recorded = None;
        self.fallback_armed = false;
        self.generation = self.generation.wrapping_add(1);
    }

    #[must_use]
    pub fn recorded(&self) -> Option<&str> {
        self.recorded.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_number_is_new_and_repeat_is_duplicate() {
        let mut gate = DebounceGate::new();
        assert_eq!(gate.accept(Some("555")), GateDecision::New("555".to_owned()));
        assert_eq!(gate.accept(Some("555")), GateDecision::Duplicate);
        assert_eq!(gate.recorded(), Some("555"));
    }

    #[test]
    fn changed_number_mid_ring_is_new_again() {
        let mut gate = DebounceGate::new();
        assert_eq!(gate.accept(Some("111")), GateDecision::New("111".to_owned()));
        assert_eq!(gate.accept(Some("222")), GateDecision::New("222".to_owned()));
    }

    #[test]
    fn absent_number_arms_fallback_once() {
        let mut gate = DebounceGate::new();
        assert_eq!(gate.accept(None), GateDecision::ArmFallback { generation: 0 });
        assert_eq!(gate.accept(None), GateDecision::Duplicate);
    }

    #[test]
    fn fallback_records_sentinel_when_nothing_arrived() {
        let mut gate = DebounceGate::new();
        let GateDecision::ArmFallback { generation } = gate.accept(None) else {
            panic!("expected fallback to be armed");
        };
        assert_eq!(gate.fallback_elapsed(generation), Some(HIDDEN_NUMBER.to_owned()));
        assert_eq!(gate.recorded(), Some(HIDDEN_NUMBER));
        assert_eq!(gate.accept(None), GateDecision::Duplicate);
    }

    #[test]
    fn late_real_number_suppresses_fallback() {
        let mut gate = DebounceGate::new();
        let GateDecision::ArmFallback { generation } = gate.accept(None) else {
            panic!("expected fallback to be armed");
        };
        assert_eq!(gate.accept(Some("555")), GateDecision::New("555".to_owned()));
        assert_eq!(gate.fallback_elapsed(generation), None);
        assert_eq!(gate.recorded(), Some("555"));
    }

    #[test]
    fn fallback_from_previous_episode_is_ignored() {
        let mut gate = DebounceGate::new();
        let GateDecision::ArmFallback { generation } = gate.accept(None) else {
            panic!("expected fallback to be armed");
        };
        gate.reset();
        assert_eq!(gate.fallback_elapsed(generation), None);
        assert_eq!(gate.recorded(), None);

        // The new episode can arm its own fallback.
        assert_eq!(
            gate.accept(None),
            GateDecision::ArmFallback {
                generation: generation + 1
            }
        );
    }

    #[test]
    fn reset_allows_same_number_to_be_announced_again() {
        let mut gate = DebounceGate::new();
        gate.accept(Some("555"));
        gate.reset();
        assert_eq!(gate.accept(Some("555")), GateDecision::New("555".to_owned()));
    }
}
