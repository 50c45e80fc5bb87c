//! Raw telephony symbols, call states, and the outbound lifecycle events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel recorded when a ring arrives without a caller number and none
/// shows up before the fallback delay elapses.
pub const HIDDEN_NUMBER: &str = "hidden";

/// Display name used whenever a caller cannot be identified.
pub const UNKNOWN_CALLER: &str = "Unknown";

/// A state-change symbol as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RawCallEvent {
    /// The phone is ringing. The number may be absent on the first delivery.
    Ringing { number: Option<String> },
    /// A call is connected (answered, dialling, or already active).
    OffHook,
    /// No call activity.
    Idle,
}

impl RawCallEvent {
    /// Build a ringing event, treating a blank number as absent.
    #[must_use]
    pub fn ringing(number: Option<&str>) -> Self {
        Self::Ringing {
            number: normalize_incoming_number(number),
        }
    }

    /// Parse a platform state string plus its optional number extra.
    ///
    /// Accepts `RINGING`/`OFFHOOK`/`IDLE` in any case, with or without the
    /// `EXTRA_STATE_` / `CALL_STATE_` prefixes. The number is ignored for
    /// anything but ringing.
    pub fn from_platform(state: &str, number: Option<&str>) -> Result<Self, RawEventParseError> {
        match state.parse::<CallState>()? {
            CallState::Ringing => Ok(Self::ringing(number)),
            CallState::OffHook => Ok(Self::OffHook),
            CallState::Idle => Ok(Self::Idle),
        }
    }
}

fn normalize_incoming_number(number: Option<&str>) -> Option<String> {
    number
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
}

/// Where the call state machine currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Idle,
    Ringing,
    OffHook,
}

impl CallState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ringing => "ringing",
            Self::OffHook => "off_hook",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallState {
    type Err = RawEventParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper
            .strip_prefix("EXTRA_STATE_")
            .or_else(|| upper.strip_prefix("CALL_STATE_"))
            .unwrap_or(&upper);
        match bare {
            "RINGING" => Ok(Self::Ringing),
            "OFFHOOK" | "OFF_HOOK" => Ok(Self::OffHook),
            "IDLE" => Ok(Self::Idle),
            _ => Err(RawEventParseError(s.to_owned())),
        }
    }
}

/// Error returned for an unrecognised platform state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEventParseError(pub String);

impl fmt::Display for RawEventParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown telephony state: {:?}", self.0)
    }
}

impl std::error::Error for RawEventParseError {}

/// Snapshot of the per-episode bookkeeping held by the state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingCall {
    /// Number (or [`HIDDEN_NUMBER`]) already announced for this episode.
    pub last_announced_number: Option<String>,
    /// Whether the episode reached off-hook.
    pub was_active: bool,
}

/// Clean lifecycle notification delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CallLifecycleEvent {
    IncomingCall { name: String },
    CallEnded,
}
