//! Capability registry for the bridge's permission-gated features.
//!
//! Each runtime-revocable platform permission (phone state, call log,
//! contacts, placing calls) is represented by a [`CapabilityKind`] variant.
//! The [`CapabilityStore`] tracks which capabilities the shell has reported
//! as granted or denied.
//!
//! ## Live capability store
//!
//! [`SharedCapabilityStore`] is an `Arc<Mutex<CapabilityStore>>` shared
//! between the host command router (which processes `capability.grant` and
//! `capability.deny`) and the call subsystem (which checks the store before
//! attaching to the telephony event source and before contact lookups).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// A platform capability the bridge can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Observe telephony state changes (ringing, off-hook, idle).
    ReadPhoneState,
    /// Read the caller number attached to telephony state changes.
    ReadCallLog,
    /// Resolve caller numbers to contact names.
    ReadContacts,
    /// Place outgoing calls.
    CallPhone,
}

impl CapabilityKind {
    /// Capabilities the call monitor needs before it may attach to the
    /// telephony event source.
    pub const CALL_MONITOR: &'static [CapabilityKind] = &[
        CapabilityKind::ReadPhoneState,
        CapabilityKind::ReadCallLog,
        CapabilityKind::ReadContacts,
    ];

    /// Return all capability variants.
    pub fn all() -> &'static [CapabilityKind] {
        &[
            CapabilityKind::ReadPhoneState,
            CapabilityKind::ReadCallLog,
            CapabilityKind::ReadContacts,
            CapabilityKind::CallPhone,
        ]
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityKind::ReadPhoneState => "read_phone_state",
            CapabilityKind::ReadCallLog => "read_call_log",
            CapabilityKind::ReadContacts => "read_contacts",
            CapabilityKind::CallPhone => "call_phone",
        };
        f.write_str(s)
    }
}

impl FromStr for CapabilityKind {
    type Err = CapabilityParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Accept both our snake_case names and the Android manifest names.
        match s.trim().to_ascii_lowercase().as_str() {
            "read_phone_state" | "android.permission.read_phone_state" => {
                Ok(CapabilityKind::ReadPhoneState)
            }
            "read_call_log" | "android.permission.read_call_log" => Ok(CapabilityKind::ReadCallLog),
            "read_contacts" | "contacts" | "android.permission.read_contacts" => {
                Ok(CapabilityKind::ReadContacts)
            }
            "call_phone" | "android.permission.call_phone" => Ok(CapabilityKind::CallPhone),
            _ => Err(CapabilityParseError(s.to_owned())),
        }
    }
}

/// A thread-safe, live-view capability store.
///
/// When the command router grants or revokes a capability the change is
/// immediately visible through every clone of this handle.
pub type SharedCapabilityStore = Arc<Mutex<CapabilityStore>>;

/// Error returned when parsing an unknown capability string.
#[derive(Debug, Clone)]
pub struct CapabilityParseError(pub String);

impl fmt::Display for CapabilityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown capability: {:?}", self.0)
    }
}

impl std::error::Error for CapabilityParseError {}

/// A single capability grant record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityGrant {
    /// Which capability this grant covers.
    pub kind: CapabilityKind,
    /// Whether the capability is currently granted.
    pub granted: bool,
    /// Epoch seconds when the grant was last updated.
    pub granted_at: Option<u64>,
}

/// Store of capability grants as last reported by the shell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityStore {
    #[serde(default)]
    grants: Vec<CapabilityGrant>,
}

impl CapabilityStore {
    /// Read-only access to the underlying grant records.
    pub fn grants(&self) -> &[CapabilityGrant] {
        &self.grants
    }

    /// Wrap `self` in `Arc<Mutex<_>>` so the router and the call subsystem
    /// observe the same live state.
    #[must_use]
    pub fn into_shared(self) -> SharedCapabilityStore {
        Arc::new(Mutex::new(self))
    }

    /// Create a default, empty [`SharedCapabilityStore`].
    #[must_use]
    pub fn default_shared() -> SharedCapabilityStore {
        Self::default().into_shared()
    }

    /// Build a store with every listed capability granted.
    #[must_use]
    pub fn with_granted(kinds: &[CapabilityKind]) -> Self {
        let mut store = Self::default();
        for kind in kinds {
            store.grant(*kind);
        }
        store
    }
}

impl CapabilityStore {
    /// Check whether a specific capability is currently granted.
    pub fn is_granted(&self, kind: CapabilityKind) -> bool {
        self.grants
            .iter()
            .find(|g| g.kind == kind)
            .is_some_and(|g| g.granted)
    }

    /// Grant a capability, updating the timestamp.
    pub fn grant(&mut self, kind: CapabilityKind) {
        let now = epoch_seconds();
        if let Some(existing) = self.grants.iter_mut().find(|g| g.kind == kind) {
            existing.granted = true;
            existing.granted_at = Some(now);
        } else {
            self.grants.push(CapabilityGrant {
                kind,
                granted: true,
                granted_at: Some(now),
            });
        }
    }

    /// Deny (revoke) a capability.
    pub fn deny(&mut self, kind: CapabilityKind) {
        if let Some(existing) = self.grants.iter_mut().find(|g| g.kind == kind) {
            existing.granted = false;
        } else {
            self.grants.push(CapabilityGrant {
                kind,
                granted: false,
                granted_at: None,
            });
        }
    }

    /// Return all currently granted capability kinds.
    pub fn all_granted(&self) -> Vec<CapabilityKind> {
        self.grants
            .iter()
            .filter(|g| g.granted)
            .map(|g| g.kind)
            .collect()
    }

    /// Return the members of `required` that are not currently granted.
    pub fn missing(&self, required: &[CapabilityKind]) -> Vec<CapabilityKind> {
        required
            .iter()
            .copied()
            .filter(|kind| !self.is_granted(*kind))
            .collect()
    }
}

/// Check `kind` through a shared store. A poisoned lock reads as "not granted".
pub fn is_granted(store: &SharedCapabilityStore, kind: CapabilityKind) -> bool {
    store.lock().map(|g| g.is_granted(kind)).unwrap_or(false)
}

/// Current epoch time in seconds (returns 0 on clock error).
fn epoch_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
