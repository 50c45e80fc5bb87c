//! Versioned command/event envelopes exchanged with the native shell.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// V0 command set for host integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "apps.list")]
    AppsList,
    #[serde(rename = "apps.launch")]
    AppsLaunch,
    #[serde(rename = "radio.bluetooth.set")]
    RadioBluetoothSet,
    #[serde(rename = "radio.wifi.set")]
    RadioWifiSet,
    #[serde(rename = "call.place")]
    CallPlace,
    #[serde(rename = "call.state")]
    CallState,
    #[serde(rename = "call.status")]
    CallStatus,
    #[serde(rename = "capability.grant")]
    CapabilityGrant,
    #[serde(rename = "capability.deny")]
    CapabilityDeny,
    #[serde(rename = "capability.status")]
    CapabilityStatus,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
}

impl CommandName {
    /// Every command, in wire order.
    pub const ALL: &'static [Self] = &[
        Self::HostPing,
        Self::HostVersion,
        Self::AppsList,
        Self::AppsLaunch,
        Self::RadioBluetoothSet,
        Self::RadioWifiSet,
        Self::CallPlace,
        Self::CallState,
        Self::CallStatus,
        Self::CapabilityGrant,
        Self::CapabilityDeny,
        Self::CapabilityStatus,
        Self::RuntimeStop,
    ];

    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::AppsList => "apps.list",
            Self::AppsLaunch => "apps.launch",
            Self::RadioBluetoothSet => "radio.bluetooth.set",
            Self::RadioWifiSet => "radio.wifi.set",
            Self::CallPlace => "call.place",
            Self::CallState => "call.state",
            Self::CallStatus => "call.status",
            Self::CapabilityGrant => "capability.grant",
            Self::CapabilityDeny => "capability.deny",
            Self::CapabilityStatus => "capability.status",
            Self::RuntimeStop => "runtime.stop",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == raw)
    }
}

/// A versioned response envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from frontend -> backend host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
