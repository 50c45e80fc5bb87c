//! Host command channel and router for native shell integrations.

use crate::apps::{LaunchOutcome, launch_app, launchable_apps};
use crate::config::AppsConfig;
use crate::dialer::DialString;
use crate::error::{BridgeError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::permissions::{CapabilityKind, CapabilityStore, SharedCapabilityStore};
use crate::platform::PlatformHandler;
use crate::telephony::{
    CallMonitorHandle, CallService, ForwardingSource, RawCallEvent, SubscriptionRegistrar,
};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Call subsystem hooks the router drives.
#[derive(Clone)]
pub struct CallIntegration {
    source: ForwardingSource,
    registrar: SubscriptionRegistrar,
    monitor: CallMonitorHandle,
}

impl CallIntegration {
    #[must_use]
    pub fn new(
        source: ForwardingSource,
        registrar: SubscriptionRegistrar,
        monitor: CallMonitorHandle,
    ) -> Self {
        Self {
            source,
            registrar,
            monitor,
        }
    }

    /// Hooks for a running service fed through `source`.
    #[must_use]
    pub fn for_service(service: &CallService, source: ForwardingSource) -> Self {
        Self::new(source, service.registrar().clone(), service.handle().clone())
    }
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<Result<ResponseEnvelope>>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            BridgeError::Command(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| {
                BridgeError::Channel(format!("failed to send host command request: {e}"))
            })?;

        response_rx
            .await
            .map_err(|e| BridgeError::Channel(format!("host command response dropped: {e}")))?
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer<P: PlatformHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
    platform: P,
    capabilities: SharedCapabilityStore,
    apps: AppsConfig,
    calls: Option<CallIntegration>,
}

#[must_use]
pub fn command_channel<P: PlatformHandler>(
    request_capacity: usize,
    event_capacity: usize,
    platform: P,
) -> (HostCommandClient, HostCommandServer<P>) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    command_channel_with_events(request_capacity, event_tx, platform)
}

/// Create a command channel using an existing event broadcast sender.
///
/// Lets the call subsystem publish `call.incoming` / `call.ended` on the same
/// broadcast channel the router uses, so both reach the shell through one
/// path.
#[must_use]
pub fn command_channel_with_events<P: PlatformHandler>(
    request_capacity: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    platform: P,
) -> (HostCommandClient, HostCommandServer<P>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        HostCommandServer {
            request_rx,
            event_tx,
            platform,
            capabilities: CapabilityStore::default_shared(),
            apps: AppsConfig::default(),
            calls: None,
        },
    )
}

impl<P: PlatformHandler> HostCommandServer<P> {
    /// Share a live capability store with the call subsystem.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: SharedCapabilityStore) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_apps_config(mut self, apps: AppsConfig) -> Self {
        self.apps = apps;
        self
    }

    #[must_use]
    pub fn with_calls(mut self, calls: CallIntegration) -> Self {
        self.calls = Some(calls);
        self
    }

    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.route(&request.envelope);
            let _ = request.response_tx.send(response);
        }
    }

    /// Route a command envelope to the appropriate handler.
    pub fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        match envelope.command {
            CommandName::HostPing => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"pong": true}),
            )),
            CommandName::HostVersion => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({
                    "contract_version": crate::host::contract::EVENT_VERSION,
                    "channel": "host_command_v0",
                    "crate_version": env!("CARGO_PKG_VERSION"),
                }),
            )),
            CommandName::AppsList => self.handle_apps_list(envelope),
            CommandName::AppsLaunch => self.handle_apps_launch(envelope),
            CommandName::RadioBluetoothSet => self.handle_bluetooth_set(envelope),
            CommandName::RadioWifiSet => self.handle_wifi_set(envelope),
            CommandName::CallPlace => self.handle_call_place(envelope),
            CommandName::CallState => self.handle_call_state(envelope),
            CommandName::CallStatus => self.handle_call_status(envelope),
            CommandName::CapabilityGrant => self.handle_capability_grant(envelope),
            CommandName::CapabilityDeny => self.handle_capability_deny(envelope),
            CommandName::CapabilityStatus => self.handle_capability_status(envelope),
            // The stdio bridge stops reading after answering.
            CommandName::RuntimeStop => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"accepted": true}),
            )),
        }
    }

    fn handle_apps_list(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let include_system = parse_optional_bool(&envelope.payload, "include_system_apps", "apps.list")?
            .unwrap_or(false);
        let packages = self
            .platform
            .installed_packages()
            .map_err(|e| BridgeError::Platform(format!("failed to query installed packages: {e}")))?;
        let apps = launchable_apps(packages, &self.apps.own_package, include_system);

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({ "apps": apps }),
        ))
    }

    fn handle_apps_launch(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let package_name = parse_non_empty_field(&envelope.payload, "package_name", "apps.launch")?;
        let outcome = launch_app(&self.platform, &self.apps, &package_name);

        if outcome != LaunchOutcome::Failed {
            self.emit_event(
                "app.launched",
                serde_json::json!({
                    "request_id": envelope.request_id,
                    "package_name": package_name,
                    "outcome": outcome.as_str(),
                }),
            );
        }

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "launched": outcome.launched(),
                "outcome": outcome.as_str(),
            }),
        ))
    }

    fn handle_bluetooth_set(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let enable = parse_optional_bool(&envelope.payload, "enable", "radio.bluetooth.set")?
            .unwrap_or(true);
        let applied = match self.platform.set_bluetooth(enable) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(enable, error = %e, "bluetooth toggle failed");
                false
            }
        };

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"applied": applied, "enable": enable}),
        ))
    }

    fn handle_wifi_set(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let enable =
            parse_optional_bool(&envelope.payload, "enable", "radio.wifi.set")?.unwrap_or(true);
        let payload = match self.platform.set_wifi(enable) {
            Ok(via) => serde_json::json!({"applied": true, "enable": enable, "via": via.as_str()}),
            Err(e) => {
                tracing::warn!(enable, error = %e, "wifi toggle failed");
                serde_json::json!({"applied": false, "enable": enable, "via": null})
            }
        };

        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), payload))
    }

    fn handle_call_place(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let raw = parse_non_empty_field(&envelope.payload, "number", "call.place")?;
        let number = DialString::parse(&raw)?;

        if !crate::permissions::is_granted(&self.capabilities, CapabilityKind::CallPhone) {
            return Err(BridgeError::Capability(format!(
                "call.place requires the `{}` capability",
                CapabilityKind::CallPhone
            )));
        }

        let uri = number.tel_uri();
        self.platform
            .place_call(&uri)
            .map_err(|e| BridgeError::Platform(format!("failed to place call: {e}")))?;

        self.emit_event(
            "call.place_requested",
            serde_json::json!({
                "request_id": envelope.request_id,
                "uri": uri,
            }),
        );

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "uri": uri}),
        ))
    }

    fn handle_call_state(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let calls = self.require_calls("call.state")?;
        let state = parse_non_empty_field(&envelope.payload, "state", "call.state")?;
        let number = parse_optional_string(&envelope.payload, "number", "call.state")?;
        let event = RawCallEvent::from_platform(&state, number.as_deref())
            .map_err(|e| BridgeError::Command(format!("call.state: {e}")))?;

        let forwarded = calls.source.forward(event);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"forwarded": forwarded}),
        ))
    }

    fn handle_call_status(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let Some(calls) = &self.calls else {
            return Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"enabled": false}),
            ));
        };

        let snapshot = calls.monitor.snapshot();
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "enabled": true,
                "state": snapshot.state.as_str(),
                "pending": snapshot.pending,
                "registration": calls.registrar.status().as_str(),
            }),
        ))
    }

    fn handle_capability_grant(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let kind = parse_capability(&envelope.payload, "capability.grant")?;
        self.capabilities
            .lock()
            .map_err(|_| BridgeError::Capability("capability store lock poisoned".to_owned()))?
            .grant(kind);

        let registration = self
            .calls
            .as_ref()
            .map(|calls| calls.registrar.on_capability_granted().as_str());

        self.emit_event(
            "capability.granted",
            serde_json::json!({
                "request_id": envelope.request_id,
                "capability": kind.to_string(),
            }),
        );

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "accepted": true,
                "capability": kind.to_string(),
                "registration": registration,
            }),
        ))
    }

    fn handle_capability_deny(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let kind = parse_capability(&envelope.payload, "capability.deny")?;
        self.capabilities
            .lock()
            .map_err(|_| BridgeError::Capability("capability store lock poisoned".to_owned()))?
            .deny(kind);

        self.emit_event(
            "capability.denied",
            serde_json::json!({
                "request_id": envelope.request_id,
                "capability": kind.to_string(),
            }),
        );

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "capability": kind.to_string()}),
        ))
    }

    fn handle_capability_status(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let (granted, missing) = {
            let store = self
                .capabilities
                .lock()
                .map_err(|_| BridgeError::Capability("capability store lock poisoned".to_owned()))?;
            (
                store.all_granted(),
                store.missing(CapabilityKind::CALL_MONITOR),
            )
        };

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "granted": granted,
                "missing_call_capabilities": missing,
            }),
        ))
    }

    fn require_calls(&self, command: &str) -> Result<&CallIntegration> {
        self.calls.as_ref().ok_or_else(|| {
            BridgeError::Command(format!("{command} is unavailable: call monitoring is not enabled"))
        })
    }

    fn emit_event(&self, event: &str, payload: serde_json::Value) {
        let envelope =
            EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event.to_owned(), payload);
        let _ = self.event_tx.send(envelope);
    }
}

fn parse_capability(payload: &serde_json::Value, command: &str) -> Result<CapabilityKind> {
    let raw = parse_non_empty_field(payload, "capability", command)?;
    raw.parse::<CapabilityKind>()
        .map_err(|e| BridgeError::Capability(format!("{command}: {e}")))
}

fn parse_non_empty_field(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<String> {
    let Some(raw) = payload.get(field).and_then(serde_json::Value::as_str) else {
        return Err(BridgeError::Command(format!(
            "{command} requires payload.{field}"
        )));
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(BridgeError::Command(format!(
            "{command} requires a non-empty payload.{field}"
        )));
    }
    Ok(value.to_owned())
}

fn parse_optional_string(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<Option<String>> {
    match payload.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(raw)) => Ok(Some(raw.clone())),
        Some(_) => Err(BridgeError::Command(format!(
            "{command} payload.{field} must be a string when provided"
        ))),
    }
}

fn parse_optional_bool(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<Option<bool>> {
    match payload.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(BridgeError::Command(format!(
            "{command} payload.{field} must be a boolean when provided"
        ))),
    }
}
