use callbridge::config::CallConfig;
use callbridge::host::channel::{CallIntegration, command_channel_with_events};
use callbridge::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use callbridge::permissions::{CapabilityKind, CapabilityStore};
use callbridge::platform::StubPlatform;
use callbridge::telephony::{
    CallEventSource, CallLifecycleEvent, CallService, ContactDirectory, ForwardingSource,
    HostEventSink, RawCallEvent, RegistrationStatus, StaticDirectory, channel_sink,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

fn test_config() -> CallConfig {
    CallConfig {
        hidden_number_fallback_ms: 50,
        lookup_timeout_ms: 200,
        event_queue_capacity: 16,
    }
}

#[derive(Default)]
struct CountingSource {
    subscriptions: AtomicUsize,
}

impl CallEventSource for CountingSource {
    fn subscribe(&self, _tx: mpsc::Sender<RawCallEvent>) -> anyhow::Result<()> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn denied_at_startup_registers_once_after_grants() {
    let source = Arc::new(CountingSource::default());
    let caps = CapabilityStore::default_shared();
    let (sink, _rx) = channel_sink();
    let service = CallService::start(
        &test_config(),
        Arc::clone(&caps),
        Arc::new(StaticDirectory::new()),
        Arc::clone(&source) as Arc<dyn CallEventSource>,
        Arc::new(sink),
        CancellationToken::new(),
    );

    assert_eq!(service.registration_status(), RegistrationStatus::Deferred);
    assert_eq!(source.subscriptions.load(Ordering::SeqCst), 0);

    for kind in CapabilityKind::CALL_MONITOR {
        caps.lock().expect("lock capability store").grant(*kind);
        service.capability_granted();
    }
    for _ in 0..5 {
        assert_eq!(service.capability_granted(), RegistrationStatus::Registered);
    }

    assert_eq!(source.subscriptions.load(Ordering::SeqCst), 1);
    service.shutdown().await;
}

async fn send(
    client: &callbridge::host::channel::HostCommandClient,
    id: &str,
    command: CommandName,
    payload: serde_json::Value,
) -> ResponseEnvelope {
    client
        .send(CommandEnvelope::new(id, command, payload))
        .await
        .expect("command should succeed")
}

async fn next_named(events: &mut broadcast::Receiver<EventEnvelope>, name: &str) -> EventEnvelope {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event recv");
            if event.event == name {
                return event;
            }
        }
    })
    .await
    .expect("event timeout")
}

#[tokio::test]
async fn host_channel_drives_registration_and_call_events() {
    let caps = CapabilityStore::default_shared();
    let source = ForwardingSource::new();
    let (event_tx, _event_rx) = broadcast::channel(64);
    let service = CallService::start(
        &test_config(),
        Arc::clone(&caps),
        Arc::new(StaticDirectory::from_entries([("5550100", "Ada")])),
        Arc::new(source.clone()),
        Arc::new(HostEventSink::new(event_tx.clone())),
        CancellationToken::new(),
    );

    let (client, server) = command_channel_with_events(8, event_tx, StubPlatform);
    let server = server
        .with_capabilities(Arc::clone(&caps))
        .with_calls(CallIntegration::for_service(&service, source));
    let handle = tokio::spawn(server.run());
    let mut events = client.subscribe_events();

    // Not registered yet: raw states are dropped like an unheard broadcast.
    let resp = send(
        &client,
        "req-early",
        CommandName::CallState,
        serde_json::json!({"state": "RINGING", "number": "5550100"}),
    )
    .await;
    assert_eq!(resp.payload["forwarded"], false);

    let resp = send(&client, "req-status-0", CommandName::CallStatus, serde_json::json!({})).await;
    assert_eq!(resp.payload["registration"], "deferred");

    for (i, capability) in ["read_phone_state", "read_call_log"].iter().enumerate() {
        let resp = send(
            &client,
            &format!("req-grant-{i}"),
            CommandName::CapabilityGrant,
            serde_json::json!({"capability": capability}),
        )
        .await;
        assert_eq!(resp.payload["registration"], "deferred");
    }

    let resp = send(
        &client,
        "req-grant-contacts",
        CommandName::CapabilityGrant,
        serde_json::json!({"capability": "android.permission.READ_CONTACTS"}),
    )
    .await;
    assert_eq!(resp.payload["registration"], "registered");

    let resp = send(
        &client,
        "req-ring",
        CommandName::CallState,
        serde_json::json!({"state": "EXTRA_STATE_RINGING", "number": "5550100"}),
    )
    .await;
    assert_eq!(resp.payload["forwarded"], true);

    let incoming = next_named(&mut events, "call.incoming").await;
    assert_eq!(incoming.payload["name"], "Ada");

    for state in ["OFFHOOK", "IDLE"] {
        let resp = send(
            &client,
            &format!("req-{state}"),
            CommandName::CallState,
            serde_json::json!({"state": state}),
        )
        .await;
        assert_eq!(resp.payload["forwarded"], true);
    }
    let ended = next_named(&mut events, "call.ended").await;
    assert_eq!(ended.payload, serde_json::json!({}));

    let resp = send(&client, "req-status-1", CommandName::CallStatus, serde_json::json!({})).await;
    assert_eq!(resp.payload["enabled"], true);
    assert_eq!(resp.payload["state"], "idle");
    assert_eq!(resp.payload["registration"], "registered");
    assert_eq!(resp.payload["pending"]["was_active"], false);

    handle.abort();
    service.shutdown().await;
}

#[tokio::test]
async fn malformed_call_state_is_a_command_error() {
    let source = ForwardingSource::new();
    let (sink, _rx) = channel_sink();
    let service = CallService::start(
        &test_config(),
        CapabilityStore::with_granted(CapabilityKind::CALL_MONITOR).into_shared(),
        Arc::new(StaticDirectory::new()),
        Arc::new(source.clone()),
        Arc::new(sink),
        CancellationToken::new(),
    );
    let (event_tx, _event_rx) = broadcast::channel::<EventEnvelope>(4);
    let (client, server) = command_channel_with_events(8, event_tx, StubPlatform);
    let server = server.with_calls(CallIntegration::for_service(&service, source));
    let handle = tokio::spawn(server.run());

    let result = client
        .send(CommandEnvelope::new(
            "req-bad-state",
            CommandName::CallState,
            serde_json::json!({"state": "HOLDING"}),
        ))
        .await;
    assert!(result.is_err());

    let result = client
        .send(CommandEnvelope::new(
            "req-bad-number",
            CommandName::CallState,
            serde_json::json!({"state": "RINGING", "number": 5550100}),
        ))
        .await;
    assert!(result.is_err());

    handle.abort();
    service.shutdown().await;
}

struct SlowDirectory;

#[async_trait::async_trait]
impl ContactDirectory for SlowDirectory {
    async fn lookup(&self, _number: &str) -> anyhow::Result<Option<String>> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(Some("Ada".to_owned()))
    }
}

#[tokio::test]
async fn forwarded_burst_during_slow_lookup_keeps_episodes_apart() {
    let source = ForwardingSource::new();
    let (sink, mut rx) = channel_sink();
    let config = CallConfig {
        lookup_timeout_ms: 1000,
        event_queue_capacity: 2,
        ..test_config()
    };
    let service = CallService::start(
        &config,
        CapabilityStore::with_granted(CapabilityKind::CALL_MONITOR).into_shared(),
        Arc::new(SlowDirectory),
        Arc::new(source.clone()),
        Arc::new(sink),
        CancellationToken::new(),
    );

    let burst = [
        RawCallEvent::ringing(Some("5550100")),
        RawCallEvent::ringing(Some("5550100")),
        RawCallEvent::OffHook,
        RawCallEvent::Idle,
        RawCallEvent::ringing(Some("5550100")),
    ];
    for event in burst {
        assert!(source.forward(event));
    }

    let ada = CallLifecycleEvent::IncomingCall {
        name: "Ada".to_owned(),
    };
    let mut received = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("lifecycle event timeout")
            .expect("lifecycle channel closed");
        received.push(event);
    }
    assert_eq!(received, vec![ada.clone(), CallLifecycleEvent::CallEnded, ada]);
    assert!(!service.snapshot().pending.was_active);

    service.shutdown().await;
}

#[tokio::test]
async fn shutdown_leaves_the_parent_token_alone() {
    let (sink, _rx) = channel_sink();
    let parent = CancellationToken::new();
    let service = CallService::start(
        &test_config(),
        CapabilityStore::default_shared(),
        Arc::new(StaticDirectory::new()),
        Arc::new(ForwardingSource::new()),
        Arc::new(sink),
        parent.clone(),
    );

    service.shutdown().await;
    assert!(!parent.is_cancelled());
}
