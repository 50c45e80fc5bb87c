//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! This binary reads `CommandEnvelope` messages as newline-delimited JSON
//! from stdin, dispatches them through the host command channel, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages to stdout.
//!
//! The call monitor is fed through `call.state` commands and publishes
//! `call.incoming` / `call.ended` on the same event stream.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use std::sync::Arc;

use callbridge::BridgeConfig;
use callbridge::host::channel::{CallIntegration, command_channel_with_events};
use callbridge::host::stdio::run_stdio_bridge;
use callbridge::permissions::CapabilityStore;
use callbridge::platform::StubPlatform;
use callbridge::telephony::{CallService, ForwardingSource, HostEventSink, StaticDirectory};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = BridgeConfig::default_config_path();
    let config = BridgeConfig::load_or_default(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", config_path.display()))?;

    tracing::info!(
        config = %config_path.display(),
        contacts = config.contacts.entries.len(),
        "callbridge-host starting"
    );

    let capabilities = CapabilityStore::default_shared();
    let directory = Arc::new(StaticDirectory::from_entries(&config.contacts.entries));
    let source = ForwardingSource::new();
    let (event_tx, _event_rx) = broadcast::channel(config.host.event_capacity.max(1));

    let calls = CallService::start(
        &config.calls,
        Arc::clone(&capabilities),
        directory,
        Arc::new(source.clone()),
        Arc::new(HostEventSink::new(event_tx.clone())),
        CancellationToken::new(),
    );
    tracing::info!(
        registration = calls.registration_status().as_str(),
        "call monitor initialised"
    );

    let (client, server) =
        command_channel_with_events(config.host.request_capacity, event_tx, StubPlatform);
    let server = server
        .with_capabilities(capabilities)
        .with_apps_config(config.apps.clone())
        .with_calls(CallIntegration::for_service(&calls, source));

    let result = run_stdio_bridge(client, server).await;
    calls.shutdown().await;

    result.map_err(|e| {
        tracing::error!(error = %e, "callbridge-host exited with error");
        anyhow::anyhow!("callbridge-host failed: {e}")
    })?;

    tracing::info!("callbridge-host shut down cleanly");
    Ok(())
}
