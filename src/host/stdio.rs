//! Newline-delimited JSON transport for the host command channel.
//!
//! One `CommandEnvelope` per input line; one `ResponseEnvelope` per command
//! on the output, interleaved with `EventEnvelope` lines as events fire.
//! Stdout carries nothing but protocol lines, so logging goes to stderr.

use crate::error::{BridgeError, Result};
use crate::host::channel::{HostCommandClient, HostCommandServer};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::platform::PlatformHandler;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Serve the channel over stdin/stdout until stdin closes or `runtime.stop`
/// is answered.
pub async fn run_stdio_bridge<P: PlatformHandler>(
    client: HostCommandClient,
    server: HostCommandServer<P>,
) -> Result<()> {
    let input = BufReader::new(tokio::io::stdin());
    serve_json_lines(client, server, input, tokio::io::stdout()).await
}

/// Serve the channel over any line reader and writer.
///
/// The router and the event forwarder run as their own tasks; commands are
/// read and answered here, in input order. Returning drops the client, which
/// lets the router task finish.
pub async fn serve_json_lines<P, R, W>(
    client: HostCommandClient,
    server: HostCommandServer<P>,
    input: R,
    output: W,
) -> Result<()>
where
    P: PlatformHandler,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer: SharedWriter<W> = Arc::new(Mutex::new(BufWriter::new(output)));

    let router = tokio::spawn(server.run());
    let forwarder = tokio::spawn(forward_events(
        client.subscribe_events(),
        Arc::clone(&writer),
    ));

    let result = answer_commands(client, input, &writer).await;

    forwarder.abort();
    let _ = forwarder.await;
    if let Err(e) = router.await {
        warn!(error = %e, "host command router ended abnormally");
    }
    result
}

async fn forward_events<W>(mut events: broadcast::Receiver<EventEnvelope>, writer: SharedWriter<W>)
where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "host event forwarder lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if let Err(e) = write_json(&writer, &event).await {
            warn!(error = %e, event = %event.event, "cannot write host event; forwarder stopping");
            break;
        }
    }
}

async fn answer_commands<R, W>(
    client: HostCommandClient,
    input: R,
    writer: &SharedWriter<W>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (response, stop) = dispatch_line(&client, line).await;
        write_json(writer, &response).await?;
        if stop {
            info!("runtime.stop answered; closing host bridge");
            return Ok(());
        }
    }
    info!("host input closed; closing host bridge");
    Ok(())
}

/// Answer one input line. The flag is set once `runtime.stop` was dispatched.
async fn dispatch_line(client: &HostCommandClient, line: &str) -> (ResponseEnvelope, bool) {
    let envelope: CommandEnvelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "unparseable host command line");
            return (
                ResponseEnvelope::error("parse-error", format!("failed to parse command envelope: {e}")),
                false,
            );
        }
    };

    let stop = envelope.command == CommandName::RuntimeStop;
    let request_id = envelope.request_id.clone();
    let command = envelope.command;
    let response = client.send(envelope).await.unwrap_or_else(|e| {
        warn!(error = %e, command = command.as_str(), "host command failed");
        error_response(&request_id, &e)
    });
    (response, stop)
}

/// Error response for a failed command, keyed to its request id when one
/// was supplied.
fn error_response(request_id: &str, error: &BridgeError) -> ResponseEnvelope {
    let request_id = if request_id.trim().is_empty() {
        "dispatch-error"
    } else {
        request_id
    };
    ResponseEnvelope::error(request_id, error.to_string())
}

async fn write_json<W, T>(writer: &SharedWriter<W>, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)
        .map_err(|e| BridgeError::Command(format!("cannot encode host message: {e}")))?;
    line.push(b'\n');

    let mut w = writer.lock().await;
    w.write_all(&line).await?;
    w.flush().await?;
    Ok(())
}
