//! Shared streaming-body plumbing for the provider adapters.
//!
//! All three wire protocols are line-framed: SSE `data:` lines for
//! Anthropic and OpenAI, one JSON object per line for Ollama. The
//! [`pump_response`] driver reads the HTTP body incrementally, reassembles
//! complete lines across chunk boundaries, and hands them to a
//! protocol-specific [`StreamParser`]. Parsed events flow into the
//! caller's channel; a dropped receiver aborts the transfer.

use tokio::sync::mpsc;
use tracing::debug;

use crate::ChatEvent;

/// Protocol-specific line parser.
///
/// Parsers are pure line-in/events-out state machines, which keeps them
/// unit-testable without any HTTP in the way.
pub(crate) trait StreamParser: Send {
    /// Process one non-empty line. Push any resulting events into `out`
    /// and return `true` when the stream is logically finished (terminal
    /// marker seen or unrecoverable parse error emitted).
    fn parse_line(&mut self, line: &str, out: &mut Vec<ChatEvent>) -> bool;

    /// Flush trailing events once the stream ends — after the terminal
    /// marker, or at EOF when none arrived. Parsers that emit their
    /// terminal event inline leave this a no-op.
    fn finish(&mut self, out: &mut Vec<ChatEvent>) {
        let _ = out;
    }
}

/// Drive a streaming HTTP response through a parser into an event channel.
///
/// Returns when the parser signals completion, the body ends, the
/// receiver is dropped (cancellation), or the transport fails (an `Error`
/// event is emitted first).
pub(crate) async fn pump_response(
    mut resp: reqwest::Response,
    mut parser: impl StreamParser,
    tx: mpsc::Sender<ChatEvent>,
) {
    let mut buffer = String::new();
    let mut events: Vec<ChatEvent> = Vec::new();
    let mut done = false;

    'read: loop {
        let chunk = match resp.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                let _ = tx
                    .send(ChatEvent::Error(format!(
                        "failed to read streaming chunk: {e}"
                    )))
                    .await;
                return;
            }
        };

        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(newline) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            done = parser.parse_line(line, &mut events);
            if !drain(&tx, &mut events).await {
                return;
            }
            if done {
                break 'read;
            }
        }
    }

    if !done {
        // The body ended without a terminal marker; parse any dangling
        // partial line first.
        let remaining = buffer.trim().to_string();
        if !remaining.is_empty() {
            parser.parse_line(&remaining, &mut events);
        }
    }
    parser.finish(&mut events);
    drain(&tx, &mut events).await;

    debug!("provider stream closed");
}

/// Forward buffered events; `false` means the receiver is gone.
async fn drain(tx: &mpsc::Sender<ChatEvent>, events: &mut Vec<ChatEvent>) -> bool {
    for event in events.drain(..) {
        if tx.send(event).await.is_err() {
            debug!("chat stream receiver dropped; cancelling transfer");
            return false;
        }
    }
    true
}

/// Run a parser over pre-split input lines — the test harness for
/// adapter state machines.
#[cfg(test)]
pub(crate) fn parse_lines(parser: &mut impl StreamParser, lines: &[&str]) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    let mut done = false;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        done = parser.parse_line(line, &mut events);
        if done {
            break;
        }
    }
    parser.finish(&mut events);
    events
}
