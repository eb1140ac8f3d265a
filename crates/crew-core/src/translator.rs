// ABOUTME: Per-worker stream pumps between the child's pipes and its WorkerState
// ABOUTME: Decodes stdout events into buffered text and status flips; tags stderr lines

use crate::protocol::{decode_line, Marker, StreamEvent};
use crate::worker::{WorkerState, WorkerStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) type SharedState = Arc<Mutex<WorkerState>>;

/// Lock a worker's state. A panic while holding the lock cannot leave the
/// buffer half-written, so poisoning is ignored.
pub(crate) fn lock(state: &SharedState) -> MutexGuard<'_, WorkerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply one decoded stdout event.
pub(crate) fn apply_event(worker_id: &str, state: &mut WorkerState, event: StreamEvent) {
    match event {
        StreamEvent::Assistant { texts } => {
            for text in texts {
                state.push_output(text);
            }
        }
        StreamEvent::Result { error } => {
            if let Some(message) = error {
                tracing::warn!(worker_id = %worker_id, error = %message, "Worker turn failed");
                state.push_marker(&Marker::Error(message));
            }
            if state.set_status(WorkerStatus::Idle) {
                tracing::debug!(worker_id = %worker_id, "Worker turn complete");
            }
        }
        StreamEvent::Other { kind } => {
            tracing::trace!(worker_id = %worker_id, kind = %kind, "Ignoring stream event");
        }
    }
}

fn handle_stdout_line(worker_id: &str, state: &SharedState, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match decode_line(line) {
        Some(event) => apply_event(worker_id, &mut lock(state), event),
        None => {
            let display_line = if line.chars().count() > 200 {
                let truncated: String = line.chars().take(200).collect();
                format!("{}...[truncated]", truncated)
            } else {
                line.trim_end().to_string()
            };
            tracing::debug!(
                worker_id = %worker_id,
                line = %display_line,
                "Discarding undecodable worker output"
            );
        }
    }
}

fn handle_stderr_line(worker_id: &str, state: &SharedState, line: &str) {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return;
    }
    tracing::debug!(worker_id = %worker_id, stderr = %line, "Worker stderr");
    lock(state).push_marker(&Marker::Stderr(line.to_string()));
}

/// Read `reader` line by line until EOF, handing each line to `on_line`.
/// Invalid UTF-8 is replaced rather than ending the stream.
async fn for_each_line<R, F>(worker_id: &str, stream: &'static str, reader: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => on_line(&String::from_utf8_lossy(&buf)),
            Err(e) => {
                tracing::warn!(worker_id = %worker_id, stream, error = %e, "Worker stream read failed");
                break;
            }
        }
    }
    tracing::debug!(worker_id = %worker_id, stream, "Worker stream closed");
}

/// Consume the worker's stdout until EOF.
pub(crate) async fn pump_stdout<R>(worker_id: String, reader: R, state: SharedState)
where
    R: AsyncRead + Unpin,
{
    for_each_line(&worker_id, "stdout", reader, |line| {
        handle_stdout_line(&worker_id, &state, line)
    })
    .await;
}

/// Consume the worker's stderr until EOF.
pub(crate) async fn pump_stderr<R>(worker_id: String, reader: R, state: SharedState)
where
    R: AsyncRead + Unpin,
{
    for_each_line(&worker_id, "stderr", reader, |line| {
        handle_stderr_line(&worker_id, &state, line)
    })
    .await;
}

/// Own the worker's stdin: write queued frames in order until the queue
/// closes, the worker is cancelled, or a write fails.
pub(crate) async fn pump_stdin<W>(
    worker_id: String,
    mut writer: W,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let result = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            // The child closed stdin or exited; its exit is reported by the waiter
            tracing::warn!(worker_id = %worker_id, error = %e, "Failed to write to worker stdin");
            break;
        }
    }
    tracing::debug!(worker_id = %worker_id, "Worker stdin closed");
}
