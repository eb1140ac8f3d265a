// ABOUTME: Worker status, snapshots, and the per-worker output buffer
// ABOUTME: WorkerState is the mutable record shared between the registry and stream pumps

use crate::protocol::Marker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a worker.
///
/// `Idle` and `Working` are hints derived from traffic on the worker's pipes:
/// a send marks the worker working, a `result` event marks it idle. `Done`
/// and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Working,
    Done,
    Error,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Working => "working",
            WorkerStatus::Done => "done",
            WorkerStatus::Error => "error",
        }
    }

    /// The process is gone; nothing on the pipes can move it again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Done | WorkerStatus::Error)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a registered worker.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub id: String,
    pub status: WorkerStatus,
    pub system_prompt: String,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub pid: Option<u32>,
    /// Entries in the output buffer
    pub buffered: usize,
    /// Entries not yet returned by a read
    pub unread: usize,
}

/// Status plus output buffer of one worker. Always accessed under its mutex,
/// so a read's slice-and-advance is atomic with respect to pump appends.
#[derive(Debug)]
pub(crate) struct WorkerState {
    status: WorkerStatus,
    output: Vec<String>,
    last_read: usize,
}

impl WorkerState {
    pub(crate) fn new() -> Self {
        Self {
            status: WorkerStatus::Idle,
            output: Vec::new(),
            last_read: 0,
        }
    }

    pub(crate) fn status(&self) -> WorkerStatus {
        self.status
    }

    /// Move to `next` unless the worker already reached a terminal state.
    /// Returns whether the status changed.
    pub(crate) fn set_status(&mut self, next: WorkerStatus) -> bool {
        if self.status.is_terminal() || self.status == next {
            return false;
        }
        self.status = next;
        true
    }

    pub(crate) fn push_output(&mut self, text: impl Into<String>) {
        self.output.push(text.into());
    }

    /// Append a marker as its own line.
    pub(crate) fn push_marker(&mut self, marker: &Marker) {
        let needs_break = self
            .output
            .last()
            .is_some_and(|last| !last.is_empty() && !last.ends_with('\n'));
        let entry = if needs_break {
            format!("\n{}\n", marker)
        } else {
            format!("{}\n", marker)
        };
        self.output.push(entry);
    }

    /// Everything appended since the previous call; advances the cursor to the end.
    pub(crate) fn take_unread(&mut self) -> Vec<String> {
        let unread = self.output[self.last_read..].to_vec();
        self.last_read = self.output.len();
        unread
    }

    pub(crate) fn buffered(&self) -> usize {
        self.output.len()
    }

    pub(crate) fn unread(&self) -> usize {
        self.output.len() - self.last_read
    }
}
