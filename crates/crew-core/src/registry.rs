// ABOUTME: Worker registry - spawns, tracks, drives, and kills worker processes
// ABOUTME: Every operation is synchronous; child I/O runs on per-worker tokio tasks

use crate::command::WorkerCommand;
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::protocol::{encode_user_message, Marker};
use crate::translator::{self, lock, SharedState};
use crate::worker::{WorkerInfo, WorkerState, WorkerStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long a killed worker gets to exit on SIGTERM before it is force-killed.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Parameters for [`WorkerRegistry::spawn`].
#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    /// Worker id; allocated as `worker_N` when absent or empty
    pub id: Option<String>,
    /// Role-defining instruction passed to the worker at launch
    pub system_prompt: String,
    /// Directory the worker runs in; defaults to the supervisor's cwd
    pub working_dir: Option<PathBuf>,
}

impl SpawnRequest {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            id: None,
            system_prompt: system_prompt.into(),
            working_dir: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// A registered worker: its record plus the plumbing to its process.
struct WorkerHandle {
    id: String,
    seq: u64,
    system_prompt: String,
    working_dir: PathBuf,
    created_at: DateTime<Utc>,
    pid: Option<u32>,
    state: SharedState,
    /// Frames for the stdin pump; `None` when the process never started
    stdin: Option<mpsc::UnboundedSender<Vec<u8>>>,
    /// Cancelled when the worker is killed; stops its pumps and deferred sends
    cancel: CancellationToken,
}

impl WorkerHandle {
    fn info(&self) -> WorkerInfo {
        let state = lock(&self.state);
        WorkerInfo {
            id: self.id.clone(),
            status: state.status(),
            system_prompt: self.system_prompt.clone(),
            working_dir: self.working_dir.clone(),
            created_at: self.created_at,
            pid: self.pid,
            buffered: state.buffered(),
            unread: state.unread(),
        }
    }

    /// Mark the worker busy and queue one user turn.
    fn send(&self, message: &str) {
        if self.cancel.is_cancelled() {
            tracing::debug!(worker_id = %self.id, "Dropping send to killed worker");
            return;
        }
        lock(&self.state).set_status(WorkerStatus::Working);
        self.write(encode_user_message(message).into_bytes());
    }

    fn write(&self, frame: Vec<u8>) {
        if self.cancel.is_cancelled() {
            return;
        }
        match &self.stdin {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    tracing::debug!(worker_id = %self.id, "Worker stdin already closed");
                }
            }
            None => tracing::debug!(worker_id = %self.id, "Worker has no stdin"),
        }
    }
}

#[derive(Default)]
struct Inner {
    workers: HashMap<String, Arc<WorkerHandle>>,
    /// Last auto-allocated id number; never decreases
    counter: u64,
    /// Spawn order, for listing
    seq: u64,
}

/// Owns every live worker. Construct one per supervisor; dropping it (or
/// calling [`WorkerRegistry::shutdown`]) terminates all remaining workers.
///
/// `spawn` and `interrupt` start tokio tasks and must be called from within a
/// Tokio runtime.
pub struct WorkerRegistry {
    command: WorkerCommand,
    interrupt_sequence: Vec<u8>,
    interrupt_delay: Duration,
    drain_timeout: Duration,
    inner: Mutex<Inner>,
}

impl WorkerRegistry {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            command: WorkerCommand::new(config),
            interrupt_sequence: config.interrupt_sequence.as_bytes().to_vec(),
            interrupt_delay: config.interrupt_delay(),
            drain_timeout: config.drain_timeout(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, worker_id: &str) -> Result<Arc<WorkerHandle>, WorkerError> {
        self.inner()
            .workers
            .get(worker_id)
            .cloned()
            .ok_or_else(|| WorkerError::WorkerNotFound(worker_id.to_string()))
    }

    /// Launch a worker process and register it.
    ///
    /// Returns as soon as the process is started. A process that cannot be
    /// started still yields a registered worker, in `error` status with the
    /// cause in its output buffer.
    pub fn spawn(&self, request: SpawnRequest) -> Result<WorkerInfo, WorkerError> {
        let mut inner = self.inner();

        let id = match request.id.filter(|id| !id.is_empty()) {
            Some(id) => {
                if inner.workers.contains_key(&id) {
                    return Err(WorkerError::DuplicateWorker(id));
                }
                id
            }
            None => loop {
                inner.counter += 1;
                let candidate = format!("worker_{}", inner.counter);
                if !inner.workers.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        let working_dir = request
            .working_dir
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let state: SharedState = Arc::new(Mutex::new(WorkerState::new()));
        let cancel = CancellationToken::new();
        let mut pid = None;
        let mut stdin = None;

        match self
            .command
            .build(&request.system_prompt, &working_dir)
            .spawn()
        {
            Ok(child) => {
                pid = child.id();
                tracing::info!(
                    worker_id = %id,
                    pid = ?pid,
                    cwd = %working_dir.display(),
                    "Spawned worker"
                );
                stdin = Some(self.attach(&id, child, &state, &cancel));
            }
            Err(e) => {
                tracing::error!(worker_id = %id, binary = %self.command.binary(), error = %e, "Failed to spawn worker");
                let mut state = lock(&state);
                state.push_marker(&Marker::Error(format!(
                    "failed to spawn {}: {}",
                    self.command.binary(),
                    e
                )));
                state.set_status(WorkerStatus::Error);
            }
        }

        inner.seq += 1;
        let handle = Arc::new(WorkerHandle {
            id: id.clone(),
            seq: inner.seq,
            system_prompt: request.system_prompt,
            working_dir,
            created_at: Utc::now(),
            pid,
            state,
            stdin,
            cancel,
        });
        let info = handle.info();
        inner.workers.insert(id, handle);
        Ok(info)
    }

    /// Start the pumps and exit watcher for a freshly spawned child.
    /// Returns the sender feeding its stdin.
    fn attach(
        &self,
        worker_id: &str,
        mut child: Child,
        state: &SharedState,
        cancel: &CancellationToken,
    ) -> mpsc::UnboundedSender<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut pumps = Vec::new();

        if let Some(stdin) = child.stdin.take() {
            tokio::spawn(translator::pump_stdin(
                worker_id.to_string(),
                stdin,
                rx,
                cancel.clone(),
            ));
        }
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(translator::pump_stdout(
                worker_id.to_string(),
                stdout,
                state.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(translator::pump_stderr(
                worker_id.to_string(),
                stderr,
                state.clone(),
            )));
        }

        tokio::spawn(watch_exit(
            worker_id.to_string(),
            child,
            state.clone(),
            pumps,
            cancel.clone(),
            self.drain_timeout,
        ));

        tx
    }

    /// Queue a user turn and mark the worker `working`. Never waits on the child.
    pub fn send(&self, worker_id: &str, message: &str) -> Result<(), WorkerError> {
        let handle = self.handle(worker_id)?;
        handle.send(message);
        tracing::debug!(worker_id = %worker_id, "Queued message");
        Ok(())
    }

    /// Output appended since the previous read, in order.
    pub fn read(&self, worker_id: &str) -> Result<Vec<String>, WorkerError> {
        let handle = self.handle(worker_id)?;
        let unread = lock(&handle.state).take_unread();
        Ok(unread)
    }

    pub fn status(&self, worker_id: &str) -> Result<WorkerStatus, WorkerError> {
        let handle = self.handle(worker_id)?;
        let status = lock(&handle.state).status();
        Ok(status)
    }

    /// Abort the worker's current turn, then send `message` after the
    /// configured delay. The follow-up is dropped if the worker is killed first.
    pub fn interrupt(&self, worker_id: &str, message: &str) -> Result<(), WorkerError> {
        let handle = self.handle(worker_id)?;

        handle.write(self.interrupt_sequence.clone());
        {
            let mut state = lock(&handle.state);
            state.push_marker(&Marker::Interrupted(message.to_string()));
            state.set_status(WorkerStatus::Idle);
        }
        tracing::info!(worker_id = %worker_id, "Interrupted worker");

        let delay = self.interrupt_delay;
        let message = message.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = handle.cancel.cancelled() => {
                    tracing::debug!(worker_id = %handle.id, "Worker killed before follow-up send");
                }
                _ = tokio::time::sleep(delay) => handle.send(&message),
            }
        });

        Ok(())
    }

    /// Terminate and deregister a worker. Returns `false` if it was not registered.
    pub fn kill(&self, worker_id: &str) -> bool {
        let Some(handle) = self.inner().workers.remove(worker_id) else {
            return false;
        };
        handle.cancel.cancel();
        tracing::info!(worker_id = %worker_id, pid = ?handle.pid, "Killed worker");
        true
    }

    /// Snapshot of every registered worker, in spawn order.
    pub fn list(&self) -> Vec<WorkerInfo> {
        let mut handles: Vec<Arc<WorkerHandle>> = self.inner().workers.values().cloned().collect();
        handles.sort_by_key(|h| h.seq);
        handles.iter().map(|h| h.info()).collect()
    }

    pub fn get(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.handle(worker_id).ok().map(|h| h.info())
    }

    pub fn len(&self) -> usize {
        self.inner().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().workers.is_empty()
    }

    /// Kill every registered worker. Returns how many were killed.
    pub fn shutdown(&self) -> usize {
        let handles: Vec<Arc<WorkerHandle>> =
            self.inner().workers.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.cancel.cancel();
        }
        if !handles.is_empty() {
            tracing::info!(count = handles.len(), "Shut down all workers");
        }
        handles.len()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new(&WorkerConfig::default())
    }
}

impl Drop for WorkerRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wait for the child to exit and record it, or terminate it when the worker
/// is killed. Owning the child here means the pid cannot be recycled before
/// the signal is sent.
async fn watch_exit(
    worker_id: String,
    mut child: Child,
    state: SharedState,
    pumps: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    drain_timeout: Duration,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            terminate(&worker_id, &mut child).await;
            return;
        }
    };

    // Output written just before exit may still be in the pipes
    let drained = tokio::time::timeout(drain_timeout, async {
        for pump in pumps {
            let _ = pump.await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::debug!(worker_id = %worker_id, "Worker pipes still open after exit");
    }

    let mut state = lock(&state);
    match status {
        Ok(status) => {
            tracing::info!(worker_id = %worker_id, code = ?status.code(), "Worker exited");
            state.push_marker(&Marker::Exit(status.code()));
            state.set_status(WorkerStatus::Done);
        }
        Err(e) => {
            tracing::error!(worker_id = %worker_id, error = %e, "Failed to wait on worker");
            state.push_marker(&Marker::Error(e.to_string()));
            state.set_status(WorkerStatus::Error);
        }
    }
}

/// SIGTERM, then SIGKILL if the child outlives the grace period.
async fn terminate(worker_id: &str, child: &mut Child) {
    send_sigterm(worker_id, child);
    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        tracing::warn!(worker_id = %worker_id, "Worker ignored SIGTERM, killing");
        if let Err(e) = child.kill().await {
            tracing::warn!(worker_id = %worker_id, error = %e, "Failed to kill worker");
        }
    }
}

#[cfg(unix)]
fn send_sigterm(worker_id: &str, child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // id() is None once the child has been reaped
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!(worker_id = %worker_id, error = %e, "SIGTERM failed");
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(worker_id: &str, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(worker_id = %worker_id, error = %e, "Kill failed");
    }
}
