//! Capabilities the supervisor needs from the host platform.
use std::fmt;

use nix::sys::signal::Signal;
use tokio::sync::mpsc::UnboundedReceiver;

use super::Result;

/// Identifies a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerHandle {
    /// Opaque worker identifier.
    pub id: String,
    /// Operating system process id.
    pub pid: u32,
}

impl fmt::Display for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {})", self.id, self.pid)
    }
}

/// Notification that a worker process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    /// The worker that exited.
    pub worker: WorkerHandle,
    /// Exit code when the worker exited normally.
    pub code: Option<i32>,
    /// Signal number when the worker was killed by a signal.
    pub signal: Option<i32>,
}

impl WorkerExit {
    pub(crate) fn code_name(&self) -> String {
        self.code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    pub(crate) fn signal_name(&self) -> String {
        match self.signal {
            Some(signal) => Signal::try_from(signal)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|_| signal.to_string()),
            None => "none".to_string(),
        }
    }
}

/// Signals that start a graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// `SIGINT`.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Events delivered by the host to the primary process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A worker process terminated for any reason.
    Exited(WorkerExit),
    /// The primary process received a shutdown signal.
    Signal(ShutdownSignal),
}

/// Process management facility used by the supervisor.
///
/// The supervisor never keeps worker handles itself, the host
/// registry is the source of truth for the live workers.
pub trait ProcessHost: Send + Sync + 'static {
    /// Whether this is the primary process.
    fn is_primary(&self) -> bool;

    /// Number of processing units available, at least one.
    fn available_parallelism(&self) -> usize;

    /// Start a new worker process.
    fn fork(&self) -> Result<WorkerHandle>;

    /// Workers that are currently alive.
    fn workers(&self) -> Vec<WorkerHandle>;

    /// Ask a worker to terminate.
    ///
    /// A worker that has already exited is not an error.
    fn terminate(&self, worker: &WorkerHandle) -> Result<()>;

    /// Subscribe to worker exit and shutdown signal notifications.
    fn subscribe(&self) -> Result<UnboundedReceiver<HostEvent>>;

    /// Terminate the current process with the given status.
    fn exit(&self, code: i32);
}
