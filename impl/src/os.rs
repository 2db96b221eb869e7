//! Host implementation backed by operating system processes.
use std::{
    collections::hash_map::DefaultHasher,
    env,
    hash::Hasher,
    num::NonZeroUsize,
    os::unix::process::ExitStatusExt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{debug, error, info, warn};
use nix::{
    errno::Errno,
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use once_cell::sync::OnceCell;
use rand::Rng;
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::host::{HostEvent, ProcessHost, ShutdownSignal, WorkerExit, WorkerHandle};
use super::{Error, Result, WORKER_ID};

/// Workers forked by this process.
struct Registry {
    workers: Vec<WorkerHandle>,
    events: Option<UnboundedSender<HostEvent>>,
}

impl Registry {
    fn remove(&mut self, pid: u32) -> Option<WorkerHandle> {
        let position = self.workers.iter().position(|w| w.pid == pid)?;
        Some(self.workers.swap_remove(position))
    }

    fn publish(&self, event: HostEvent) {
        if let Some(ref events) = self.events {
            if events.send(event).is_err() {
                debug!("Host event receiver dropped");
            }
        }
    }
}

fn registry() -> MutexGuard<'static, Registry> {
    static INSTANCE: OnceCell<Mutex<Registry>> = OnceCell::new();
    INSTANCE
        .get_or_init(|| {
            Mutex::new(Registry {
                workers: vec![],
                events: None,
            })
        })
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Identifier of the current worker process, `None` in the primary.
pub fn worker_id() -> Option<String> {
    env::var(WORKER_ID).ok()
}

/// Generate a unique id for each worker.
fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let mut hasher = DefaultHasher::new();
    hasher.write_usize(rng.gen());
    format!("{:x}", hasher.finish())
}

/// Process host that forks workers by re-executing the current program.
///
/// Workers receive the same command line arguments as the primary and
/// are told apart by the worker id environment variable.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsHost;

impl OsHost {
    /// Create an operating system host.
    pub fn new() -> Self {
        Self
    }
}

impl ProcessHost for OsHost {
    fn is_primary(&self) -> bool {
        worker_id().is_none()
    }

    fn available_parallelism(&self) -> usize {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }

    fn fork(&self) -> Result<WorkerHandle> {
        let id = generate_id();
        let program = env::current_exe()?;

        info!("Spawn worker {} {}", id, program.display());

        let mut child = Command::new(&program)
            .args(env::args_os().skip(1))
            .env(WORKER_ID, &id)
            .spawn()?;

        let pid = child.id().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "worker exited before it could be registered",
            ))
        })?;
        let worker = WorkerHandle { id, pid };
        registry().workers.push(worker.clone());

        tokio::spawn(async move {
            let (code, signal) = match child.wait().await {
                Ok(status) => (status.code(), status.signal()),
                Err(e) => {
                    warn!("Failed to wait on worker {}: {}", pid, e);
                    (None, None)
                }
            };

            let mut state = registry();
            match state.remove(pid) {
                Some(worker) => {
                    state.publish(HostEvent::Exited(WorkerExit {
                        worker,
                        code,
                        signal,
                    }));
                }
                None => error!("Failed to remove stale worker for pid {}", pid),
            }
        });

        Ok(worker)
    }

    fn workers(&self) -> Vec<WorkerHandle> {
        registry().workers.clone()
    }

    fn terminate(&self, worker: &WorkerHandle) -> Result<()> {
        let pid = i32::try_from(worker.pid).map_err(|_| Errno::ESRCH)?;
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(Error::Signal(e)),
        }
    }

    fn subscribe(&self) -> Result<UnboundedReceiver<HostEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        forward_signal(SignalKind::interrupt(), ShutdownSignal::Interrupt, tx.clone())?;
        forward_signal(SignalKind::terminate(), ShutdownSignal::Terminate, tx.clone())?;
        registry().events = Some(tx);
        Ok(rx)
    }

    fn exit(&self, code: i32) {
        std::process::exit(code)
    }
}

/// Deliver every occurrence of a signal as a host event.
fn forward_signal(
    kind: SignalKind,
    event: ShutdownSignal,
    tx: UnboundedSender<HostEvent>,
) -> Result<()> {
    let mut stream = signal(kind)?;
    tokio::spawn(async move {
        while stream.recv().await.is_some() {
            if tx.send(HostEvent::Signal(event)).is_err() {
                break;
            }
        }
    });
    Ok(())
}
