#![deny(missing_docs)]
//! Process supervisor that runs an application in a pool of forked worker processes.
//!
//! Currently only supports Unix.
//!
//! The same executable plays two roles. The primary process forks the
//! configured number of workers, restarts any worker that dies (after a
//! short delay) and on `SIGINT` or `SIGTERM` asks every worker to terminate,
//! forcing an exit if they have not gone away within the grace window.
//! Worker processes simply run the application entry point.
//!
//! A panic hook reports panics as uncaught and, unless restart on fault is
//! disabled, exits the process. The hook runs when the panic happens, so a
//! panic that is later caught by `std::panic::catch_unwind` or surfaces as a
//! tokio `JoinError` is still reported and still ends the process.
//!
//! ```no_run
//! use std::time::Duration;
//! use clustervisor_impl::{Result, SupervisorBuilder, WorkerCount, WorkersOverrides};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<()> {
//!     let supervisor = SupervisorBuilder::new(|| async {
//!             // Serve requests here, this only runs in worker processes
//!             Ok::<(), std::io::Error>(())
//!         })
//!         .workers(WorkersOverrides {
//!             count: Some(WorkerCount::Auto),
//!             restart_delay: Some(Duration::from_millis(500)),
//!             ..Default::default()
//!         })
//!         .build();
//!     supervisor.run().await
//! }
//! ```

/// Boxed error produced by application code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Enumeration of errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Worker count is neither `auto` nor an integer.
    #[error("Invalid worker count {0:?}, expected \"auto\" or an integer")]
    InvalidCount(String),

    /// The host stopped delivering worker exit and signal events.
    #[error("Host event stream closed")]
    HostClosed,

    /// Input/output errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error whilst signalling a worker process.
    #[error(transparent)]
    Signal(#[from] nix::errno::Errno),

    /// The application entry point failed.
    #[error("Application error: {0}")]
    Application(BoxError),
}

/// Result type returned by the library.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) const WORKER_ID: &str = "CLUSTERVISOR_WORKER_ID";

mod config;
mod fault;
mod host;
mod os;
mod sink;
mod supervisor;
mod worker;

pub use config::{WorkerCount, WorkersConfig, WorkersOverrides};
pub use host::{HostEvent, ProcessHost, ShutdownSignal, WorkerExit, WorkerHandle};
pub use os::{worker_id, OsHost};
pub use sink::{LogCrateSink, LogSink};
pub use supervisor::{Supervisor, SupervisorBuilder};
