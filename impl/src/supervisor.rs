//! Supervisor forks the worker pool and keeps it running.
use std::{future::Future, pin::Pin, sync::Arc};

use futures::{
    future::{self, FutureExt, TryFutureExt},
    stream::{FuturesUnordered, StreamExt},
};
use log::{debug, info, warn, Level};
use tokio::time::{self, Sleep};

use super::{
    config::{WorkersConfig, WorkersOverrides},
    fault,
    host::{HostEvent, ProcessHost, WorkerExit},
    os::OsHost,
    sink::{LogCrateSink, LogSink},
    worker::{self, App},
    BoxError, Error, Result,
};

/// Build a supervisor.
pub struct SupervisorBuilder<H = OsHost> {
    app: App,
    sink: Arc<dyn LogSink>,
    workers: WorkersOverrides,
    host: H,
}

impl SupervisorBuilder<OsHost> {
    /// Create a new supervisor builder for an application entry point.
    ///
    /// The entry point only runs in worker processes.
    pub fn new<F, Fut, E>(app: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let app: App = Box::new(move || app().map_err(Into::<BoxError>::into).boxed());
        Self {
            app,
            sink: Arc::new(LogCrateSink),
            workers: WorkersOverrides::default(),
            host: OsHost::new(),
        }
    }
}

impl<H: ProcessHost> SupervisorBuilder<H> {
    /// Set the log sink, defaults to the `log` facade.
    pub fn log<S: LogSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Override worker pool settings.
    ///
    /// Fields that are not set keep their default value.
    pub fn workers(mut self, overrides: WorkersOverrides) -> Self {
        self.workers = overrides;
        self
    }

    /// Use a different process host.
    pub fn host<T: ProcessHost>(self, host: T) -> SupervisorBuilder<T> {
        SupervisorBuilder {
            app: self.app,
            sink: self.sink,
            workers: self.workers,
            host,
        }
    }

    /// Return the supervisor.
    pub fn build(self) -> Supervisor<H> {
        Supervisor {
            app: self.app,
            sink: self.sink,
            host: Arc::new(self.host),
            config: WorkersConfig::default().merge(self.workers),
            shutting_down: false,
        }
    }
}

/// Supervisor runs the primary or the worker role of a process.
pub struct Supervisor<H: ProcessHost = OsHost> {
    app: App,
    sink: Arc<dyn LogSink>,
    host: Arc<H>,
    config: WorkersConfig,
    /// Set once when a shutdown signal arrives, dead
    /// workers are no longer replaced from then on.
    shutting_down: bool,
}

enum Step {
    Event(Option<HostEvent>),
    Restart,
    Expired,
}

impl<H: ProcessHost> Supervisor<H> {
    /// Resolved worker pool settings.
    pub fn config(&self) -> &WorkersConfig {
        &self.config
    }

    /// Install the panic hook and run the role of this process.
    pub async fn run(self) -> Result<()> {
        fault::install(
            Arc::clone(&self.sink),
            Arc::clone(&self.host),
            self.config.restart_on_fault,
        );
        if self.host.is_primary() {
            self.run_primary().await
        } else {
            self.run_worker().await
        }
    }

    /// Run the application entry point.
    pub async fn run_worker(self) -> Result<()> {
        let Supervisor {
            app, sink, host, ..
        } = self;
        worker::run(app, &*sink, &*host).await
    }

    /// Fork the workers and supervise them until shutdown.
    ///
    /// Returns once every worker has exited after a shutdown
    /// signal, or after the process was forcibly exited.
    pub async fn run_primary(mut self) -> Result<()> {
        // Subscribe first so exits of workers that die
        // straight away are not missed.
        let mut events = self.host.subscribe()?;

        let count = self.config.count.resolve(self.host.available_parallelism());
        info!("Run {} worker(s)", count);
        for _ in 0..count {
            if let Err(e) = self.host.fork() {
                self.sink.log(
                    Level::Error,
                    &format!("Failed to start worker: {}", e),
                    None,
                );
                self.terminate_all();
                return Err(e);
            }
        }

        let mut restarts = FuturesUnordered::new();
        let mut grace: Option<Pin<Box<Sleep>>> = None;

        loop {
            let step = tokio::select! {
                event = events.recv() => Step::Event(event),
                Some(()) = restarts.next(), if !restarts.is_empty() => Step::Restart,
                _ = expired(&mut grace) => Step::Expired,
            };

            match step {
                Step::Event(Some(HostEvent::Exited(exit))) => {
                    if self.exited(&exit) {
                        debug!(
                            "Restarting worker {} in {:?}",
                            exit.worker, self.config.restart_delay
                        );
                        restarts.push(time::sleep(self.config.restart_delay));
                    }
                }
                Step::Event(Some(HostEvent::Signal(signal))) => {
                    debug!("Received {}", signal);
                    self.shutdown();
                    if grace.is_none() {
                        grace = Some(Box::pin(time::sleep(self.config.shutdown_grace)));
                    }
                }
                Step::Event(None) => return Err(Error::HostClosed),
                Step::Restart => self.restart(),
                Step::Expired => {
                    self.sink.log(Level::Warn, "Forced shutdown", None);
                    self.host.exit(1);
                    return Ok(());
                }
            }

            if self.shutting_down && restarts.is_empty() && self.host.workers().is_empty() {
                // Workers leave the registry before their exit is
                // delivered, report the exits still queued.
                while let Ok(event) = events.try_recv() {
                    match event {
                        HostEvent::Exited(exit) => {
                            self.exited(&exit);
                        }
                        HostEvent::Signal(signal) => debug!("Received {}", signal),
                    }
                }
                self.sink.log(Level::Info, "All workers exited", None);
                return Ok(());
            }
        }
    }

    /// Log an uncaught fault and exit when restart on fault is enabled.
    ///
    /// Reports exactly like the installed panic hook does.
    pub fn report_uncaught(&self, message: &str, detail: &str) {
        fault::report(
            &*self.sink,
            &*self.host,
            self.config.restart_on_fault,
            message,
            detail,
        );
    }

    /// Record a worker exit, returns whether it should be replaced.
    fn exited(&self, exit: &WorkerExit) -> bool {
        self.sink.log(
            Level::Info,
            &format!(
                "Worker {} died with code {} and signal {}",
                exit.worker,
                exit.code_name(),
                exit.signal_name()
            ),
            None,
        );
        !self.shutting_down
    }

    fn restart(&self) {
        match self.host.fork() {
            Ok(worker) => debug!("Restarted worker {}", worker),
            Err(e) => self.sink.log(
                Level::Error,
                &format!("Failed to restart worker: {}", e),
                None,
            ),
        }
    }

    /// Stop replacing workers and ask the live ones to terminate.
    ///
    /// Running this again re-sends the terminate request.
    fn shutdown(&mut self) {
        self.shutting_down = true;
        self.sink.log(Level::Info, "Shutting down...", None);
        self.terminate_all();
    }

    fn terminate_all(&self) {
        for worker in self.host.workers() {
            if let Err(e) = self.host.terminate(&worker) {
                warn!("Failed to terminate worker {}: {}", worker, e);
            }
        }
    }
}

/// Completes when the grace window is armed and has elapsed.
async fn expired(grace: &mut Option<Pin<Box<Sleep>>>) {
    match grace {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}
