#![allow(dead_code)]
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clustervisor_impl::{
    Error, HostEvent, ProcessHost, Result, ShutdownSignal, Supervisor, SupervisorBuilder,
    WorkerCount, WorkerExit, WorkerHandle, WorkersOverrides,
};
use log::Level;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Default)]
struct State {
    forks: usize,
    live: Vec<WorkerHandle>,
    terminated: Vec<WorkerHandle>,
    exits: Vec<i32>,
    events: Option<UnboundedSender<HostEvent>>,
}

/// In-memory process host.
#[derive(Clone)]
pub struct MockHost {
    primary: bool,
    cpus: usize,
    /// Workers exit as soon as they are asked to terminate.
    obedient: bool,
    /// Forking fails once this many workers were forked.
    fork_limit: Option<usize>,
    state: Arc<Mutex<State>>,
}

impl MockHost {
    pub fn primary(cpus: usize) -> Self {
        Self {
            primary: true,
            cpus,
            obedient: false,
            fork_limit: None,
            state: Default::default(),
        }
    }

    pub fn worker() -> Self {
        Self {
            primary: false,
            ..Self::primary(1)
        }
    }

    pub fn obedient(mut self) -> Self {
        self.obedient = true;
        self
    }

    pub fn fails_after(mut self, forks: usize) -> Self {
        self.fork_limit = Some(forks);
        self
    }

    pub fn forks(&self) -> usize {
        self.state.lock().unwrap().forks
    }

    pub fn live(&self) -> Vec<WorkerHandle> {
        self.state.lock().unwrap().live.clone()
    }

    pub fn terminated(&self) -> Vec<WorkerHandle> {
        self.state.lock().unwrap().terminated.clone()
    }

    pub fn exits(&self) -> Vec<i32> {
        self.state.lock().unwrap().exits.clone()
    }

    pub fn signal(&self, signal: ShutdownSignal) {
        self.send(HostEvent::Signal(signal));
    }

    /// Remove a live worker and report that it exited.
    pub fn kill(&self, worker: &WorkerHandle, code: Option<i32>, signal: Option<i32>) {
        self.state.lock().unwrap().live.retain(|w| w != worker);
        self.send(HostEvent::Exited(WorkerExit {
            worker: worker.clone(),
            code,
            signal,
        }));
    }

    fn send(&self, event: HostEvent) {
        let state = self.state.lock().unwrap();
        state
            .events
            .as_ref()
            .expect("host has no subscriber")
            .send(event)
            .unwrap();
    }
}

impl ProcessHost for MockHost {
    fn is_primary(&self) -> bool {
        self.primary
    }

    fn available_parallelism(&self) -> usize {
        self.cpus
    }

    fn fork(&self) -> Result<WorkerHandle> {
        let mut state = self.state.lock().unwrap();
        if Some(state.forks) == self.fork_limit {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "fork failed")));
        }
        state.forks += 1;
        let worker = WorkerHandle {
            id: format!("w{}", state.forks),
            pid: 1000 + state.forks as u32,
        };
        state.live.push(worker.clone());
        Ok(worker)
    }

    fn workers(&self) -> Vec<WorkerHandle> {
        self.live()
    }

    fn terminate(&self, worker: &WorkerHandle) -> Result<()> {
        self.state.lock().unwrap().terminated.push(worker.clone());
        if self.obedient {
            self.kill(worker, None, Some(15));
        }
        Ok(())
    }

    fn subscribe(&self) -> Result<UnboundedReceiver<HostEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().events = Some(tx);
        Ok(rx)
    }

    fn exit(&self, code: i32) {
        self.state.lock().unwrap().exits.push(code);
    }
}

pub type Line = (Level, String, Option<String>);

/// Log sink that records every line.
#[derive(Clone, Default)]
pub struct Lines(Arc<Mutex<Vec<Line>>>);

impl Lines {
    pub fn all(&self) -> Vec<Line> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, level: Level, message: &str) -> usize {
        self.all()
            .iter()
            .filter(|(l, m, _)| *l == level && m == message)
            .count()
    }

    pub fn sink(&self) -> impl Fn(Level, &str, Option<&str>) + Send + Sync + 'static {
        let lines = Arc::clone(&self.0);
        move |level: Level, message: &str, detail: Option<&str>| {
            lines.lock().unwrap().push((
                level,
                message.to_string(),
                detail.map(str::to_string),
            ))
        }
    }
}

/// Supervisor with a no-op application.
pub fn supervisor(host: &MockHost, lines: &Lines, workers: WorkersOverrides) -> Supervisor<MockHost> {
    SupervisorBuilder::new(|| async { Ok::<(), std::io::Error>(()) })
        .log(lines.sink())
        .workers(workers)
        .host(host.clone())
        .build()
}

pub fn count(count: WorkerCount) -> WorkersOverrides {
    WorkersOverrides {
        count: Some(count),
        ..Default::default()
    }
}

/// Let spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    settle().await;
}
