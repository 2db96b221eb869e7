use std::time::Duration;

use clustervisor_impl::{worker_id, Result, SupervisorBuilder, WorkerCount, WorkersOverrides};
use log::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").ok().is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let supervisor = SupervisorBuilder::new(|| async {
        let id = worker_id().unwrap_or_default();
        // Simulate a worker that fails after a while so
        // the primary has to replace it
        for tick in 0..5 {
            info!("Worker {} tick {}", id, tick);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err::<(), _>(format!("worker {} gave up", id))
    })
    .workers(WorkersOverrides {
        count: Some(WorkerCount::Fixed(2)),
        restart_delay: Some(Duration::from_millis(500)),
        shutdown_grace: Some(Duration::from_secs(5)),
        ..Default::default()
    })
    .build();

    // Press Ctrl-C to shut the pool down
    supervisor.run().await
}
