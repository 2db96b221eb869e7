mod common;

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use clustervisor_impl::{Error, SupervisorBuilder, WorkersOverrides};
use common::{Lines, MockHost};
use log::Level;

#[tokio::test]
async fn application_error_exits_with_failure() {
    let host = MockHost::worker();
    let lines = Lines::default();
    let supervisor = SupervisorBuilder::new(|| async {
        Err::<(), _>(io::Error::new(io::ErrorKind::AddrInUse, "port 8080 in use"))
    })
    .log(lines.sink())
    .host(host.clone())
    .build();

    let result = supervisor.run_worker().await;
    assert!(matches!(result, Err(Error::Application(_))));
    assert_eq!(host.exits(), vec![1]);

    let lines = lines.all();
    assert_eq!(lines.len(), 1);
    let (level, message, detail) = &lines[0];
    assert_eq!(*level, Level::Error);
    assert_eq!(message, "Application error: port 8080 in use");
    assert!(detail.as_deref().unwrap().contains("AddrInUse"));
}

#[tokio::test]
async fn completed_application_does_not_exit() {
    let host = MockHost::worker();
    let lines = Lines::default();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let supervisor = SupervisorBuilder::new(move || async move {
        flag.store(true, Ordering::SeqCst);
        Ok::<(), io::Error>(())
    })
    .log(lines.sink())
    .host(host.clone())
    .build();

    supervisor.run_worker().await.unwrap();
    assert!(ran.load(Ordering::SeqCst));
    assert!(host.exits().is_empty());
    assert!(lines.all().is_empty());
}

#[tokio::test]
async fn worker_role_never_forks() {
    let host = MockHost::worker();
    let lines = Lines::default();
    let supervisor = SupervisorBuilder::new(|| async { Ok::<(), io::Error>(()) })
        .log(lines.sink())
        .workers(WorkersOverrides {
            restart_on_fault: Some(false),
            ..Default::default()
        })
        .host(host.clone())
        .build();

    supervisor.run().await.unwrap();
    assert_eq!(host.forks(), 0);
    assert!(host.exits().is_empty());
}
