//! Listener admission tests: capacity, slot release, drain on finish.

use std::time::Duration;

use triadstream::channel::Connection;
use triadstream::listener::{Admission, Listener, ListenerConfig, Worker, WorkerFactory};

/// Waits for one string and answers with its length.
struct Measure;

impl Worker for Measure {
    type Request = String;
    type Response = usize;

    async fn serve(self, mut conn: Connection<usize, String>) {
        if let Ok(s) = conn.recv().await {
            let _ = conn.send(s.len());
        }
    }
}

struct MeasureFactory;

impl WorkerFactory for MeasureFactory {
    type Worker = Measure;

    fn new_worker(&mut self) -> Measure {
        Measure
    }
}

async fn wait_for_idle<Req, Resp>(handle: &triadstream::ListenerHandle<Req, Resp>) {
    for _ in 0..1000 {
        if handle.active_workers() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("workers never released their slots");
}

#[tokio::test]
async fn second_connection_rejected_while_first_active() {
    let (handle, _task) =
        Listener::spawn(MeasureFactory, ListenerConfig::new("measure", 1));

    let Admission::Accepted(mut first) = handle.connect().await.unwrap() else {
        panic!("first connection must be admitted");
    };
    assert_eq!(handle.active_workers(), 1);

    // The first worker is still waiting for its request.
    assert!(matches!(
        handle.connect().await.unwrap(),
        Admission::CapacityExceeded
    ));

    assert_eq!(first.request("abcd".to_string()).await.unwrap(), 4);
}

#[tokio::test]
async fn finished_worker_releases_slot() {
    let (handle, _task) =
        Listener::spawn(MeasureFactory, ListenerConfig::new("measure", 1));

    let Admission::Accepted(mut first) = handle.connect().await.unwrap() else {
        panic!("first connection must be admitted");
    };
    first.request("x".to_string()).await.unwrap();
    wait_for_idle(&handle).await;

    let Admission::Accepted(mut second) = handle.connect().await.unwrap() else {
        panic!("slot should have been released");
    };
    assert_eq!(second.request("xyz".to_string()).await.unwrap(), 3);
}

#[tokio::test]
async fn parked_workers_keep_their_slot() {
    let config = ListenerConfig {
        start_workers: false,
        ..ListenerConfig::new("parked", 2)
    };
    let (handle, _task) = Listener::spawn(MeasureFactory, config);

    let Admission::Accepted(_a) = handle.connect().await.unwrap() else {
        panic!("expected admission");
    };
    let Admission::Accepted(b) = handle.connect().await.unwrap() else {
        panic!("expected admission");
    };
    assert_eq!(handle.active_workers(), 2);

    // Nothing runs behind a parked worker, so its slot is never freed.
    b.send("ignored".to_string()).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(handle.active_workers(), 2);
    assert!(matches!(
        handle.connect().await.unwrap(),
        Admission::CapacityExceeded
    ));
}

#[tokio::test]
async fn finish_waits_for_in_flight_workers() {
    let (handle, mut task) =
        Listener::spawn(MeasureFactory, ListenerConfig::new("measure", 4));

    let Admission::Accepted(mut conn) = handle.connect().await.unwrap() else {
        panic!("expected admission");
    };
    handle.finish().unwrap();

    // The worker still waits for its request, so the listener cannot stop.
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut task)
        .await
        .is_err());

    assert_eq!(conn.request("done".to_string()).await.unwrap(), 4);
    task.await.unwrap();
    assert_eq!(handle.active_workers(), 0);
    assert!(handle.connect().await.is_err());
}

#[tokio::test]
async fn dropped_caller_ends_worker() {
    let (handle, _task) =
        Listener::spawn(MeasureFactory, ListenerConfig::new("measure", 1));

    let Admission::Accepted(conn) = handle.connect().await.unwrap() else {
        panic!("expected admission");
    };
    drop(conn);
    wait_for_idle(&handle).await;
}

#[tokio::test]
async fn connect_after_finish_fails_without_waiting_for_drain() {
    let (handle, mut task) =
        Listener::spawn(MeasureFactory, ListenerConfig::new("measure", 4));

    // Keep one worker in flight so the drain cannot complete.
    let Admission::Accepted(mut conn) = handle.connect().await.unwrap() else {
        panic!("expected admission");
    };
    handle.finish().unwrap();

    let refused = tokio::time::timeout(Duration::from_millis(100), handle.connect())
        .await
        .expect("connect must not wait for in-flight workers");
    assert!(matches!(
        refused,
        Err(triadstream::TriadStreamError::ListenerClosed)
    ));
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut task)
        .await
        .is_err());

    assert_eq!(conn.request("late".to_string()).await.unwrap(), 4);
    task.await.unwrap();
}
