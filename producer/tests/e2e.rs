//! End-to-end tests: real producer processes under a real multiplexer

use std::time::Duration;

use shared::WorkerId;
use streammux::{StreamMux, WorkerState};

mod common;
use common::{pid_exists, wait_for, worker_health, TestFixtures};

fn start(sources: &[(u32, &str)]) -> StreamMux {
    let mut mux = StreamMux::from_config(TestFixtures::config(sources), "warn").unwrap();
    mux.start();
    mux
}

/// Frames from two producers arrive with their own geometry
#[tokio::test]
async fn test_frames_flow_from_real_workers() {
    let mux = start(&[(0, "test://16x8?fps=100"), (1, "test://8x8?fps=100")]);

    let mut batch = None;
    let arrived = wait_for(TestFixtures::DEADLINE, || {
        batch = mux.pull_batch(2);
        batch.is_some()
    })
    .await;
    assert!(arrived, "no batch: {:?}", mux.health());

    let mut batch = batch.unwrap();
    batch.sort_by_key(|f| f.worker);
    assert_eq!((batch[0].width, batch[0].height, batch[0].data.len()), (16, 8, 16 * 8 * 3));
    assert_eq!((batch[1].width, batch[1].height, batch[1].data.len()), (8, 8, 8 * 8 * 3));
    for frame in &batch {
        mux.release(frame.worker).unwrap();
    }

    let pids: Vec<i32> = mux.health().iter().filter_map(|h| h.pid).collect();
    assert_eq!(pids.len(), 2);
    assert!(mux.health().iter().all(|h| h.state == WorkerState::Alive && h.negotiated));

    mux.shutdown().await;
    for pid in pids {
        assert!(!pid_exists(pid), "pid {pid} survived shutdown");
    }
}

/// A producer that negotiates but never publishes is replaced by a new process
#[tokio::test]
async fn test_silent_worker_gets_new_process() {
    let mux = start(&[(3, "test://8x8?publish=false")]);

    assert!(wait_for(TestFixtures::DEADLINE, || worker_health(&mux, 3).negotiated).await);
    let first = worker_health(&mux, 3);
    assert_eq!(first.generation, 1);

    let replaced = wait_for(TestFixtures::DEADLINE, || {
        let now = worker_health(&mux, 3);
        now.generation >= 2 && now.pid.is_some() && now.pid != first.pid
    })
    .await;
    assert!(replaced, "still {:?}", worker_health(&mux, 3));
    assert!(mux.pull_one().is_none());

    mux.shutdown().await;
}

/// A crash without any report is caught by the watchdog and frames resume
#[tokio::test]
async fn test_crashing_worker_is_respawned() {
    let mux = start(&[(0, "test://8x8?fps=100&crash_after=5")]);

    assert!(wait_for(TestFixtures::DEADLINE, || worker_health(&mux, 0).restarts >= 1).await);

    let resumed = wait_for(TestFixtures::DEADLINE, || match mux.pull_one() {
        Some(frame) => {
            mux.release(frame.worker).unwrap();
            worker_health(&mux, 0).generation >= 2
        }
        None => false,
    })
    .await;
    assert!(resumed, "no frame after restart: {:?}", worker_health(&mux, 0));

    mux.shutdown().await;
}

/// A clean, reported exit is respawned without waiting for staleness
#[tokio::test]
async fn test_clean_exit_is_respawned() {
    let mux = start(&[(0, "test://8x8?fps=100&frames=3")]);

    let restarted = wait_for(TestFixtures::STALENESS, || worker_health(&mux, 0).restarts >= 1).await;
    assert!(restarted, "{:?}", worker_health(&mux, 0));

    mux.shutdown().await;
}

/// Sources the producer cannot decode exit at once and are retried
#[tokio::test]
async fn test_unsupported_source_is_retried() {
    let mux = start(&[(0, "rtsp://192.0.2.1/live")]);

    assert!(wait_for(TestFixtures::DEADLINE, || worker_health(&mux, 0).restarts >= 2).await);
    let health = worker_health(&mux, 0);
    assert!(!health.negotiated);
    assert_eq!(health.frames_received, 0);
    assert!(mux.snapshot(WorkerId(0)).is_none());

    mux.shutdown().await;
}
