//! Integration tests for probing, bulk checks and monitoring

mod common;

use std::time::{Duration, Instant};

use ::common::liveness::{
    Monitor, ProbeError, ProbeKind, ProbeOptions, Response, ServerStatus,
};
use ::common::testkit::TestFleet;

#[tokio::test]
async fn test_ping_status_and_challenge() {
    common::init_tracing();
    let fleet = TestFleet::from_topology(&common::sample_topology())
        .await
        .unwrap();
    let prober = fleet.prober();
    let target = fleet.server("api/server1").unwrap().public_key();

    let pong = prober
        .check_aliveness(&target, &ProbeOptions::new(ProbeKind::Ping))
        .await
        .unwrap();
    assert!(pong.alive);
    assert_eq!(pong.verified, None);
    assert!(matches!(pong.response, Response::Pong { ref server, .. } if server == "server1"));

    let status = prober
        .check_aliveness(&target, &ProbeOptions::new(ProbeKind::Status))
        .await
        .unwrap();
    assert!(matches!(status.response, Response::StatusReport { ref category, .. } if category == "api"));

    let challenge = prober
        .check_aliveness(&target, &ProbeOptions::new(ProbeKind::Challenge))
        .await
        .unwrap();
    assert_eq!(challenge.verified, Some(true));
    assert_eq!(challenge.response.public_key(), Some(target));
    // the challenge was consumed by verification
    assert!(prober.authenticator().is_empty());

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_is_transport_error() {
    let mut fleet = TestFleet::from_paths(&["cache/redis1"]).await.unwrap();
    let target = fleet.server("cache/redis1").unwrap().public_key();
    fleet.kill("cache/redis1").await.unwrap();

    let prober = fleet.prober();
    let result = prober
        .check_aliveness(&target, &ProbeOptions::new(ProbeKind::Challenge))
        .await;
    assert!(matches!(result, Err(ProbeError::Transport(_))));
    // failed challenge probes leave nothing behind
    assert!(prober.authenticator().is_empty());
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let mut fleet = TestFleet::new();
    fleet
        .add_silent_server(&common::path("db/primary"))
        .await
        .unwrap();
    let target = fleet.server("db/primary").unwrap().public_key();

    let options = ProbeOptions::new(ProbeKind::Ping).with_timeout(Duration::from_millis(100));
    let result = fleet.prober().check_aliveness(&target, &options).await;
    assert!(matches!(result, Err(ProbeError::Timeout(_))));

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_challenge_probes_leave_no_pending_entries() {
    let mut fleet = TestFleet::new();
    fleet
        .add_silent_server(&common::path("db/primary"))
        .await
        .unwrap();
    let target = fleet.server("db/primary").unwrap().public_key();
    let prober = fleet.prober();

    // the probe's own timeout is far longer than the caller is willing to wait
    let options = ProbeOptions::new(ProbeKind::Challenge).with_timeout(Duration::from_secs(30));
    for _ in 0..10 {
        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            prober.check_aliveness(&target, &options),
        )
        .await;
        assert!(cancelled.is_err());
    }
    assert!(prober.authenticator().is_empty());

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bulk_check_isolates_dead_server() {
    let mut fleet = TestFleet::from_paths(&["api/server1", "api/server2", "api/server3"])
        .await
        .unwrap();
    fleet.kill("api/server2").await.unwrap();

    let targets = fleet.targets();
    let results = fleet
        .prober()
        .bulk_check(&targets, &ProbeOptions::default())
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].success());
    assert!(!results[1].success());
    assert!(results[2].success());
    for (result, target) in results.iter().zip(&targets) {
        assert_eq!(&result.target, target);
    }

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bulk_check_hanging_server_does_not_delay_others() {
    let mut fleet = TestFleet::from_paths(&["api/server1", "api/server3"]).await.unwrap();
    fleet
        .add_silent_server(&common::path("api/server2"))
        .await
        .unwrap();

    let timeout = Duration::from_millis(300);
    let options = ProbeOptions::new(ProbeKind::Status).with_timeout(timeout);
    let started = Instant::now();
    let results = fleet.prober().bulk_check(&fleet.targets(), &options).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 3);
    assert!(matches!(results[1].outcome, Err(ProbeError::Timeout(_))));
    for i in [0, 2] {
        let report = results[i].outcome.as_ref().unwrap();
        assert!(report.latency < timeout);
    }
    // the probes ran side by side, not one after another
    assert!(elapsed < timeout * 2);

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bounded_bulk_check_keeps_order() {
    let paths = ["db/a", "db/b", "db/c", "db/d", "db/e"];
    let mut fleet = TestFleet::from_paths(&paths).await.unwrap();
    fleet.kill("db/d").await.unwrap();

    let options = ProbeOptions::new(ProbeKind::Ping).with_max_concurrency(2);
    let results = fleet.prober().bulk_check(&fleet.targets(), &options).await;

    let labels: Vec<_> = results.iter().map(|r| r.target.label.as_str()).collect();
    assert_eq!(labels, paths);
    let ok: Vec<_> = results.iter().map(|r| r.success()).collect();
    assert_eq!(ok, vec![true, true, true, false, true]);

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_bulk_check() {
    let fleet = TestFleet::new();
    let results = fleet.prober().bulk_check(&[], &ProbeOptions::default()).await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_monitor_tracks_failures() {
    common::init_tracing();
    let mut fleet = TestFleet::from_paths(&["api/server1", "api/server2"])
        .await
        .unwrap();
    let flaky = fleet.server("api/server2").unwrap().public_key();
    let options = ProbeOptions::default().with_timeout(Duration::from_millis(500));
    let monitor = Monitor::new(fleet.prober(), fleet.targets(), options);

    let handle = monitor.start(Duration::from_secs(3600)).await;
    let records = handle.records();
    assert!(records
        .iter()
        .all(|(_, record)| record.status == ServerStatus::Online));
    assert!(records.iter().all(|(_, record)| record.last_check.is_some()));

    fleet.kill("api/server2").await.unwrap();
    handle.check_now().await;
    handle.check_now().await;
    let record = handle.record(&flaky).unwrap();
    assert_eq!(record.status, ServerStatus::Offline);
    assert_eq!(record.consecutive_failures, 2);
    assert!(record.last_error.is_some());

    fleet.revive("api/server2").await.unwrap();
    handle.check_now().await;
    let record = handle.record(&flaky).unwrap();
    assert_eq!(record.status, ServerStatus::Online);
    assert_eq!(record.consecutive_failures, 0);

    handle.stop().await;
    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_monitor_skips_overlapping_sweeps() {
    let mut fleet = TestFleet::new();
    fleet
        .add_silent_server(&common::path("db/primary"))
        .await
        .unwrap();
    let options = ProbeOptions::default().with_timeout(Duration::from_millis(300));
    let monitor = Monitor::new(fleet.prober(), fleet.targets(), options);

    let sweeping = monitor.clone();
    let in_flight = tokio::spawn(async move { sweeping.sweep().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // a tick landing on the in-flight sweep is dropped
    assert!(!monitor.try_sweep().await);
    in_flight.await.unwrap();
    assert_eq!(monitor.records()[0].1.consecutive_failures, 1);

    assert!(monitor.try_sweep().await);
    assert_eq!(monitor.records()[0].1.consecutive_failures, 2);

    fleet.shutdown().await.unwrap();
}
