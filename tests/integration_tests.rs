use std::path::PathBuf;
use std::time::Duration;

use tan_waits::analyzers::aggregate::aggregate;
use tan_waits::analyzers::analyzer::load_rows;
use tan_waits::analyzers::delays::detect_delays;
use tan_waits::analyzers::severity::Severity;
use tan_waits::analyzers::types::{GroupKey, StatField};
use tan_waits::infra::ReplayBroker;
use tan_waits::output::append_rows;
use tan_waits::sampler::sample;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/arrivals.jsonl")
}

#[tokio::test]
async fn test_full_pipeline() {
    let broker = ReplayBroker::new(fixture());
    let rows = sample(&broker, "tan/arrivals", 100, Duration::from_secs(5))
        .await
        .expect("Failed to sample fixture");

    // The undecodable line is skipped, the empty stop adds nothing
    assert_eq!(rows.len(), 6);
    assert_eq!(rows.iter().filter(|r| r.wait_minutes.is_none()).count(), 1);

    let by_line = aggregate(&rows, &[GroupKey::Line], StatField::WaitMinutes).unwrap();
    assert_eq!(by_line.len(), 2);
    assert_eq!(by_line[0].label(), "C5");
    assert_eq!(by_line[0].count, 3);
    assert_eq!(by_line[0].min, 4.0);
    assert_eq!(by_line[0].max, 22.0);
    assert_eq!(by_line[1].label(), "1");
    assert_eq!(by_line[1].mean, 4.0);

    let delays = detect_delays(&rows, 10.0, 1.5);
    assert_eq!(delays.len(), 1);
    assert_eq!(delays[0].label(), "C5 / HBLI2");
    let summary = delays[0].delay.as_ref().unwrap();
    assert_eq!(summary.delayed_count, 2);
    assert_eq!(summary.mean_delay, 10.0);
    assert_eq!(summary.severity, Severity::Moderate);
}

#[tokio::test]
async fn test_max_messages_counts_bad_payloads() {
    let broker = ReplayBroker::new(fixture());
    let rows = sample(&broker, "tan/arrivals", 2, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.stop_code == "COMM1"));
}

#[tokio::test]
async fn test_exported_rows_reload() {
    let broker = ReplayBroker::new(fixture());
    let rows = sample(&broker, "tan/arrivals", 100, Duration::from_secs(5))
        .await
        .unwrap();

    let path = std::env::temp_dir().join("tan_waits_integration_rows.csv");
    let _ = std::fs::remove_file(&path);
    append_rows(&path, &rows).unwrap();

    let reloaded = load_rows(&path).unwrap();
    assert_eq!(reloaded, rows);

    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn test_missing_capture_is_unavailable() {
    let broker = ReplayBroker::new("/nonexistent/capture.jsonl");
    let err = sample(&broker, "tan/arrivals", 10, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(err.is_unavailable());
}
