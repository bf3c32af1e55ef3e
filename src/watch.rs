//! The repeated sample → aggregate → render loop.

use chrono::Utc;
use std::future::Future;
use tracing::{info, warn};

use crate::analyzers::analyzer::analyze;
use crate::analyzers::types::WindowReport;
use crate::analyzers::window::RowWindow;
use crate::config::{DelayConfig, SampleConfig, WatchConfig};
use crate::sampler::sample_with;
use crate::services::Broker;

/// Runs `watch.iterations` passes (forever when 0), sleeping `watch.interval`
/// between them, and hands each report to `render`.
///
/// Each pass samples from scratch unless `watch.retain` is set. `shutdown` is
/// polled once before the first pass, so a signal listener behind it is armed
/// before any sampling starts. If it has completed by then, or completes
/// while sleeping between passes, the loop stops and returns `Ok`. A signal
/// during a pass is seen once that pass has rendered. Returns the number of
/// completed passes.
///
/// # Errors
///
/// Sampling failures (e.g. an unreachable broker) end the loop.
#[tracing::instrument(skip_all, fields(topic = %sampling.topic, iterations = watch.iterations))]
pub async fn run<B, F, S>(
    broker: &B,
    sampling: &SampleConfig,
    delays: &DelayConfig,
    watch: &WatchConfig,
    mut render: F,
    shutdown: S,
) -> anyhow::Result<usize>
where
    B: Broker + ?Sized,
    F: FnMut(usize, &WindowReport),
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut window = watch
        .retain
        .map(|age| RowWindow::new(chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX)));

    if watch.iterations == 0 {
        info!(interval_secs = watch.interval.as_secs(), "Watching until interrupted. Press Ctrl+C to stop.");
    }

    let interrupted = tokio::select! {
        biased;
        _ = &mut shutdown => true,
        _ = std::future::ready(()) => false,
    };
    if interrupted {
        warn!("Interrupted before the first pass");
        return Ok(0);
    }

    let mut completed = 0;
    loop {
        if watch.iterations > 0 && completed >= watch.iterations {
            break;
        }

        let rows = sample_with(broker, sampling).await?;

        let report = match window.as_mut() {
            Some(window) => {
                window.extend(rows);
                let dropped = window.prune(Utc::now());
                info!(retained = window.len(), dropped, "Sliding window updated");
                analyze(window.rows(), &watch.group_by, delays)?
            }
            None => analyze(&rows, &watch.group_by, delays)?,
        };

        completed += 1;
        render(completed, &report);

        let more = watch.iterations == 0 || completed < watch.iterations;
        if !more {
            break;
        }

        tokio::select! {
            _ = &mut shutdown => {
                warn!(completed, "Interrupted, stopping watch");
                break;
            }
            _ = tokio::time::sleep(watch.interval) => {}
        }
    }

    info!(completed, "Watch finished");
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::GroupKey;
    use crate::services::broker::testing::MemoryBroker;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const MESSAGE: &str = r#"{"timestamp": "2025-03-23T08:00:00", "stop_code": "COMM1", "stop_name": "Commerce",
        "arrivals": [
            {"sens": 1, "terminus": "Beaujoire", "temps": "18mn", "tempsReel": "true", "ligne": {"numLigne": "1"}},
            {"sens": 1, "terminus": "Beaujoire", "temps": "20mn", "tempsReel": "true", "ligne": {"numLigne": "1"}}
        ]}"#;

    fn sampling() -> SampleConfig {
        SampleConfig {
            topic: "tan/arrivals".to_string(),
            max_messages: 1,
            timeout: Duration::from_millis(50),
        }
    }

    fn watch(iterations: usize) -> WatchConfig {
        WatchConfig {
            iterations,
            interval: Duration::from_millis(10),
            group_by: vec![GroupKey::Line],
            retain: None,
        }
    }

    #[tokio::test]
    async fn test_runs_fixed_iterations_without_carrying_state() {
        let broker = MemoryBroker::with_payloads([MESSAGE]);
        let mut seen = Vec::new();

        let completed = run(
            &broker,
            &sampling(),
            &DelayConfig::default(),
            &watch(3),
            |i, report| seen.push((i, report.rows, report.delays.len())),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(completed, 3);
        assert_eq!(seen, vec![(1, 2, 1), (2, 2, 1), (3, 2, 1)]);
        assert_eq!(broker.opened(), 3);
        assert_eq!(broker.closed(), 3);
    }

    #[tokio::test]
    async fn test_interrupt_between_iterations_stops_cleanly() {
        let broker = MemoryBroker::with_payloads([MESSAGE]);
        let mut renders = 0;

        let completed = run(
            &broker,
            &sampling(),
            &DelayConfig::default(),
            &watch(5),
            |_, _| renders += 1,
            tokio::time::sleep(Duration::from_millis(5)),
        )
        .await
        .unwrap();

        assert_eq!(completed, 1);
        assert_eq!(renders, 1);
    }

    #[tokio::test]
    async fn test_shutdown_armed_before_first_pass() {
        let broker = MemoryBroker::with_payloads([MESSAGE]);
        let armed = AtomicBool::new(false);
        let mut armed_at_render = false;

        let completed = run(
            &broker,
            &sampling(),
            &DelayConfig::default(),
            &watch(1),
            |_, _| armed_at_render = armed.load(Ordering::SeqCst),
            async {
                armed.store(true, Ordering::SeqCst);
                std::future::pending::<()>().await
            },
        )
        .await
        .unwrap();

        assert_eq!(completed, 1);
        assert!(armed_at_render);
    }

    #[tokio::test]
    async fn test_interrupt_before_first_pass_samples_nothing() {
        let broker = MemoryBroker::with_payloads([MESSAGE]);

        let completed = run(
            &broker,
            &sampling(),
            &DelayConfig::default(),
            &watch(0),
            |_, _| {},
            std::future::ready(()),
        )
        .await
        .unwrap();

        assert_eq!(completed, 0);
        assert_eq!(broker.opened(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_broker_ends_run() {
        let broker = MemoryBroker::unreachable();

        let result = run(
            &broker,
            &sampling(),
            &DelayConfig::default(),
            &watch(3),
            |_, _| {},
            std::future::pending(),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_retained_rows_accumulate() {
        let broker = MemoryBroker::with_payloads([MESSAGE]);
        let mut config = watch(3);
        config.retain = Some(Duration::from_secs(3600));
        let mut sizes = Vec::new();

        run(
            &broker,
            &sampling(),
            &DelayConfig::default(),
            &config,
            |_, report| sizes.push(report.rows),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(sizes, vec![2, 4, 6]);
    }
}
