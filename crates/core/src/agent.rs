//! The polling loop shared by every collector agent.

use crate::{
    error::Result,
    executor::CommandExecutor,
    latest::LatestValues,
    metrics::Collector,
    model::Sample,
    shutdown::Shutdown,
    store::TimeSeriesStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything an agent shares with its siblings
#[derive(Clone)]
pub struct AgentContext {
    pub executor: Arc<dyn CommandExecutor>,
    pub store: Arc<TimeSeriesStore>,
    pub latest: Arc<LatestValues>,
    pub shutdown: Shutdown,
}

/// Counters for one agent's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub cycles: u64,
    pub skipped: u64,
    pub samples: u64,
}

/// Run `collector` every `interval` until shutdown.
///
/// Connection and parse failures skip the cycle. Only a store failure that
/// outlived the store's own retries ends the loop with an error.
pub fn run_agent(
    collector: &dyn Collector,
    ctx: &AgentContext,
    interval: Duration,
) -> Result<AgentStats> {
    let agent = collector.kind();
    let mut stats = AgentStats::default();

    if !collector.prepare(ctx) {
        debug!(%agent, "shutdown before first cycle");
        return Ok(stats);
    }
    info!(%agent, interval_ms = interval.as_millis() as u64, "agent started");

    loop {
        if ctx.shutdown.is_triggered() {
            break;
        }
        stats.cycles += 1;

        match collector.collect(ctx) {
            Ok(readings) => {
                for reading in readings {
                    ctx.store.append(reading.series, Sample::now(reading.value))?;
                    stats.samples += 1;
                    if let Some(value) = reading.numeric {
                        ctx.latest.publish(reading.series, value);
                    }
                }
            }
            Err(e) => {
                stats.skipped += 1;
                warn!(%agent, error = %e, "cycle skipped");
            }
        }

        if ctx.shutdown.wait(interval) {
            break;
        }
    }

    info!(%agent, cycles = stats.cycles, skipped = stats.skipped, "agent stopped");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::metrics::TemperatureCollector;
    use crate::model::Series;
    use crate::store::RetryPolicy;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::thread;

    /// Answers every command with the next scripted output, then with nothing.
    struct Scripted {
        outputs: Mutex<VecDeque<Result<Vec<String>>>>,
    }

    impl Scripted {
        fn new(outputs: Vec<Result<Vec<String>>>) -> Self {
            Self {
                outputs: Mutex::new(outputs.into()),
            }
        }
    }

    impl CommandExecutor for Scripted {
        fn execute(&self, _command: &str) -> Result<Vec<String>> {
            self.outputs.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        fn target_name(&self) -> String {
            "scripted".to_string()
        }
    }

    fn context(dir: &std::path::Path, exec: Scripted) -> AgentContext {
        let retry = RetryPolicy {
            attempts: 2,
            initial_backoff: Duration::from_millis(1),
        };
        AgentContext {
            executor: Arc::new(exec),
            store: Arc::new(TimeSeriesStore::open(dir, "scripted", retry).unwrap()),
            latest: Arc::new(LatestValues::new()),
            shutdown: Shutdown::new(),
        }
    }

    fn line(s: &str) -> Result<Vec<String>> {
        Ok(vec![s.to_string()])
    }

    #[test]
    fn bad_cycles_are_skipped_and_the_loop_survives() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            dir.path(),
            Scripted::new(vec![
                line("temp=47.0'C"),
                line("garbage"),
                Err(CoreError::connection("timed out")),
                line("temp=49.5'C"),
            ]),
        );

        let runner = {
            let ctx = ctx.clone();
            thread::spawn(move || run_agent(&TemperatureCollector, &ctx, Duration::from_millis(5)))
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while ctx.store.read_all().unwrap().series(Series::Temperature).len() < 2 {
            assert!(std::time::Instant::now() < deadline, "agent stalled");
            thread::sleep(Duration::from_millis(5));
        }
        ctx.shutdown.trigger();
        let stats = runner.join().unwrap().unwrap();

        let temps: Vec<_> = ctx
            .store
            .read_all()
            .unwrap()
            .series(Series::Temperature)
            .iter()
            .map(|s| s.value.clone())
            .collect();
        assert_eq!(temps, vec!["47.0", "49.5"]);
        assert!(stats.skipped >= 2);
        assert_eq!(stats.samples, 2);
        assert_eq!(ctx.latest.get(Series::Temperature), Some(49.5));
    }

    #[test]
    fn store_failure_stops_the_agent() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Scripted::new(vec![line("temp=47.0'C")]));
        std::fs::remove_file(ctx.store.path()).unwrap();

        let err = run_agent(&TemperatureCollector, &ctx, Duration::from_secs(60)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn triggered_shutdown_prevents_any_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Scripted::new(vec![line("temp=47.0'C")]));
        ctx.shutdown.trigger();

        let stats = run_agent(&TemperatureCollector, &ctx, Duration::from_secs(60)).unwrap();
        assert_eq!(stats, AgentStats::default());
        assert_eq!(ctx.store.read_all().unwrap().total_samples(), 0);
    }
}
