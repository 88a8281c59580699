use crate::model::Series;
use crate::shutdown::Shutdown;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::Duration;

/// How often a dependency wait re-checks the shutdown signal.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Most recent numeric reading per series.
///
/// Producing agents publish here after every successful append; derived
/// agents read from it instead of from each other.
#[derive(Default)]
pub struct LatestValues {
    values: Mutex<HashMap<Series, f64>>,
    published: Condvar,
}

impl LatestValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, series: Series, value: f64) {
        self.values.lock().insert(series, value);
        self.published.notify_all();
    }

    pub fn get(&self, series: Series) -> Option<f64> {
        self.values.lock().get(&series).copied()
    }

    /// Current values for `deps`, or `None` if any of them has never been published.
    pub fn get_all(&self, deps: &[Series]) -> Option<Vec<f64>> {
        let values = self.values.lock();
        deps.iter().map(|s| values.get(s).copied()).collect()
    }

    /// Block until every series in `deps` has a value.
    ///
    /// Returns `None` if `shutdown` fires first.
    pub fn wait_for(&self, deps: &[Series], shutdown: &Shutdown) -> Option<Vec<f64>> {
        let mut values = self.values.lock();
        loop {
            if shutdown.is_triggered() {
                return None;
            }
            let current: Option<Vec<f64>> = deps.iter().map(|s| values.get(s).copied()).collect();
            if current.is_some() {
                return current;
            }
            self.published.wait_for(&mut values, SHUTDOWN_POLL);
        }
    }
}
