use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation signal shared by the supervisor and its agents.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    triggered: Mutex<bool>,
    changed: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        *self.inner.triggered.lock() = true;
        self.inner.changed.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.triggered.lock()
    }

    /// Sleep for `timeout` unless the signal fires first. Returns `true` when it fired.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut triggered = self.inner.triggered.lock();
        while !*triggered {
            if self
                .inner
                .changed
                .wait_until(&mut triggered, deadline)
                .timed_out()
            {
                break;
            }
        }
        *triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_times_out_without_trigger() {
        let shutdown = Shutdown::new();
        let started = Instant::now();
        assert!(!shutdown.wait(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn trigger_cuts_a_long_wait_short() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                let started = Instant::now();
                (shutdown.wait(Duration::from_secs(30)), started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        shutdown.trigger();
        let (fired, waited) = waiter.join().unwrap();
        assert!(fired);
        assert!(waited < Duration::from_secs(5));
        assert!(shutdown.is_triggered());
    }
}
