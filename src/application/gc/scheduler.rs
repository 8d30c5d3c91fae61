use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Gate for work that runs less often than the main GC interval
pub struct TaskScheduler {
    interval: Duration,
    last_run: Mutex<Option<Instant>>,
}

impl TaskScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: Mutex::new(None), // Allow immediate first run
        }
    }

    /// Check if the task should run based on the interval
    pub fn should_run(&self) -> bool {
        let now = Instant::now();
        let mut last_run = self.last_run.lock();
        match *last_run {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last_run = Some(now);
                true
            }
        }
    }
}
