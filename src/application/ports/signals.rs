use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cooperative pause/cancel source for long-running scans.
///
/// Returns `true` when the caller must stop. Implementations may block while
/// paused.
#[async_trait]
pub trait InterruptSignal: Send + Sync {
    async fn pause_or_break(&self) -> bool;
}

/// Signal that never interrupts
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverInterrupt;

#[async_trait]
impl InterruptSignal for NeverInterrupt {
    async fn pause_or_break(&self) -> bool {
        false
    }
}

#[async_trait]
impl InterruptSignal for CancellationToken {
    async fn pause_or_break(&self) -> bool {
        self.is_cancelled()
    }
}

/// Pause/resume/cancel handle for administrative tasks
#[derive(Debug, Clone)]
pub struct TaskControl {
    token: CancellationToken,
    paused: watch::Sender<bool>,
}

impl Default for TaskControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            token: CancellationToken::new(),
            paused,
        }
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[async_trait]
impl InterruptSignal for TaskControl {
    async fn pause_or_break(&self) -> bool {
        let mut paused = self.paused.subscribe();
        loop {
            if self.token.is_cancelled() {
                return true;
            }
            if !*paused.borrow_and_update() {
                return false;
            }
            tokio::select! {
                _ = self.token.cancelled() => return true,
                changed = paused.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

/// Severity of a progress message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Status,
    Warning,
    Error,
}

/// Progress sink for administrative operations (GC, prune, attach/detach)
pub trait StatusReporter: Send + Sync {
    fn report(&self, level: ReportLevel, message: &str);

    fn status(&self, message: &str) {
        self.report(ReportLevel::Status, message);
    }

    fn warn(&self, message: &str) {
        self.report(ReportLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.report(ReportLevel::Error, message);
    }
}

/// Reporter that forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn report(&self, level: ReportLevel, message: &str) {
        match level {
            ReportLevel::Status => info!(target: "binstore::report", "{}", message),
            ReportLevel::Warning => warn!(target: "binstore::report", "{}", message),
            ReportLevel::Error => error!(target: "binstore::report", "{}", message),
        }
    }
}

/// Reporter that keeps every message, for callers that render a summary
#[derive(Debug, Default)]
pub struct CollectingReporter {
    entries: Mutex<Vec<(ReportLevel, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(ReportLevel, String)> {
        self.entries.lock().clone()
    }

    pub fn count(&self, level: ReportLevel) -> usize {
        self.entries.lock().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(ReportLevel::Error) > 0
    }
}

impl StatusReporter for CollectingReporter {
    fn report(&self, level: ReportLevel, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}
