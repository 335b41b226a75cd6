//! Client error collection with batched delivery.
//!
//! An [`ErrorTracker`] is an ordinary value owned by whoever owns the
//! application lifetime. Captured errors wait in a bounded queue (oldest
//! dropped first) until [`ErrorTracker::flush`] hands them to the
//! configured [`ErrorSink`]. [`ErrorTracker::start`] flushes on an interval
//! and [`ErrorTracker::stop`] performs the final flush on shutdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{ErrorTrackingConfig, SinkKind};
use crate::errors::{SafeLock, StoreError, StoreResult};

pub type ErrorContext = BTreeMap<String, String>;

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedError {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for flushed error batches.
pub trait ErrorSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn send(&self, batch: &[CapturedError]) -> StoreResult<()>;
}

/// Emits each error as a tracing event.
#[derive(Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, batch: &[CapturedError]) -> StoreResult<()> {
        for e in batch {
            error!(
                id = %e.id,
                message = %e.message,
                context = ?e.context,
                user_id = ?e.user_id,
                correlation_id = ?e.correlation_id,
                timestamp = %e.timestamp,
                "captured client error"
            );
        }
        Ok(())
    }
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlFileSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ErrorSink for JsonlFileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn send(&self, batch: &[CapturedError]) -> StoreResult<()> {
        let _guard = self.write_lock.safe_lock()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(format!("open {}", self.path.display()), e))?;

        for e in batch {
            let line = serde_json::to_string(e)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

/// Discards everything. Used when tracking is disabled.
#[derive(Debug, Default)]
pub struct NoopSink;

impl ErrorSink for NoopSink {
    fn name(&self) -> &'static str {
        "none"
    }

    fn send(&self, _batch: &[CapturedError]) -> StoreResult<()> {
        Ok(())
    }
}

pub fn build_sink(config: &ErrorTrackingConfig) -> StoreResult<Arc<dyn ErrorSink>> {
    if !config.enabled {
        return Ok(Arc::new(NoopSink));
    }
    Ok(match config.sink {
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::None => Arc::new(NoopSink),
        SinkKind::File => {
            let path = config.file_path.clone().ok_or_else(|| {
                StoreError::config("error_tracking.file_path is required for the file sink")
            })?;
            Arc::new(JsonlFileSink::new(path))
        }
    })
}

#[derive(Debug, Default)]
struct Identity {
    user_id: Option<String>,
    correlation_id: Option<String>,
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

pub struct ErrorTracker {
    sink: Arc<dyn ErrorSink>,
    clock: Arc<dyn Clock>,
    max_queue: usize,
    flush_interval: Duration,
    queue: Mutex<VecDeque<CapturedError>>,
    identity: Mutex<Identity>,
    worker: Mutex<Option<Worker>>,
}

impl ErrorTracker {
    pub fn new(
        config: &ErrorTrackingConfig,
        sink: Arc<dyn ErrorSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            clock,
            max_queue: config.max_queue.max(1),
            flush_interval: Duration::from_secs(config.flush_interval_secs.max(1)),
            queue: Mutex::new(VecDeque::new()),
            identity: Mutex::new(Identity::default()),
            worker: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ErrorTrackingConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Ok(Self::new(config, build_sink(config)?, clock))
    }

    /// Override the flush period, mainly for tests.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval.max(MIN_FLUSH_INTERVAL);
        self
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    pub fn set_user(&self, user_id: impl Into<String>) {
        if let Ok(mut identity) = self.identity.safe_lock() {
            identity.user_id = Some(user_id.into());
        }
    }

    pub fn set_correlation_id(&self, correlation_id: impl Into<String>) {
        if let Ok(mut identity) = self.identity.safe_lock() {
            identity.correlation_id = Some(correlation_id.into());
        }
    }

    /// Queue an error for the next flush and return its id.
    pub fn capture(&self, message: impl Into<String>, context: ErrorContext) -> String {
        let (user_id, correlation_id) = match self.identity.safe_lock() {
            Ok(identity) => (identity.user_id.clone(), identity.correlation_id.clone()),
            Err(_) => (None, None),
        };
        let captured = CapturedError {
            id: Uuid::new_v4().to_string(),
            message: message.into(),
            context,
            user_id,
            correlation_id,
            timestamp: self.clock.now(),
        };
        let id = captured.id.clone();
        debug!(id = %id, message = %captured.message, "captured error");

        match self.queue.safe_lock() {
            Ok(mut queue) => {
                queue.push_back(captured);
                while queue.len() > self.max_queue {
                    queue.pop_front();
                }
            }
            Err(e) => warn!(error = %e, "dropping captured error"),
        }
        id
    }

    /// Capture an error value including its source chain.
    pub fn capture_error(&self, err: &dyn std::error::Error, context: ErrorContext) -> String {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        self.capture(message, context)
    }

    pub fn pending(&self) -> usize {
        self.queue.safe_lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Send everything queued to the sink and return how many were sent.
    ///
    /// A failed send is logged and the batch is dropped.
    pub fn flush(&self) -> usize {
        let batch: Vec<CapturedError> = match self.queue.safe_lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => return 0,
        };
        if batch.is_empty() {
            return 0;
        }

        match self.sink.send(&batch) {
            Ok(()) => {
                debug!(count = batch.len(), sink = self.sink.name(), "flushed errors");
                batch.len()
            }
            Err(e) => {
                warn!(
                    error = %e,
                    sink = self.sink.name(),
                    dropped = batch.len(),
                    "error sink failed"
                );
                0
            }
        }
    }

    /// Start periodic flushing on the current tokio runtime.
    ///
    /// Calling `start` on a running tracker does nothing.
    pub fn start(self: &Arc<Self>) -> StoreResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| StoreError::internal("error tracker needs a tokio runtime"))?;

        let mut worker = self.worker.safe_lock()?;
        if worker.is_some() {
            return Ok(());
        }

        let (shutdown, mut stopped) = oneshot::channel();
        let tracker = Arc::downgrade(self);
        let period = self.flush_interval;

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => match tracker.upgrade() {
                        Some(tracker) => {
                            // sinks may block on I/O
                            if let Err(e) = tokio::task::spawn_blocking(move || tracker.flush()).await {
                                warn!(error = %e, "periodic error flush failed");
                            }
                        }
                        None => break,
                    },
                    _ = &mut stopped => break,
                }
            }
        });

        *worker = Some(Worker { handle, shutdown });
        debug!(interval_ms = period.as_millis() as u64, "error tracker started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.safe_lock().map(|w| w.is_some()).unwrap_or(false)
    }

    /// Stop periodic flushing and flush what is left.
    pub async fn stop(self: &Arc<Self>) -> usize {
        let worker = match self.worker.safe_lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        if let Some(worker) = worker {
            let _ = worker.shutdown.send(());
            if let Err(e) = worker.handle.await {
                warn!(error = %e, "error tracker task ended abnormally");
            }
        }

        let tracker = Arc::clone(self);
        match tokio::task::spawn_blocking(move || tracker.flush()).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(error = %e, "final error flush failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<CapturedError>>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<CapturedError> {
            self.batches.lock().unwrap().iter().flatten().cloned().collect()
        }
    }

    impl ErrorSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn send(&self, batch: &[CapturedError]) -> StoreResult<()> {
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    struct BrokenSink;

    impl ErrorSink for BrokenSink {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn send(&self, _batch: &[CapturedError]) -> StoreResult<()> {
            Err(StoreError::sink("broken", "unreachable"))
        }
    }

    fn config(max_queue: usize) -> ErrorTrackingConfig {
        ErrorTrackingConfig {
            max_queue,
            ..ErrorTrackingConfig::default()
        }
    }

    fn context(pairs: &[(&str, &str)]) -> ErrorContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn flush_delivers_queued_errors_once() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = ErrorTracker::new(&config(50), sink.clone(), Arc::new(SystemClock));

        tracker.set_user("user-1");
        tracker.capture("render failed", context(&[("type", "unhandled_error")]));
        tracker.capture("fetch failed", ErrorContext::new());
        assert_eq!(tracker.pending(), 2);

        assert_eq!(tracker.flush(), 2);
        assert_eq!(tracker.flush(), 0);

        let sent = sink.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].message, "render failed");
        assert_eq!(sent[0].context.get("type").map(String::as_str), Some("unhandled_error"));
        assert_eq!(sent[0].user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn queue_drops_oldest_beyond_limit() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = ErrorTracker::new(&config(3), sink.clone(), Arc::new(SystemClock));
        for i in 0..5 {
            tracker.capture(format!("error {i}"), ErrorContext::new());
        }
        assert_eq!(tracker.pending(), 3);

        tracker.flush();
        let messages: Vec<String> = sink.sent().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["error 2", "error 3", "error 4"]);
    }

    #[test]
    fn failing_sink_drops_batch() {
        let tracker = ErrorTracker::new(&config(50), Arc::new(BrokenSink), Arc::new(SystemClock));
        tracker.capture("lost", ErrorContext::new());

        assert_eq!(tracker.flush(), 0);
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn capture_error_includes_sources() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = ErrorTracker::new(&config(50), sink.clone(), Arc::new(SystemClock));
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StoreError::io("write favorites", io);

        tracker.capture_error(&err, ErrorContext::new());
        tracker.flush();
        assert_eq!(
            sink.sent()[0].message,
            "I/O operation failed: write favorites: denied"
        );
    }

    #[test]
    fn start_outside_runtime_is_an_error() {
        let tracker = Arc::new(ErrorTracker::new(
            &config(50),
            Arc::new(NoopSink),
            Arc::new(SystemClock),
        ));
        assert!(tracker.start().is_err());
        assert!(!tracker.is_running());
    }

    #[tokio::test]
    async fn stop_performs_final_flush() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = Arc::new(ErrorTracker::new(&config(50), sink.clone(), Arc::new(SystemClock)));
        tracker.start().unwrap();
        assert!(tracker.is_running());

        tracker.capture("before unload", ErrorContext::new());
        assert_eq!(tracker.stop().await, 1);
        assert!(!tracker.is_running());
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn periodic_flush_runs_while_started() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = Arc::new(
            ErrorTracker::new(&config(50), sink.clone(), Arc::new(SystemClock))
                .with_flush_interval(Duration::from_millis(20)),
        );
        tracker.start().unwrap();
        tracker.capture("background", ErrorContext::new());

        let mut delivered = false;
        for _ in 0..100 {
            if !sink.sent().is_empty() {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tracker.stop().await;
        assert!(delivered);
    }

    #[tokio::test]
    async fn zero_flush_interval_is_clamped() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = Arc::new(
            ErrorTracker::new(&config(50), sink.clone(), Arc::new(SystemClock))
                .with_flush_interval(Duration::ZERO),
        );
        assert_eq!(tracker.flush_interval, MIN_FLUSH_INTERVAL);

        tracker.start().unwrap();
        tracker.capture("tight loop", ErrorContext::new());
        for _ in 0..100 {
            if !sink.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tracker.stop().await;
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn file_sink_flushes_from_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.jsonl");
        let tracker = Arc::new(ErrorTracker::new(
            &config(50),
            Arc::new(JsonlFileSink::new(&path)),
            Arc::new(SystemClock),
        ));
        tracker.start().unwrap();
        tracker.capture("on shutdown", ErrorContext::new());

        assert_eq!(tracker.stop().await, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.jsonl");
        let tracker = ErrorTracker::new(
            &config(50),
            Arc::new(JsonlFileSink::new(&path)),
            Arc::new(SystemClock),
        );

        tracker.capture("one", ErrorContext::new());
        tracker.flush();
        tracker.capture("two", ErrorContext::new());
        tracker.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<CapturedError> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].message, "two");
    }

    #[test]
    fn disabled_tracking_uses_noop_sink() {
        let mut cfg = ErrorTrackingConfig::default();
        cfg.enabled = false;
        assert_eq!(build_sink(&cfg).unwrap().name(), "none");

        cfg.enabled = true;
        assert_eq!(build_sink(&cfg).unwrap().name(), "log");

        cfg.sink = SinkKind::File;
        assert!(build_sink(&cfg).is_err());
    }
}
