//! Filepath: src/core/orchestrator.rs
//! Bounded, cancellable fan-out of per-file work.
//!
//! Tasks are submitted to a rayon pool in committed traversal order. Workers
//! send outcomes back over a crossbeam channel and the calling thread is the
//! only one that folds them into the report and publishes progress, so no
//! worker ever writes shared staging state.
//!
//! - `IngestControl::cancel` stops scheduling; in-flight tasks finish and the
//!   report comes back partial, never as an error
//! - `IngestControl::pause` only holds back new scheduling
//! - the report is accumulated commutatively and canonicalized on finish

use std::{
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    path::PathBuf,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::{
    commit::PlanTotals,
    diagnostics::{Warning, WarningKind},
    processor::{FileArtifact, FileProcessor, ProcessError},
};

#[derive(Debug, Error)]
pub enum OrchestratorError
{
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] ThreadPoolBuildError),
}

/// One unit of work in submission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTask
{
    pub index: usize,
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestStage
{
    Preparing,
    Processing,
    Finalizing,
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus
{
    Pending,
    Processing,
    Completed,
    Error,
    Skipped,
}

/// The per-file change a snapshot was published for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileProgress
{
    pub index: usize,
    pub path: String,
    pub status: FileStatus,
}

/// What a worker hands back for one task
#[derive(Debug, Clone)]
pub struct FileOutcome
{
    pub index: usize,
    pub path: String,
    pub result: Result<FileArtifact, ProcessError>,
    pub elapsed: Duration,
}

/// Authoritative state as of `timestamp`; never a delta
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot
{
    /// Strictly increasing per run
    pub sequence: u64,
    pub stage: IngestStage,
    pub files_total: usize,
    pub files_completed: usize,
    pub files_processing: usize,
    pub files_error: usize,

    /// Files per second since processing started
    pub speed: f64,
    pub eta_seconds: Option<u64>,
    pub activity_log: Vec<String>,

    /// Percentage in `0.0..=100.0`
    pub overall_progress: f64,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileProgress>,
}

/// Receiver of progress snapshots
pub trait ProgressSink: Send + Sync
{
    fn publish(
        &self,
        snapshot: Arc<ProgressSnapshot>,
    );
}

impl<F> ProgressSink for F
where
    F: Fn(Arc<ProgressSnapshot>) + Send + Sync,
{
    fn publish(
        &self,
        snapshot: Arc<ProgressSnapshot>,
    )
    {
        self(snapshot)
    }
}

#[derive(Default)]
struct FeedInner
{
    log: RwLock<Vec<Arc<ProgressSnapshot>>>,
    subscribers: Mutex<Vec<Sender<Arc<ProgressSnapshot>>>>,
}

/// Single-writer, multi-reader progress stream: an append-only log of
/// immutable snapshots plus channel fan-out to live subscribers.
#[derive(Clone, Default)]
pub struct ProgressFeed
{
    inner: Arc<FeedInner>,
}

impl ProgressFeed
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Live stream of snapshots published from now on. The stream ends once
    /// the feed is closed.
    pub fn subscribe(&self) -> Receiver<Arc<ProgressSnapshot>>
    {
        let (tx, rx) = unbounded();
        if let Ok(mut subs) = self.inner.subscribers.lock()
        {
            subs.push(tx);
        }
        rx
    }

    /// Newest snapshot, if any was published
    pub fn latest(&self) -> Option<Arc<ProgressSnapshot>>
    {
        self.inner
            .log
            .read()
            .ok()
            .and_then(|log| log.last().cloned())
    }

    /// Every snapshot published so far, oldest first
    pub fn snapshots(&self) -> Vec<Arc<ProgressSnapshot>>
    {
        self.inner
            .log
            .read()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Disconnect all subscribers; the log stays readable
    pub fn close(&self)
    {
        if let Ok(mut subs) = self.inner.subscribers.lock()
        {
            subs.clear();
        }
    }
}

impl ProgressSink for ProgressFeed
{
    fn publish(
        &self,
        snapshot: Arc<ProgressSnapshot>,
    )
    {
        if let Ok(mut log) = self.inner.log.write()
        {
            log.push(Arc::clone(&snapshot));
        }

        if let Ok(mut subs) = self.inner.subscribers.lock()
        {
            subs.retain(|tx| {
                tx.send(Arc::clone(&snapshot))
                    .is_ok()
            });
        }
    }
}

/// Cooperative cancel and pause flags shared with the caller. Every change
/// also sends a wakeup so an idle scheduler re-checks the flags at once.
#[derive(Debug, Clone)]
pub struct IngestControl
{
    cancelled: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Default for IngestControl
{
    fn default() -> Self
    {
        let (wake_tx, wake_rx) = unbounded();
        Self {
            cancelled: Arc::default(),
            paused: Arc::default(),
            wake_tx,
            wake_rx,
        }
    }
}

impl IngestControl
{
    pub fn new() -> Self
    {
        Self::default()
    }

    fn wake(&self)
    {
        // Both ends live in `self`, so the channel never disconnects
        let _ = self.wake_tx.send(());
    }

    pub fn cancel(&self)
    {
        self.cancelled
            .store(true, Ordering::SeqCst);
        self.wake();
    }

    pub fn is_cancelled(&self) -> bool
    {
        self.cancelled
            .load(Ordering::SeqCst)
    }

    pub fn pause(&self)
    {
        self.paused
            .store(true, Ordering::SeqCst);
        self.wake();
    }

    pub fn resume(&self)
    {
        self.paused
            .store(false, Ordering::SeqCst);
        self.wake();
    }

    pub fn is_paused(&self) -> bool
    {
        self.paused
            .load(Ordering::SeqCst)
    }
}

/// Final aggregate. Counts are sums and the lists are sorted in
/// [`IngestReport::finalize`], so completion order never shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport
{
    pub cancelled: bool,
    pub collections: usize,
    pub manifests: usize,
    pub canvases: usize,
    pub files_total: usize,
    pub files_completed: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub bytes_processed: u64,
    pub artifacts: Vec<FileArtifact>,
    pub warnings: Vec<Warning>,
}

impl IngestReport
{
    fn new(
        totals: PlanTotals,
        files_total: usize,
    ) -> Self
    {
        Self {
            collections: totals.collections,
            manifests: totals.manifests,
            canvases: totals.canvases,
            files_total,
            ..Default::default()
        }
    }

    fn record(
        &mut self,
        outcome: FileOutcome,
    )
    {
        match outcome.result
        {
            Ok(artifact) =>
            {
                self.files_completed += 1;
                self.bytes_processed += artifact.bytes;
                self.artifacts.push(artifact);
            }
            Err(err) =>
            {
                self.files_failed += 1;
                self.warnings
                    .push(Warning::new(WarningKind::FileFailed, outcome.path, err.to_string()));
            }
        }
    }

    /// Fold in warnings produced outside the workers (e.g. at commit)
    pub fn absorb_warnings(
        &mut self,
        warnings: impl IntoIterator<Item = Warning>,
    )
    {
        self.warnings.extend(warnings);
        self.warnings.sort();
    }

    fn finalize(mut self) -> Self
    {
        self.artifacts
            .sort_by(|a, b| a.path.cmp(&b.path));
        self.warnings.sort();
        self
    }

    pub fn is_clean(&self) -> bool
    {
        !self.cancelled && self.files_failed == 0 && self.files_skipped == 0
    }
}

/// Fold outcomes in whatever order they arrive
pub fn aggregate_outcomes(
    outcomes: impl IntoIterator<Item = FileOutcome>,
    totals: PlanTotals,
    files_total: usize,
) -> IngestReport
{
    let mut report = IngestReport::new(totals, files_total);

    for outcome in outcomes
    {
        report.record(outcome);
    }

    report.files_skipped = files_total.saturating_sub(report.files_completed + report.files_failed);
    report.finalize()
}

/// Running counters behind the published snapshots
struct ProgressState
{
    sequence: u64,
    total: usize,
    completed: usize,
    processing: usize,
    errors: usize,
    started: Instant,
    activity: VecDeque<String>,
    activity_len: usize,
}

impl ProgressState
{
    fn new(
        total: usize,
        activity_len: usize,
    ) -> Self
    {
        Self {
            sequence: 0,
            total,
            completed: 0,
            processing: 0,
            errors: 0,
            started: Instant::now(),
            activity: VecDeque::with_capacity(activity_len),
            activity_len,
        }
    }

    fn log(
        &mut self,
        line: String,
    )
    {
        if self.activity_len == 0
        {
            return;
        }

        if self.activity.len() == self.activity_len
        {
            self.activity.pop_front();
        }
        self.activity.push_back(line);
    }

    fn snapshot(
        &mut self,
        stage: IngestStage,
        file: Option<FileProgress>,
    ) -> Arc<ProgressSnapshot>
    {
        self.sequence += 1;

        let done = self.completed + self.errors;
        let secs = self
            .started
            .elapsed()
            .as_secs_f64();
        let speed = if secs > 0.0 { done as f64 / secs } else { 0.0 };
        let remaining = self.total.saturating_sub(done);
        let eta_seconds = (speed > 0.0).then(|| (remaining as f64 / speed).ceil() as u64);
        let overall_progress = if self.total == 0
        {
            100.0
        }
        else
        {
            done as f64 * 100.0 / self.total as f64
        };

        Arc::new(ProgressSnapshot {
            sequence: self.sequence,
            stage,
            files_total: self.total,
            files_completed: self.completed,
            files_processing: self.processing,
            files_error: self.errors,
            speed,
            eta_seconds,
            activity_log: self
                .activity
                .iter()
                .cloned()
                .collect(),
            overall_progress,
            timestamp: Utc::now(),
            file,
        })
    }
}

/// Pool sizing and progress knobs
#[derive(Debug, Clone)]
pub struct Orchestrator
{
    workers: usize,
    activity_log_len: usize,
}

impl Default for Orchestrator
{
    fn default() -> Self
    {
        Self::new(0, 20)
    }
}

impl Orchestrator
{
    /// `workers == 0` means one per available CPU
    pub fn new(
        workers: usize,
        activity_log_len: usize,
    ) -> Self
    {
        let workers = if workers == 0
        {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
        else
        {
            workers
        };

        Self { workers, activity_log_len }
    }

    pub fn workers(&self) -> usize
    {
        self.workers
    }

    /// Process `tasks` and return the aggregate report. Cancellation yields
    /// a partial report with `cancelled` set.
    #[instrument(level = "info", skip_all, fields(files = tasks.len(), workers = self.workers))]
    pub fn run(
        &self,
        tasks: &[FileTask],
        processor: Arc<dyn FileProcessor>,
        sink: &dyn ProgressSink,
        control: &IngestControl,
        totals: PlanTotals,
    ) -> Result<IngestReport, OrchestratorError>
    {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("ingest-{i}"))
            .build()?;

        let (tx, rx) = unbounded::<FileOutcome>();
        let mut state = ProgressState::new(tasks.len(), self.activity_log_len);
        let mut report = IngestReport::new(totals, tasks.len());
        let mut next = 0usize;
        let mut in_flight = 0usize;

        sink.publish(state.snapshot(IngestStage::Preparing, None));

        loop
        {
            while in_flight < self.workers
                && next < tasks.len()
                && !control.is_cancelled()
                && !control.is_paused()
            {
                let task = tasks[next].clone();
                let progress = FileProgress {
                    index: task.index,
                    path: task.path.clone(),
                    status: FileStatus::Processing,
                };

                let tx = tx.clone();
                let processor = Arc::clone(&processor);
                pool.spawn(move || {
                    let started = Instant::now();
                    let result =
                        catch_unwind(AssertUnwindSafe(|| processor.process(&task))).unwrap_or_else(
                            |payload| {
                                Err(ProcessError::Panicked {
                                    path: task.path.clone(),
                                    message: panic_message(payload.as_ref()),
                                })
                            },
                        );

                    // The scheduler may already be gone on shutdown
                    let _ = tx.send(FileOutcome {
                        index: task.index,
                        path: task.path,
                        result,
                        elapsed: started.elapsed(),
                    });
                });

                next += 1;
                in_flight += 1;
                state.processing = in_flight;
                sink.publish(state.snapshot(IngestStage::Processing, Some(progress)));
            }

            if in_flight == 0 && (next >= tasks.len() || control.is_cancelled())
            {
                break;
            }

            // Blocks until a worker reports or the caller flips a control
            let outcome = select! {
                recv(rx) -> msg => match msg
                {
                    Ok(outcome) => outcome,
                    Err(_) => break,
                },
                recv(control.wake_rx) -> _ => continue,
            };

            in_flight -= 1;
            state.processing = in_flight;

            let status = match &outcome.result
            {
                Ok(_) =>
                {
                    state.completed += 1;
                    state.log(format!("done {}", outcome.path));
                    FileStatus::Completed
                }
                Err(err) =>
                {
                    state.errors += 1;
                    warn!(path = %outcome.path, %err, "file failed");
                    state.log(format!("failed {}: {err}", outcome.path));
                    FileStatus::Error
                }
            };

            debug!(path = %outcome.path, elapsed_ms = outcome.elapsed.as_millis() as u64, "file finished");
            let progress =
                FileProgress { index: outcome.index, path: outcome.path.clone(), status };
            report.record(outcome);
            sink.publish(state.snapshot(IngestStage::Processing, Some(progress)));
        }

        sink.publish(state.snapshot(IngestStage::Finalizing, None));

        report.cancelled = control.is_cancelled() && next < tasks.len();
        report.files_skipped = tasks.len() - next;

        let stage = if report.cancelled { IngestStage::Cancelled } else { IngestStage::Complete };
        sink.publish(state.snapshot(stage, None));

        info!(
            completed = report.files_completed,
            failed = report.files_failed,
            skipped = report.files_skipped,
            cancelled = report.cancelled,
            "ingest finished"
        );

        Ok(report.finalize())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String
{
    if let Some(s) = payload.downcast_ref::<&str>()
    {
        (*s).to_string()
    }
    else if let Some(s) = payload.downcast_ref::<String>()
    {
        s.clone()
    }
    else
    {
        "unknown panic".to_string()
    }
}
