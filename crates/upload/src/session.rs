//! Upload session driver.
//!
//! One session takes a drop (or an already flat file list), runs it
//! through the scheduler and turns the event stream into progress
//! updates and a final [`UploadSessionResult`].

use std::sync::Arc;

use fileup_transfer::{ByteProgress, ErrorKind, FileDescriptor, Transport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::cache::{ListingCache, NoopCache};
use crate::error::UploadError;
use crate::flatten::flatten;
use crate::policy::UploadPolicy;
use crate::progress::{ProgressAggregator, ProgressSnapshot};
use crate::report::{ResultReporter, UploadSessionResult, Verdict};
use crate::scheduler::{BatchContext, SessionEvent, UploadScheduler};
use crate::source::DropEntry;
use crate::surface::ProgressSurface;

/// Counters of one session, owned and mutated by the driver only.
struct SessionState {
    progress: ProgressAggregator,
    reporter: ResultReporter,
}

impl SessionState {
    fn on_event(&mut self, event: SessionEvent) -> Option<ProgressSnapshot> {
        match event {
            SessionEvent::BatchStarted { index, len } => self.progress.batch_started(index, len),
            SessionEvent::BatchFinished { index } => self.progress.batch_finished(index),
            SessionEvent::BatchAborted {
                index,
                file_ids,
                reason,
            } => {
                let failed = self
                    .reporter
                    .fail_unaccounted(&file_ids, ErrorKind::Orchestration);
                warn!(batch = index, failed, reason = %reason, "batch aborted");
                self.progress.batch_aborted(index, failed)
            }
            SessionEvent::Outcome(outcome) => {
                if self.reporter.record(&outcome) {
                    self.progress.outcome(&outcome)
                } else {
                    None
                }
            }
        }
    }

    fn on_bytes(&mut self, progress: &ByteProgress) -> Option<ProgressSnapshot> {
        self.progress.byte_progress(progress)
    }
}

/// Uploads drops to one server with a fixed policy.
///
/// Every `run*` call is an independent session with its own counters and
/// its own cancellation token; cancelling one run leaves later runs alone.
pub struct UploadSession {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn ListingCache>,
    policy: UploadPolicy,
}

impl UploadSession {
    pub fn new(transport: Arc<dyn Transport>, policy: UploadPolicy) -> Result<Self, UploadError> {
        policy.validate()?;
        Ok(Self {
            transport,
            cache: Arc::new(NoopCache),
            policy,
        })
    }

    /// Sets the listing cache invalidated when a session ends.
    pub fn with_cache(mut self, cache: Arc<dyn ListingCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Scans `roots` and uploads every file found into `destination`.
    ///
    /// Cancelling `cancel` during the scan ends the session with nothing
    /// uploaded.
    pub async fn run_entries(
        &self,
        roots: Vec<Arc<dyn DropEntry>>,
        destination: &str,
        surface: &mut dyn ProgressSurface,
        cancel: CancellationToken,
    ) -> UploadSessionResult {
        let span = info_span!("upload_session", id = %Uuid::new_v4(), destination);
        async move {
            surface.begin("Uploading files");
            let mut progress = self.aggregator();

            let files = tokio::select! {
                files = flatten(roots, |found| {
                    if let Some(snapshot) = progress.scan_progress(found) {
                        surface.update(&snapshot);
                    }
                }) => files,
                _ = cancel.cancelled() => {
                    info!("cancelled while scanning");
                    Vec::new()
                }
            };

            self.drive(files, destination, surface, progress, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Uploads an already flat file list into `destination`.
    pub async fn run(
        &self,
        files: Vec<FileDescriptor>,
        destination: &str,
        surface: &mut dyn ProgressSurface,
        cancel: CancellationToken,
    ) -> UploadSessionResult {
        let span = info_span!("upload_session", id = %Uuid::new_v4(), destination);
        async move {
            surface.begin("Uploading files");
            let progress = self.aggregator();
            self.drive(files, destination, surface, progress, cancel).await
        }
        .instrument(span)
        .await
    }

    fn aggregator(&self) -> ProgressAggregator {
        ProgressAggregator::new(0, self.policy.batch_size, self.policy.progress_interval())
    }

    async fn drive(
        &self,
        files: Vec<FileDescriptor>,
        destination: &str,
        surface: &mut dyn ProgressSurface,
        mut progress: ProgressAggregator,
        cancel: CancellationToken,
    ) -> UploadSessionResult {
        let files: Vec<Arc<FileDescriptor>> = files.into_iter().map(Arc::new).collect();
        let total_bytes: u64 = files.iter().map(|f| f.byte_size).sum();
        info!(files = files.len(), bytes = total_bytes, "upload session started");

        progress.set_total(files.len(), total_bytes);
        let mut state = SessionState {
            progress,
            reporter: ResultReporter::new(destination, files.clone(), Arc::clone(&self.cache)),
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (bytes_tx, mut bytes_rx) = mpsc::unbounded_channel();
        let scheduler = UploadScheduler::new(
            Arc::new(BatchContext {
                transport: Arc::clone(&self.transport),
                destination: destination.to_string(),
                events: events_tx,
                progress: bytes_tx,
                cancel: cancel.clone(),
                max_transfers: self.policy.max_concurrent_transfers,
            }),
            self.policy.batch_size,
            self.policy.max_concurrent_batches,
        );

        let run = scheduler.run(&files);
        tokio::pin!(run);

        let finished = loop {
            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                Some(event) = events_rx.recv() => state.on_event(event),
                Some(bytes) = bytes_rx.recv() => state.on_bytes(&bytes),
                report = &mut run => break Some(report),
            };
            if let Some(snapshot) = snapshot {
                surface.update(&snapshot);
            }
        };

        // Whatever already arrived is still accounted; transfers that are
        // still running after a cancel are not awaited.
        while let Ok(event) = events_rx.try_recv() {
            if let Some(snapshot) = state.on_event(event) {
                surface.update(&snapshot);
            }
        }
        match finished {
            Some(report) => info!(
                batches = report.batches,
                aborted = report.aborted,
                skipped = report.skipped,
                "scheduler finished"
            ),
            None => {
                info!(accounted = state.reporter.accounted(), "upload session cancelled");
                state.reporter.mark_cancelled();
            }
        }

        if let Some(snapshot) = state.progress.finalizing() {
            surface.update(&snapshot);
        }
        let result = state.reporter.finish();
        let status = if result.failed > 0 {
            format!(
                "Completed: {} successful, {} failed",
                result.successful, result.failed
            )
        } else {
            format!("Completed: {} successful", result.successful)
        };
        surface.update(&state.progress.complete(status));

        if result.verdict == Verdict::Failure {
            surface.fail(&result.message);
        } else {
            surface.end();
        }
        result
    }
}
