//! Two-level bounded upload scheduler.
//!
//! The flat file list is cut into batches. At most
//! `max_concurrent_batches` batches run at once as spawned tasks; inside a
//! batch at most `max_concurrent_transfers` transfers run at once. Both
//! pools refill from their FIFO queue whenever a slot frees.

use std::collections::VecDeque;
use std::sync::Arc;

use fileup_transfer::{
    ByteProgress, FileDescriptor, ProgressSink, TransferOutcome, Transport, transfer_file,
};
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Ordered slice of the session's files, uploaded as one task.
#[derive(Debug, Clone)]
pub struct Batch {
    pub index: usize,
    /// `(file_id, descriptor)` in original order.
    pub files: Vec<(usize, Arc<FileDescriptor>)>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file_ids(&self) -> Vec<usize> {
        self.files.iter().map(|(id, _)| *id).collect()
    }
}

/// Cuts `files` into batches of `batch_size` in original order.
///
/// File ids are positions in `files`. Only the last batch may be short.
pub fn partition(files: &[Arc<FileDescriptor>], batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    files
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            files: chunk
                .iter()
                .enumerate()
                .map(|(offset, file)| (index * batch_size + offset, Arc::clone(file)))
                .collect(),
        })
        .collect()
}

/// Events a running session reports to its driver.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    BatchStarted { index: usize, len: usize },
    BatchFinished { index: usize },
    /// The batch task died. Files without an outcome yet count as failed.
    BatchAborted {
        index: usize,
        file_ids: Vec<usize>,
        reason: String,
    },
    Outcome(TransferOutcome),
}

/// State shared by every batch task of one session.
pub struct BatchContext {
    pub transport: Arc<dyn Transport>,
    pub destination: String,
    pub events: mpsc::UnboundedSender<SessionEvent>,
    pub progress: mpsc::UnboundedSender<ByteProgress>,
    pub cancel: CancellationToken,
    pub max_transfers: usize,
}

/// Summary of a scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub batches: usize,
    pub started: usize,
    pub finished: usize,
    pub aborted: usize,
    /// Batches never started because the session was cancelled.
    pub skipped: usize,
}

pub struct UploadScheduler {
    ctx: Arc<BatchContext>,
    batch_size: usize,
    max_batches: usize,
}

impl UploadScheduler {
    pub fn new(ctx: Arc<BatchContext>, batch_size: usize, max_batches: usize) -> Self {
        Self {
            ctx,
            batch_size: batch_size.max(1),
            max_batches: max_batches.max(1),
        }
    }

    /// Uploads `files`, returning once every started batch resolved.
    ///
    /// Never fails. Per-file results arrive on the context's event
    /// channel; a panicking batch is reported as
    /// [`SessionEvent::BatchAborted`] and scheduling carries on.
    pub async fn run(&self, files: &[Arc<FileDescriptor>]) -> SchedulerReport {
        let mut queue: VecDeque<Batch> = partition(files, self.batch_size).into();
        let mut report = SchedulerReport {
            batches: queue.len(),
            ..Default::default()
        };
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.max_batches && !self.ctx.cancel.is_cancelled() {
                let Some(batch) = queue.pop_front() else {
                    break;
                };
                let index = batch.index;
                let file_ids = batch.file_ids();
                let _ = self.ctx.events.send(SessionEvent::BatchStarted {
                    index,
                    len: batch.len(),
                });
                report.started += 1;

                let handle = tokio::spawn(run_batch(Arc::clone(&self.ctx), batch));
                in_flight.push(async move { (index, file_ids, handle.await) });
            }

            let Some((index, file_ids, joined)) = in_flight.next().await else {
                break;
            };
            match joined {
                Ok(()) => {
                    report.finished += 1;
                    let _ = self.ctx.events.send(SessionEvent::BatchFinished { index });
                }
                Err(e) => {
                    report.aborted += 1;
                    error!(batch = index, error = %e, "batch task failed");
                    let _ = self.ctx.events.send(SessionEvent::BatchAborted {
                        index,
                        file_ids,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.skipped = queue.len();
        report
    }
}

async fn run_batch(ctx: Arc<BatchContext>, batch: Batch) {
    debug!(batch = batch.index, files = batch.len(), "batch started");
    let index = batch.index;
    let mut pending = batch.files.into_iter();
    let mut in_flight = FuturesUnordered::new();

    loop {
        while in_flight.len() < ctx.max_transfers && !ctx.cancel.is_cancelled() {
            let Some((file_id, file)) = pending.next() else {
                break;
            };
            in_flight.push(transfer_one(&ctx, file_id, file));
        }

        let Some(outcome) = in_flight.next().await else {
            break;
        };
        debug!(
            batch = index,
            path = %outcome.file.relative_path,
            error = ?outcome.error,
            "transfer resolved"
        );
        let _ = ctx.events.send(SessionEvent::Outcome(outcome));
    }
    debug!(batch = index, "batch finished");
}

async fn transfer_one(
    ctx: &BatchContext,
    file_id: usize,
    file: Arc<FileDescriptor>,
) -> TransferOutcome {
    let sink = ProgressSink::new(file_id, file.byte_size, ctx.progress.clone());
    transfer_file(ctx.transport.as_ref(), &ctx.destination, file_id, file, &sink).await
}
