//! Session result accounting.

use std::sync::Arc;

use fileup_transfer::{ErrorKind, FileDescriptor, TransferOutcome};
use tracing::{info, warn};

use crate::cache::ListingCache;
use crate::progress::plural;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every file was stored.
    Success,
    /// Some files were stored, some failed.
    PartialSuccess,
    /// No file was stored.
    Failure,
    /// There was nothing to upload.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub relative_path: String,
    pub error: ErrorKind,
}

/// Final summary of one upload session.
///
/// `successful + failed == total` always holds.
#[derive(Debug, Clone)]
pub struct UploadSessionResult {
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
    pub message: String,
    pub verdict: Verdict,
    pub cancelled: bool,
    pub failures: Vec<FailedFile>,
}

/// Accounts each file's outcome exactly once.
pub struct ResultReporter {
    destination: String,
    files: Vec<Arc<FileDescriptor>>,
    accounted: Vec<bool>,
    successful: usize,
    failures: Vec<FailedFile>,
    cancelled: bool,
    cache: Arc<dyn ListingCache>,
}

impl ResultReporter {
    pub fn new(
        destination: impl Into<String>,
        files: Vec<Arc<FileDescriptor>>,
        cache: Arc<dyn ListingCache>,
    ) -> Self {
        let accounted = vec![false; files.len()];
        Self {
            destination: destination.into(),
            files,
            accounted,
            successful: 0,
            failures: Vec::new(),
            cancelled: false,
            cache,
        }
    }

    /// Records an outcome. Returns `false` for a duplicate or unknown id.
    pub fn record(&mut self, outcome: &TransferOutcome) -> bool {
        self.account(outcome.file_id, outcome.error)
    }

    /// Fails every listed id that has no outcome yet.
    ///
    /// Returns how many were failed.
    pub fn fail_unaccounted(&mut self, file_ids: &[usize], kind: ErrorKind) -> usize {
        let mut failed = 0;
        for &id in file_ids {
            if self.accounted.get(id) == Some(&false) && self.account(id, Some(kind)) {
                failed += 1;
            }
        }
        failed
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn accounted(&self) -> usize {
        self.successful + self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.files.len()
    }

    /// Closes the session.
    ///
    /// Files still without an outcome are failed as cancelled, then the
    /// destination's cached listing is invalidated.
    pub fn finish(mut self) -> UploadSessionResult {
        let missing: Vec<usize> = (0..self.files.len())
            .filter(|&id| !self.accounted[id])
            .collect();
        if !missing.is_empty() {
            self.fail_unaccounted(&missing, ErrorKind::Cancelled);
        }

        self.cache.invalidate(&self.destination);

        let total = self.files.len();
        let successful = self.successful;
        let failed = self.failures.len();
        let verdict = match (successful, failed) {
            (0, 0) => Verdict::Empty,
            (_, 0) => Verdict::Success,
            (0, _) => Verdict::Failure,
            _ => Verdict::PartialSuccess,
        };
        let mut message = summary(verdict, successful, failed);
        if self.cancelled {
            message.push_str(" (cancelled)");
        }

        info!(
            destination = %self.destination,
            successful,
            failed,
            total,
            cancelled = self.cancelled,
            "upload session finished"
        );

        UploadSessionResult {
            successful,
            failed,
            total,
            message,
            verdict,
            cancelled: self.cancelled,
            failures: self.failures,
        }
    }

    fn account(&mut self, file_id: usize, error: Option<ErrorKind>) -> bool {
        match self.accounted.get_mut(file_id) {
            Some(seen) if !*seen => *seen = true,
            Some(_) => {
                warn!(file_id, "duplicate outcome ignored");
                return false;
            }
            None => {
                warn!(file_id, "outcome for unknown file ignored");
                return false;
            }
        }
        match error {
            None => self.successful += 1,
            Some(error) => self.failures.push(FailedFile {
                relative_path: self.files[file_id].relative_path.clone(),
                error,
            }),
        }
        true
    }
}

fn summary(verdict: Verdict, successful: usize, failed: usize) -> String {
    match verdict {
        Verdict::Empty => "No files to upload".to_string(),
        Verdict::Success => format!(
            "Uploaded {successful} {} successfully",
            plural(successful, "file")
        ),
        Verdict::PartialSuccess => format!(
            "Uploaded {successful} {} successfully, {failed} failed",
            plural(successful, "file")
        ),
        Verdict::Failure => format!("Failed to upload {failed} {}", plural(failed, "file")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCache {
        invalidated: Mutex<Vec<String>>,
    }

    impl ListingCache for RecordingCache {
        fn invalidate(&self, path: &str) {
            self.invalidated.lock().unwrap().push(path.to_string());
        }
    }

    fn files(n: usize) -> Vec<Arc<FileDescriptor>> {
        (0..n)
            .map(|i| Arc::new(FileDescriptor::from_bytes(format!("dir/f{i}"), &b"x"[..])))
            .collect()
    }

    fn reporter(n: usize) -> (ResultReporter, Arc<RecordingCache>) {
        let cache = Arc::new(RecordingCache::default());
        let all = files(n);
        (ResultReporter::new("/docs", all, cache.clone()), cache)
    }

    fn ok(id: usize) -> TransferOutcome {
        TransferOutcome::succeeded(id, Arc::new(FileDescriptor::from_bytes("x", &b""[..])))
    }

    fn err(id: usize, kind: ErrorKind) -> TransferOutcome {
        TransferOutcome::failed(id, Arc::new(FileDescriptor::from_bytes("x", &b""[..])), kind)
    }

    #[test]
    fn partial_success_summary() {
        let (mut rep, cache) = reporter(45);
        for id in 0..42 {
            rep.record(&ok(id));
        }
        for id in 42..45 {
            rep.record(&err(id, ErrorKind::Http(500)));
        }

        let result = rep.finish();
        assert_eq!(result.verdict, Verdict::PartialSuccess);
        assert_eq!(result.message, "Uploaded 42 files successfully, 3 failed");
        assert_eq!(result.successful + result.failed, result.total);
        assert_eq!(result.failures[0].relative_path, "dir/f42");
        assert_eq!(*cache.invalidated.lock().unwrap(), vec!["/docs".to_string()]);
    }

    #[test]
    fn singular_and_failure_summaries() {
        let (mut rep, _) = reporter(1);
        rep.record(&ok(0));
        let result = rep.finish();
        assert_eq!(result.verdict, Verdict::Success);
        assert_eq!(result.message, "Uploaded 1 file successfully");

        let (mut rep, _) = reporter(2);
        rep.record(&err(0, ErrorKind::Network));
        rep.record(&err(1, ErrorKind::MalformedResponse));
        let result = rep.finish();
        assert_eq!(result.verdict, Verdict::Failure);
        assert_eq!(result.message, "Failed to upload 2 files");
    }

    #[test]
    fn empty_session() {
        let (rep, cache) = reporter(0);
        let result = rep.finish();
        assert_eq!(result.verdict, Verdict::Empty);
        assert_eq!(result.message, "No files to upload");
        assert_eq!(cache.invalidated.lock().unwrap().len(), 1);
    }

    #[test]
    fn duplicates_ignored() {
        let (mut rep, _) = reporter(2);
        assert!(rep.record(&ok(0)));
        assert!(!rep.record(&err(0, ErrorKind::Network)));
        assert!(!rep.record(&ok(7)));
        assert_eq!(rep.accounted(), 1);
    }

    #[test]
    fn unaccounted_fail_on_abort_and_finish() {
        let (mut rep, _) = reporter(6);
        rep.record(&ok(0));
        assert_eq!(rep.fail_unaccounted(&[0, 1, 2], ErrorKind::Orchestration), 2);
        rep.mark_cancelled();

        let result = rep.finish();
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 5);
        assert!(result.cancelled);
        assert!(result.message.ends_with("(cancelled)"));
        let cancelled = result
            .failures
            .iter()
            .filter(|f| f.error == ErrorKind::Cancelled)
            .count();
        assert_eq!(cancelled, 3);
    }
}
