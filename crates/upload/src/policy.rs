//! Concurrency and pacing policy for an upload session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Tunables for one upload session.
///
/// Missing fields fall back to the defaults, so a partial `[upload]`
/// table in a config file is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    /// Files per batch. The last batch may be smaller.
    pub batch_size: usize,
    /// Batches in flight at once.
    pub max_concurrent_batches: usize,
    /// Transfers in flight at once inside one batch.
    pub max_concurrent_transfers: usize,
    /// Minimum spacing between throttled progress updates.
    pub progress_interval_ms: u64,
    /// Directory entries requested per page while scanning.
    pub scan_page_size: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrent_batches: 5,
            max_concurrent_transfers: 50,
            progress_interval_ms: 250,
            scan_page_size: 100,
        }
    }
}

impl UploadPolicy {
    /// Rejects values that would stall the scheduler.
    pub fn validate(&self) -> Result<(), UploadError> {
        let checks = [
            ("batch_size", self.batch_size),
            ("max_concurrent_batches", self.max_concurrent_batches),
            ("max_concurrent_transfers", self.max_concurrent_transfers),
            ("scan_page_size", self.scan_page_size),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(UploadError::InvalidPolicy(format!("{field} must be at least 1")));
            }
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Upper bound on transfers in flight across the whole session.
    pub fn max_in_flight(&self) -> usize {
        self.max_concurrent_batches
            .saturating_mul(self.max_concurrent_transfers.min(self.batch_size))
    }
}
