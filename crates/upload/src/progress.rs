//! Session progress aggregation and throttling.
//!
//! Scan counts, batch lifecycle and byte progress fold into one
//! [`ProgressSnapshot`]. Transfers fill `[0, 90]`; the last tenth is
//! reserved for finalization.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use fileup_transfer::{ByteProgress, SpeedCalculator, TransferOutcome};
use tokio::time::Instant;

/// Share of the bar covered by transfers.
pub const TRANSFER_SPAN: f64 = 90.0;

/// What the presentation surface shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub label: String,
    /// In `[0, 100]`, non-decreasing within a session.
    pub percentage: f64,
    pub processed: usize,
    pub total: usize,
    pub status: String,
}

/// Rate limiter for progress updates.
///
/// Admits the first update, anything at 100% and otherwise at most one
/// update per interval.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn admit(&mut self, percentage: f64) -> bool {
        let now = Instant::now();
        let admitted = match self.last {
            None => true,
            Some(_) if percentage >= 100.0 => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if admitted {
            self.last = Some(now);
        }
        admitted
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Default)]
struct BatchProgress {
    len: usize,
    resolved: usize,
    fractions: HashMap<usize, f64>,
}

impl BatchProgress {
    fn fraction(&self) -> f64 {
        if self.len == 0 {
            return 1.0;
        }
        let partial: f64 = self.fractions.values().sum();
        ((self.resolved as f64 + partial) / self.len as f64).min(1.0)
    }
}

/// Folds session events into throttled snapshots.
///
/// Each method returns `Some` when the update passes the throttle and
/// should be shown.
pub struct ProgressAggregator {
    total: usize,
    batch_size: usize,
    total_batches: usize,
    completed_batches: usize,
    in_flight: HashMap<usize, BatchProgress>,
    processed: usize,
    successful: usize,
    failed: usize,
    percentage: f64,
    bytes_per_file: HashMap<usize, u64>,
    resolved: HashSet<usize>,
    total_bytes: u64,
    sent_bytes: u64,
    speed: SpeedCalculator,
    throttle: Throttle,
}

impl ProgressAggregator {
    pub fn new(total: usize, batch_size: usize, interval: Duration) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            total,
            batch_size,
            total_batches: total.div_ceil(batch_size),
            completed_batches: 0,
            in_flight: HashMap::new(),
            processed: 0,
            successful: 0,
            failed: 0,
            percentage: 0.0,
            bytes_per_file: HashMap::new(),
            resolved: HashSet::new(),
            total_bytes: 0,
            sent_bytes: 0,
            speed: SpeedCalculator::default(),
            throttle: Throttle::new(interval),
        }
    }

    /// Starts a new session: percentage back to 0 and the next update is
    /// shown immediately.
    pub fn reset(&mut self, total: usize) {
        let interval = self.throttle.interval;
        *self = Self::new(total, self.batch_size, interval);
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    pub fn scan_progress(&mut self, found: usize) -> Option<ProgressSnapshot> {
        let status = format!("Found {found} {}", plural(found, "file"));
        self.emit("Scanning", status, false)
    }

    /// Sets the session size once the scan finished.
    pub fn set_total(&mut self, total: usize, total_bytes: u64) {
        self.total = total;
        self.total_bytes = total_bytes;
        self.total_batches = total.div_ceil(self.batch_size);
    }

    pub fn batch_started(&mut self, index: usize, len: usize) -> Option<ProgressSnapshot> {
        self.in_flight.insert(
            index,
            BatchProgress {
                len,
                ..Default::default()
            },
        );
        self.transfer_update(format!("Batch {}/{} started", index + 1, self.total_batches))
    }

    /// Reports for files that already have an outcome, or whose batch is
    /// no longer in flight, are dropped.
    pub fn byte_progress(&mut self, progress: &ByteProgress) -> Option<ProgressSnapshot> {
        let index = progress.file_id / self.batch_size;
        if self.resolved.contains(&progress.file_id) || !self.in_flight.contains_key(&index) {
            return None;
        }
        let previous = self
            .bytes_per_file
            .insert(progress.file_id, progress.bytes_sent)
            .unwrap_or(0);
        let delta = progress.bytes_sent.saturating_sub(previous);
        if delta > 0 {
            self.sent_bytes += delta;
            self.speed.add_sample(delta);
        }

        let batch = self.in_flight.get_mut(&index)?;
        batch.fractions.insert(progress.file_id, progress.fraction);
        self.transfer_update(self.counts_status())
    }

    pub fn outcome(&mut self, outcome: &TransferOutcome) -> Option<ProgressSnapshot> {
        self.resolved.insert(outcome.file_id);
        self.processed = (self.processed + 1).min(self.total);
        if outcome.is_success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.bytes_per_file.remove(&outcome.file_id);
        if let Some(batch) = self.in_flight.get_mut(&(outcome.file_id / self.batch_size)) {
            batch.fractions.remove(&outcome.file_id);
            batch.resolved += 1;
        }
        self.transfer_update(self.counts_status())
    }

    pub fn batch_finished(&mut self, index: usize) -> Option<ProgressSnapshot> {
        self.in_flight.remove(&index);
        self.completed_batches += 1;
        self.transfer_update(format!("Batch {}/{} completed", index + 1, self.total_batches))
    }

    /// A dead batch: `unresolved` of its files will never report.
    pub fn batch_aborted(&mut self, index: usize, unresolved: usize) -> Option<ProgressSnapshot> {
        self.processed = (self.processed + unresolved).min(self.total);
        self.failed += unresolved;
        self.in_flight.remove(&index);
        self.completed_batches += 1;
        self.transfer_update("Batch error occurred, continuing...".to_string())
    }

    pub fn finalizing(&mut self) -> Option<ProgressSnapshot> {
        self.percentage = self.percentage.max(TRANSFER_SPAN);
        let status = self.counts_status();
        self.emit("Finalizing...", status, false)
    }

    /// Always shown, bypassing the throttle.
    pub fn complete(&mut self, status: String) -> ProgressSnapshot {
        self.percentage = 100.0;
        self.throttle.last = Some(Instant::now());
        self.snapshot("Upload complete", status)
    }

    fn transfer_update(&mut self, status: String) -> Option<ProgressSnapshot> {
        let computed = self.transfer_percentage();
        self.percentage = self.percentage.max(computed).min(TRANSFER_SPAN);
        self.emit("Uploading", status, true)
    }

    /// `(completed + Σ in-flight batch fractions) * 90 / batches`.
    fn transfer_percentage(&self) -> f64 {
        if self.total_batches == 0 {
            return 0.0;
        }
        let per_batch = TRANSFER_SPAN / self.total_batches as f64;
        let current: f64 = self.in_flight.values().map(BatchProgress::fraction).sum();
        (self.completed_batches as f64 + current) * per_batch
    }

    fn emit(&mut self, label: &str, status: String, with_speed: bool) -> Option<ProgressSnapshot> {
        if !self.throttle.admit(self.percentage) {
            return None;
        }
        let status = match self.speed.bytes_per_second() {
            rate if with_speed && rate > 0.0 => {
                let remaining = self.total_bytes.saturating_sub(self.sent_bytes);
                match self.speed.eta(remaining) {
                    Some(eta) if remaining > 0 => format!(
                        "{status} ({}/s, {}s left)",
                        format_bytes(rate),
                        eta.as_secs()
                    ),
                    _ => format!("{status} ({}/s)", format_bytes(rate)),
                }
            }
            _ => status,
        };
        Some(self.snapshot(label, status))
    }

    fn snapshot(&self, label: &str, status: String) -> ProgressSnapshot {
        ProgressSnapshot {
            label: label.to_string(),
            percentage: self.percentage,
            processed: self.processed,
            total: self.total,
            status,
        }
    }

    fn counts_status(&self) -> String {
        let mut status = format!("{}/{} files", self.processed, self.total);
        if self.failed > 0 {
            status.push_str(&format!(
                ": {} successful, {} failed",
                self.successful, self.failed
            ));
        }
        status
    }
}

pub(crate) fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileup_transfer::{ErrorKind, FileDescriptor};
    use std::sync::Arc;

    fn outcome(file_id: usize, ok: bool) -> TransferOutcome {
        let file = Arc::new(FileDescriptor::from_bytes(format!("f{file_id}"), &b"x"[..]));
        if ok {
            TransferOutcome::succeeded(file_id, file)
        } else {
            TransferOutcome::failed(file_id, file, ErrorKind::Network)
        }
    }

    fn bytes(file_id: usize, fraction: f64) -> ByteProgress {
        ByteProgress {
            file_id,
            bytes_sent: (fraction * 1000.0) as u64,
            fraction,
        }
    }

    fn unthrottled(total: usize, batch_size: usize) -> ProgressAggregator {
        ProgressAggregator::new(total, batch_size, Duration::ZERO)
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_admits_first_then_interval() {
        let mut throttle = Throttle::new(Duration::from_millis(250));
        assert!(throttle.admit(1.0));
        assert!(!throttle.admit(2.0));
        tokio::time::advance(Duration::from_millis(249)).await;
        assert!(!throttle.admit(3.0));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(throttle.admit(4.0));
        assert!(throttle.admit(100.0));
        throttle.reset();
        assert!(throttle.admit(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_events_is_rate_limited() {
        let mut agg = ProgressAggregator::new(1000, 1000, Duration::from_millis(250));
        let mut shown = Vec::new();

        if let Some(s) = agg.batch_started(0, 1000) {
            shown.push(s);
        }
        for i in 0..1000 {
            tokio::time::advance(Duration::from_micros(250)).await;
            if let Some(s) = agg.byte_progress(&bytes(i, 0.5)) {
                shown.push(s);
            }
        }
        shown.extend(agg.finalizing());
        shown.push(agg.complete("done".into()));

        // First update, at most one throttled update, then 100%.
        assert!(shown.len() <= 3, "shown {} updates", shown.len());
        assert_eq!(shown.last().unwrap().percentage, 100.0);
    }

    #[test]
    fn single_batch_fractions() {
        let mut agg = unthrottled(4, 4);
        agg.batch_started(0, 4);

        let s = agg.byte_progress(&bytes(0, 0.5)).unwrap();
        assert!((s.percentage - 90.0 * 0.5 / 4.0).abs() < 1e-9);

        agg.outcome(&outcome(0, true));
        let s = agg.byte_progress(&bytes(1, 0.5)).unwrap();
        assert!((s.percentage - 90.0 * 1.5 / 4.0).abs() < 1e-9);
        assert_eq!(s.processed, 1);
    }

    #[test]
    fn byte_report_after_outcome_is_ignored() {
        let mut agg = unthrottled(4, 4);
        agg.batch_started(0, 4);
        let s = agg.outcome(&outcome(0, true)).unwrap();
        assert!((s.percentage - 22.5).abs() < 1e-9);

        assert!(agg.byte_progress(&bytes(0, 1.0)).is_none());
        assert!((agg.percentage() - 22.5).abs() < 1e-9);
        assert_eq!(agg.sent_bytes, 0);

        let s = agg.byte_progress(&bytes(1, 0.5)).unwrap();
        assert!((s.percentage - 90.0 * 1.5 / 4.0).abs() < 1e-9);
        assert_eq!(s.processed, 1);
    }

    #[test]
    fn byte_report_for_closed_batch_is_ignored() {
        let mut agg = unthrottled(4, 2);
        agg.batch_started(0, 2);
        agg.outcome(&outcome(0, true));
        agg.batch_aborted(0, 1);
        let before = agg.percentage();

        assert!(agg.byte_progress(&bytes(1, 0.7)).is_none());
        assert_eq!(agg.percentage(), before);
        assert_eq!(agg.sent_bytes, 0);
    }

    #[test]
    fn completed_batches_weight_equally() {
        let mut agg = unthrottled(10, 5);
        agg.batch_started(0, 5);
        for id in 0..5 {
            agg.outcome(&outcome(id, true));
        }
        let s = agg.batch_finished(0).unwrap();
        assert!((s.percentage - 45.0).abs() < 1e-9);

        agg.batch_started(1, 5);
        let s = agg.outcome(&outcome(5, false)).unwrap();
        assert!((s.percentage - 45.0 - 9.0).abs() < 1e-9);
        assert!(s.status.contains("1 failed"));
    }

    #[test]
    fn concurrent_batches_sum() {
        let mut agg = unthrottled(20, 10);
        agg.batch_started(0, 10);
        agg.batch_started(1, 10);
        agg.outcome(&outcome(0, true));
        let s = agg.outcome(&outcome(10, true)).unwrap();
        assert!((s.percentage - 2.0 * 0.1 * 45.0).abs() < 1e-9);
    }

    #[test]
    fn percentage_never_decreases_and_caps_at_90() {
        let mut agg = unthrottled(2, 2);
        agg.batch_started(0, 2);
        let high = agg.byte_progress(&bytes(0, 0.9)).unwrap().percentage;
        // A late, smaller report for the same file must not pull the bar back.
        let low = agg.byte_progress(&bytes(0, 0.1)).unwrap().percentage;
        assert!(low >= high);

        agg.outcome(&outcome(0, true));
        agg.outcome(&outcome(1, true));
        let s = agg.batch_finished(0).unwrap();
        assert_eq!(s.percentage, 90.0);

        assert_eq!(agg.finalizing().unwrap().percentage, 90.0);
        assert_eq!(agg.complete("ok".into()).percentage, 100.0);
    }

    #[test]
    fn aborted_batch_counts_as_done() {
        let mut agg = unthrottled(4, 2);
        agg.batch_started(0, 2);
        agg.outcome(&outcome(0, true));
        let s = agg.batch_aborted(0, 1).unwrap();
        assert_eq!(s.processed, 2);
        assert!((s.percentage - 45.0).abs() < 1e-9);
    }

    #[test]
    fn reset_starts_from_zero() {
        let mut agg = unthrottled(1, 1);
        agg.batch_started(0, 1);
        agg.outcome(&outcome(0, true));
        agg.batch_finished(0);
        agg.complete("done".into());
        assert_eq!(agg.percentage(), 100.0);

        agg.reset(3);
        assert_eq!(agg.percentage(), 0.0);
        let s = agg.scan_progress(3).unwrap();
        assert_eq!(s.percentage, 0.0);
        assert_eq!(s.status, "Found 3 files");
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(1536.0), "1.5 KB");
        assert_eq!(format_bytes(5.0 * 1024.0 * 1024.0), "5.0 MB");
    }
}
