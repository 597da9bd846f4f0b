use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Byte-level progress of one transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ByteProgress {
    /// Position of the file in the session's flat list.
    pub file_id: usize,
    /// Cumulative bytes handed to the transport.
    pub bytes_sent: u64,
    /// `bytes_sent / byte_size`, in `[0, 1]`. Zero-byte files report 1.0.
    pub fraction: f64,
}

/// Per-transfer progress channel.
///
/// Cheap to clone; every clone reports for the same file. Sends never
/// block and are dropped silently once the receiving side is gone, which
/// is how a cancelled session stops listening to in-flight transfers.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    file_id: usize,
    byte_size: u64,
    tx: Option<mpsc::UnboundedSender<ByteProgress>>,
}

impl ProgressSink {
    pub fn new(file_id: usize, byte_size: u64, tx: mpsc::UnboundedSender<ByteProgress>) -> Self {
        Self {
            file_id,
            byte_size,
            tx: Some(tx),
        }
    }

    /// A sink that discards every report.
    pub fn disabled(file_id: usize, byte_size: u64) -> Self {
        Self {
            file_id,
            byte_size,
            tx: None,
        }
    }

    pub fn file_id(&self) -> usize {
        self.file_id
    }

    /// Reports the cumulative number of bytes sent so far.
    pub fn report(&self, bytes_sent: u64) {
        let Some(tx) = &self.tx else {
            return;
        };
        let fraction = if self.byte_size == 0 {
            1.0
        } else {
            (bytes_sent as f64 / self.byte_size as f64).clamp(0.0, 1.0)
        };
        let _ = tx.send(ByteProgress {
            file_id: self.file_id,
            bytes_sent,
            fraction,
        });
    }

    /// Reports the whole file as sent.
    pub fn complete(&self) {
        self.report(self.byte_size);
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
///
/// Uses `tokio::time::Instant`, so it follows a paused test clock.
pub struct SpeedCalculator {
    samples: VecDeque<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: max_samples.unwrap_or(100).max(2),
            window_size: window_size.unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Records `bytes` transferred at the current instant.
    pub fn add_sample(&mut self, bytes: u64) {
        let now = Instant::now();
        self.samples.push_back(SpeedSample {
            bytes,
            timestamp: now,
        });

        while let Some(front) = self.samples.front() {
            if now.duration_since(front.timestamp) > self.window_size {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// Returns 0.0 with fewer than 2 samples or no elapsed time.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        // The first sample marks the window start; its bytes were sent before it.
        let total: u64 = self.samples.iter().skip(1).map(|s| s.bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }
}
