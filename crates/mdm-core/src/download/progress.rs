//! Progress reporting for downloads (bytes received, rate, ETA).
//!
//! Built from transport progress events and the attempt's start time; used
//! only for display, never for control decisions.

use std::time::Duration;

/// Snapshot of download progress for one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStats {
    /// Bytes received so far in the current attempt.
    pub bytes_done: u64,
    /// Total size, if the server announced one.
    pub total_bytes: Option<u64>,
    /// Elapsed time since the attempt started (seconds).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    pub fn new(bytes_done: u64, total_bytes: Option<u64>, elapsed: Duration) -> Self {
        Self {
            bytes_done,
            total_bytes,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    /// Average rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if total is unknown or rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let total = self.total_bytes?;
        let remaining = total.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0], if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total_bytes?;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.bytes_done as f64 / total as f64).min(1.0))
    }
}
