//! Retry policy for failed or corrupted downloads.
//!
//! Counters are per destination filename and live only for the current run,
//! so a fresh start always gets a clean retry budget. Retries restart the
//! transfer from byte 0.

mod tracker;

pub use tracker::RetryTracker;

/// Default retry ceiling: attempts per filename, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
