use std::collections::HashMap;

/// Per-filename attempt counters with a fixed ceiling.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    /// Maximum number of attempts (including the first).
    max_attempts: u32,
    counters: HashMap<String, u32>,
}

impl Default for RetryTracker {
    fn default() -> Self {
        Self::new(super::DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryTracker {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            counters: HashMap::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record a failure of `filename` and decide whether to try again.
    ///
    /// The counter is created at 1 on the first failure. Returns true while the
    /// counter is below the ceiling; once it reaches it the counter is dropped
    /// and the download is abandoned.
    pub fn should_retry(&mut self, filename: &str) -> bool {
        let count = self.counters.entry(filename.to_string()).or_insert(0);
        *count += 1;
        if *count < self.max_attempts {
            tracing::debug!(filename, failures = *count, "retry budget remaining");
            return true;
        }
        self.counters.remove(filename);
        false
    }

    /// True if `filename` has failed at least once and is still being retried.
    pub fn has_retry(&self, filename: &str) -> bool {
        self.counters.contains_key(filename)
    }

    /// Failures recorded so far for `filename` (0 if none).
    pub fn failures(&self, filename: &str) -> u32 {
        self.counters.get(filename).copied().unwrap_or(0)
    }

    /// Forget `filename` (success, cancel, or permanent abandonment).
    pub fn clear_retry(&mut self, filename: &str) {
        self.counters.remove(filename);
    }
}
