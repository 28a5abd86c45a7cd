//! The in-memory generation job a session reports to its presenter.

use fitplan_db::models::GenerationStatus;
use tokio::time::Instant;

/// Ephemeral state of one session's generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationJob {
    pub status: GenerationStatus,
    /// Number of accepted user-triggered retries.
    pub retry_count: u32,
    /// When the last retry was accepted; `None` before the first.
    pub last_retry_time: Option<Instant>,
    /// Seconds since the current attempt started.
    pub elapsed_seconds: u64,
}

impl GenerationJob {
    pub fn new() -> Self {
        Self {
            status: GenerationStatus::Pending,
            retry_count: 0,
            last_retry_time: None,
            elapsed_seconds: 0,
        }
    }

    /// 1-based number of the attempt currently running.
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }

    /// Reset for an accepted retry at `now`.
    pub fn begin_retry(&mut self, now: Instant) {
        self.status = GenerationStatus::Pending;
        self.retry_count += 1;
        self.elapsed_seconds = 0;
        self.last_retry_time = Some(now);
    }
}

impl Default for GenerationJob {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_retry_bumps_count_and_resets_clock() {
        let mut job = GenerationJob::new();
        job.status = GenerationStatus::Error;
        job.elapsed_seconds = 12;
        assert_eq!(job.attempt(), 1);

        let now = Instant::now();
        job.begin_retry(now);
        assert_eq!(job.status, GenerationStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.attempt(), 2);
        assert_eq!(job.elapsed_seconds, 0);
        assert_eq!(job.last_retry_time, Some(now));
    }
}
