//! Minimum spacing between user-triggered retries.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Rejects retries that come sooner than `min_interval` after the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_interval: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(30);

    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    /// Decide whether a retry at `now` is allowed.
    pub fn check(&self, last_retry: Option<Instant>, now: Instant) -> Result<(), RetryRejected> {
        let Some(last) = last_retry else {
            return Ok(());
        };
        let ready_at = last + self.min_interval;
        if now >= ready_at {
            Ok(())
        } else {
            Err(RetryRejected {
                remaining: ready_at - now,
            })
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_INTERVAL)
    }
}

/// A retry that came too early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRejected {
    pub remaining: Duration,
}

impl RetryRejected {
    /// Remaining wait in whole seconds, rounded up.
    pub fn remaining_secs(&self) -> u64 {
        let secs = self.remaining.as_millis().div_ceil(1000).max(1);
        u64::try_from(secs).unwrap_or(u64::MAX)
    }

    /// User-facing wait message.
    pub fn message(&self) -> String {
        format!(
            "Please wait {} before trying again.",
            format_wait(self.remaining_secs())
        )
    }
}

impl fmt::Display for RetryRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for RetryRejected {}

fn unit(n: u64, singular: &str) -> String {
    if n == 1 {
        format!("1 {singular}")
    } else {
        format!("{n} {singular}s")
    }
}

fn format_wait(secs: u64) -> String {
    let (minutes, seconds) = (secs / 60, secs % 60);
    match (minutes, seconds) {
        (0, s) => unit(s, "second"),
        (m, 0) => unit(m, "minute"),
        (m, s) => format!("{} {}", unit(m, "minute"), unit(s, "second")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_is_always_allowed() {
        let policy = RetryPolicy::default();
        assert!(policy.check(None, Instant::now()).is_ok());
    }

    #[test]
    fn early_retry_reports_remaining_rounded_up() {
        let policy = RetryPolicy::new(Duration::from_secs(30));
        let last = Instant::now();
        let err = policy
            .check(Some(last), last + Duration::from_millis(10_400))
            .unwrap_err();
        assert_eq!(err.remaining, Duration::from_millis(19_600));
        assert_eq!(err.remaining_secs(), 20);
        assert_eq!(err.message(), "Please wait 20 seconds before trying again.");
    }

    #[test]
    fn retry_at_boundary_is_allowed() {
        let policy = RetryPolicy::new(Duration::from_secs(30));
        let last = Instant::now();
        assert!(policy.check(Some(last), last + Duration::from_secs(30)).is_ok());
        assert!(policy.check(Some(last), last + Duration::from_secs(31)).is_ok());
    }

    #[test]
    fn message_uses_minutes_when_long() {
        let policy = RetryPolicy::new(Duration::from_secs(180));
        let last = Instant::now();
        let err = policy.check(Some(last), last).unwrap_err();
        assert_eq!(err.message(), "Please wait 3 minutes before trying again.");

        let err = policy
            .check(Some(last), last + Duration::from_secs(59))
            .unwrap_err();
        assert_eq!(
            err.message(),
            "Please wait 2 minutes 1 second before trying again."
        );
    }

    #[test]
    fn sub_second_remainder_shows_one_second() {
        let err = RetryRejected {
            remaining: Duration::from_millis(1),
        };
        assert_eq!(err.remaining_secs(), 1);
        assert_eq!(err.to_string(), "Please wait 1 second before trying again.");
    }
}
