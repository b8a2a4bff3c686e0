use chrono::{DateTime, Utc};
use std::time::Duration;

/// Retry budget and exponential backoff schedule for failed remote attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
        }
    }

    /// `min(base_delay * 2^(attempt-1), max_delay)`; attempt 0 has no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max_delay.as_millis().min(u128::from(u64::MAX)) as u64;
        let factor = 1_u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(factor).min(max_ms);
        Duration::from_millis(delay_ms)
    }

    pub fn next_attempt_at(&self, now: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
        let delay = self.delay_for_attempt(retry_count);
        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(300), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_cap() {
        let policy = RetryPolicy::new(Duration::from_millis(500), Duration::from_secs(3), 10);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(3_000));
    }

    #[test]
    fn large_attempts_saturate_at_cap() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 200);
        assert_eq!(policy.delay_for_attempt(64), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn exhaustion_matches_budget() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(8), 3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn next_attempt_is_offset_by_delay() {
        let policy = RetryPolicy::new(Duration::from_secs(4), Duration::from_secs(60), 3);
        let now = Utc::now();
        assert_eq!(
            policy.next_attempt_at(now, 2),
            now + chrono::Duration::seconds(8)
        );
    }
}
