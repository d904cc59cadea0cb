//! Rate-limit backoff for the event subscription.

use std::time::Duration;

/// Consecutive rate-limit failures and the delay they imply.
///
/// The delay before retry `n` (zero based) is `base * 2^n`. There is no upper
/// bound on the number of attempts; the delay saturates instead of
/// overflowing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffState {
    base: Duration,
    failures: u32,
}

impl BackoffState {
    pub fn new(base: Duration) -> Self {
        Self { base, failures: 0 }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay to wait after the current failure count
    pub fn next_delay(&self) -> Duration {
        let multiplier = 2u32.checked_pow(self.failures).unwrap_or(u32::MAX);
        self.base.checked_mul(multiplier).unwrap_or(Duration::MAX)
    }

    /// Record one more rate-limited attempt and return the delay before the
    /// next one
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.next_delay();
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 5)]
    #[case(1, 10)]
    #[case(2, 20)]
    #[case(3, 40)]
    #[case(6, 320)]
    fn test_delay_doubles(#[case] failures: u32, #[case] expected_secs: u64) {
        let mut state = BackoffState::new(Duration::from_secs(5));
        for _ in 0..failures {
            state.record_failure();
        }
        assert_eq!(state.next_delay(), Duration::from_secs(expected_secs));
    }

    #[test]
    fn test_record_failure_returns_delay_then_increments() {
        let mut state = BackoffState::new(Duration::from_secs(5));
        assert_eq!(state.record_failure(), Duration::from_secs(5));
        assert_eq!(state.record_failure(), Duration::from_secs(10));
        assert_eq!(state.failures(), 2);

        state.reset();
        assert_eq!(state.failures(), 0);
        assert_eq!(state.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_delay_saturates() {
        let mut state = BackoffState::new(Duration::from_secs(5));
        for _ in 0..200 {
            state.record_failure();
        }
        assert_eq!(state.next_delay(), Duration::MAX);
    }
}
