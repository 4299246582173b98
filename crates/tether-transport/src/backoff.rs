//! Exponential backoff for RPC retries.
//!
//! Contract: the first delay is clamped to [2, 32] seconds (or taken from a
//! `Retry-After` hint), each successive delay is the square of the previous
//! one, and every delay is capped at 300 seconds.

use std::time::Duration;

/// Floor for a computed delay, seconds.
pub const MIN_DELAY_SECS: f64 = 2.0;

/// Ceiling for the first computed delay, seconds.
pub const INITIAL_MAX_DELAY_SECS: f64 = 32.0;

/// Absolute ceiling, seconds.
pub const MAX_DELAY_SECS: f64 = 300.0;

/// Divisor for the random stagger added on top of a delay.
const STAGGER_FACTOR: u32 = 10;

/// Retry delay tracker for one batch of commands.
#[derive(Debug, Default)]
pub struct Backoff {
    current_secs: Option<f64>,
}

impl Backoff {
    /// Create a fresh backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay to wait before the next attempt, after a failure.
    ///
    /// A `Retry-After` hint overrides the computed delay (and becomes the
    /// base for subsequent squaring).
    pub fn next_delay(&mut self, retry_after: Option<Duration>) -> Duration {
        let secs = match retry_after {
            Some(hint) => hint.as_secs_f64().min(MAX_DELAY_SECS),
            None => match self.current_secs {
                None => MIN_DELAY_SECS.clamp(MIN_DELAY_SECS, INITIAL_MAX_DELAY_SECS),
                Some(prev) => (prev * prev).clamp(MIN_DELAY_SECS, MAX_DELAY_SECS),
            },
        };
        self.current_secs = Some(secs.max(MIN_DELAY_SECS));
        Duration::from_secs_f64(secs)
    }

    /// Forget accumulated backoff (a batch-level retry discards delay).
    pub fn reset(&mut self) {
        self.current_secs = None;
    }

    /// Add a random stagger of up to one tenth of the delay, so a fleet of
    /// clients does not resubmit in lockstep.
    #[must_use]
    pub fn staggered(delay: Duration) -> Duration {
        let window = delay / STAGGER_FACTOR;
        if window.is_zero() {
            return delay;
        }
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        delay + Duration::from_nanos(u64::from(nanos) % window.as_nanos().max(1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squaring_sequence() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.next_delay(None), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(None), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(None), Duration::from_secs(16));
        assert_eq!(backoff.next_delay(None), Duration::from_secs(256));
        // Capped
        assert_eq!(backoff.next_delay(None), Duration::from_secs(300));
        assert_eq!(backoff.next_delay(None), Duration::from_secs(300));
    }

    #[test]
    fn test_retry_after_overrides() {
        let mut backoff = Backoff::new();
        assert_eq!(
            backoff.next_delay(Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        // The hint becomes the base for squaring
        assert_eq!(backoff.next_delay(None), Duration::from_secs(49));
    }

    #[test]
    fn test_retry_after_zero_floors_next() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.next_delay(Some(Duration::ZERO)), Duration::ZERO);
        // The base never drops below the floor
        assert_eq!(backoff.next_delay(None), Duration::from_secs(4));
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut backoff = Backoff::new();
        backoff.next_delay(None);
        backoff.next_delay(None);
        backoff.reset();
        assert_eq!(backoff.next_delay(None), Duration::from_secs(2));
    }

    #[test]
    fn test_stagger_bounded() {
        let delay = Duration::from_secs(10);
        let staggered = Backoff::staggered(delay);
        assert!(staggered >= delay);
        assert!(staggered <= delay + delay / 10);
    }
}
