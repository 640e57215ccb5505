//! Backoff policies governing when a failed resolution may be attempted
//! again.
//!
//! A policy is stateful: each [`next_delay`](Backoff::next_delay) advances
//! it, and [`reset`](Backoff::reset) returns it to its initial state. The
//! expiring cache consults the policy after every failed resolution and
//! resets it after every success, so a policy instance belongs to exactly
//! one cache.

use std::time::Duration;

/// Strategy producing successive retry delays.
pub trait Backoff: Send {
    /// Delay to wait before the next attempt, or `None` to stop retrying.
    fn next_delay(&mut self) -> Option<Duration>;

    /// Return the policy to its initial state.
    fn reset(&mut self);
}

/// Policy used when no backoff is configured: retry immediately, forever.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NoBackoff;

impl Backoff for NoBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        Some(Duration::ZERO)
    }

    fn reset(&mut self) {}
}

/// Fixed delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for FixedBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        Some(self.delay)
    }

    fn reset(&mut self) {}
}

/// Exponential backoff: each delay is the previous one scaled by `factor`,
/// clamped to `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    factor: f32,
    max: Duration,
    next: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, factor: f32, max: Duration) -> Self {
        Self {
            initial,
            factor,
            max,
            next: initial,
        }
    }
}

impl Default for ExponentialBackoff {
    /// 100ms doubling up to 30s.
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 2.0, Duration::from_secs(30))
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.next;
        self.next = Duration::from_secs_f32(
            (self.next.as_secs_f32() * self.factor).min(self.max.as_secs_f32()),
        );
        Some(delay)
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_and_clamps() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(100), 2.0, Duration::from_millis(300));

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        // Approximate comparisons due to the f32 round-trip.
        let second = backoff.next_delay().unwrap();
        assert!((second.as_millis() as i64 - 200).abs() <= 1);
        let third = backoff.next_delay().unwrap();
        assert!((third.as_millis() as i64 - 300).abs() <= 1);
        let fourth = backoff.next_delay().unwrap();
        assert!((fourth.as_millis() as i64 - 300).abs() <= 1);
    }

    #[test]
    fn exponential_reset_restarts_the_schedule() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(50), 2.0, Duration::from_secs(1));
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn fixed_never_stops() {
        let mut backoff = FixedBackoff::new(Duration::from_secs(1));
        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
        }
    }
}
