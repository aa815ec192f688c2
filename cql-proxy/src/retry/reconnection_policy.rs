use derive_more::Constructor;
#[cfg(test)]
use mockall::automock;
use rand::{rng, Rng};
use std::time::Duration;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

const JITTER_MIN_MS: u64 = 85;
const JITTER_MAX_MS: u64 = 115;

/// Determines the time for the next reconnection attempt when trying to reconnect to a node.
pub trait ReconnectionSchedule {
    /// Returns next reconnect delay or `None` if not attempt should be made.
    fn next_delay(&mut self) -> Option<Duration>;

    /// Starts over after a successful connection.
    fn reset(&mut self);
}

/// Creates reconnection schedules when trying to re-establish connections.
#[cfg_attr(test, automock)]
pub trait ReconnectionPolicy {
    /// Creates new schedule when a connection needs to be re-established.
    fn new_node_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync>;
}

/// Schedules reconnection at constant interval.
#[derive(Copy, Clone, Constructor, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct ConstantReconnectionPolicy {
    base_delay: Duration,
}

impl Default for ConstantReconnectionPolicy {
    fn default() -> Self {
        ConstantReconnectionPolicy::new(DEFAULT_BASE_DELAY)
    }
}

impl ReconnectionPolicy for ConstantReconnectionPolicy {
    fn new_node_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync> {
        Box::new(ConstantReconnectionSchedule::new(self.base_delay))
    }
}

#[derive(Constructor)]
struct ConstantReconnectionSchedule {
    base_delay: Duration,
}

impl ReconnectionSchedule for ConstantReconnectionSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        Some(self.base_delay)
    }

    fn reset(&mut self) {}
}

/// Never schedules reconnections.
#[derive(Default, Copy, Clone, Debug, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct NeverReconnectionPolicy;

impl ReconnectionPolicy for NeverReconnectionPolicy {
    fn new_node_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync> {
        Box::new(NeverReconnectionSchedule)
    }
}

struct NeverReconnectionSchedule;

impl ReconnectionSchedule for NeverReconnectionSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}

/// A reconnection policy that waits exponentially longer between each reconnection attempt,
/// keeping a constant delay once the maximum is reached. Every attempt adds 85-115ms of jitter.
/// Each schedule counts its own attempts, so slots of a pool back off independently.
#[derive(Copy, Clone, Constructor, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct ExponentialReconnectionPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl ReconnectionPolicy for ExponentialReconnectionPolicy {
    fn new_node_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync> {
        Box::new(ExponentialReconnectionSchedule::new(
            self.base_delay,
            self.max_delay,
        ))
    }
}

impl Default for ExponentialReconnectionPolicy {
    fn default() -> Self {
        ExponentialReconnectionPolicy::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

struct ExponentialReconnectionSchedule {
    base_delay: Duration,
    max_delay: Duration,
    attempts: u32,
}

impl ReconnectionSchedule for ExponentialReconnectionSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        let backoff = 1u64.checked_shl(self.attempts).unwrap_or(u64::MAX);
        self.attempts = self.attempts.saturating_add(1);

        let jitter = rng().random_range(JITTER_MIN_MS..=JITTER_MAX_MS);

        Some(
            self.base_delay
                .saturating_add(Duration::from_millis(backoff.saturating_add(jitter)))
                .min(self.max_delay),
        )
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl ExponentialReconnectionSchedule {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        ExponentialReconnectionSchedule {
            base_delay,
            max_delay,
            attempts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(base: Duration, attempt: u32) -> (Duration, Duration) {
        let backoff = Duration::from_millis(1 << attempt);
        (
            base + backoff + Duration::from_millis(JITTER_MIN_MS),
            base + backoff + Duration::from_millis(JITTER_MAX_MS),
        )
    }

    #[test]
    fn should_grow_exponentially_with_jitter() {
        let base = Duration::from_millis(100);
        let mut schedule = ExponentialReconnectionSchedule::new(base, Duration::from_secs(3600));

        let mut previous_min = Duration::ZERO;
        for attempt in 0..16 {
            let delay = schedule.next_delay().unwrap();
            let (min, max) = bounds(base, attempt);

            assert!(delay >= min && delay <= max, "{delay:?} not in {min:?}..={max:?}");
            assert!(min >= previous_min);
            previous_min = min;
        }
    }

    #[test]
    fn should_cap_at_max_delay() {
        let max_delay = Duration::from_secs(2);
        let mut schedule = ExponentialReconnectionSchedule::new(Duration::from_secs(1), max_delay);

        for _ in 0..100 {
            assert!(schedule.next_delay().unwrap() <= max_delay);
        }

        assert_eq!(schedule.next_delay(), Some(max_delay));
    }

    #[test]
    fn should_reach_max_exponential_delay_without_panic() {
        let mut schedule = ExponentialReconnectionSchedule {
            base_delay: Duration::MAX,
            max_delay: Duration::MAX,
            attempts: u32::MAX - 1,
        };

        assert_eq!(schedule.next_delay(), Some(Duration::MAX));
        assert_eq!(schedule.next_delay(), Some(Duration::MAX));
    }

    #[test]
    fn should_restart_after_reset() {
        let base = Duration::from_millis(10);
        let mut schedule = ExponentialReconnectionSchedule::new(base, Duration::from_secs(3600));
        for _ in 0..10 {
            schedule.next_delay();
        }

        schedule.reset();

        let (min, max) = bounds(base, 0);
        let delay = schedule.next_delay().unwrap();
        assert!(delay >= min && delay <= max);
    }

    #[test]
    fn should_count_attempts_per_schedule() {
        let policy = ExponentialReconnectionPolicy::new(Duration::ZERO, Duration::from_secs(3600));
        let mut first = policy.new_node_schedule();
        let mut second = policy.new_node_schedule();

        for _ in 0..12 {
            first.next_delay();
        }

        assert!(first.next_delay().unwrap() >= Duration::from_millis(1 << 12));
        assert!(second.next_delay().unwrap() <= Duration::from_millis(1 + JITTER_MAX_MS));
    }

    #[test]
    fn should_never_reconnect() {
        assert_eq!(NeverReconnectionPolicy.new_node_schedule().next_delay(), None);
    }
}
