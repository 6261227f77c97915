//! Retry with exponential backoff and optional jitter.

use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Spread each delay over 75%–125% of its nominal value.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Nominal delay after the failed attempt numbered `attempt` (0-based),
    /// before jitter. Grows geometrically and is capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let secs = (self.initial_backoff.as_secs_f64() * factor).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay actually slept after `attempt`, jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.backoff_for(attempt);
        if !self.jitter {
            return nominal;
        }
        let jitter_factor = 0.75 + (rand_factor() * 0.5);
        Duration::from_secs_f64(nominal.as_secs_f64() * jitter_factor)
    }
}

/// Simple pseudo-random factor [0, 1) without pulling in rand crate.
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    let hash = hasher.finish();
    (hash % 10000) as f64 / 10000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(3),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(policy.backoff_for(0), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(3));
        assert_eq!(policy.delay_for(5), Duration::from_secs(3));
    }

    #[test]
    fn jitter_stays_within_a_quarter_of_nominal() {
        let policy = RetryPolicy::default();
        for attempt in 0..4 {
            let nominal = policy.backoff_for(attempt).as_secs_f64();
            let actual = policy.delay_for(attempt).as_secs_f64();
            assert!(actual >= nominal * 0.75 && actual <= nominal * 1.25);
        }
    }
}
