use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_CEILING: Duration = Duration::from_secs(30);

/// Capped exponential backoff for reconnection campaigns.
///
/// Attempt `n` waits `min(unit * 2^n, ceiling)`, attempts past `max_retries` are
/// never made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub unit: Duration,
    pub ceiling: Duration,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(1),
            ceiling: DEFAULT_CEILING,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl BackoffPolicy {
    /// The wait before attempt number `attempt`, counting from one.
    pub fn wait(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor).min(self.ceiling)
    }

    /// Whether a campaign may still make attempt number `attempt`.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        let waits: Vec<u64> = (1..=5).map(|n| policy.wait(n).as_secs()).collect();

        assert_eq!(waits, [2, 4, 8, 16, 30]);
    }

    #[test]
    fn test_wait_never_exceeds_ceiling() {
        let policy = BackoffPolicy::default();

        for attempt in 1..=64 {
            assert!(policy.wait(attempt) <= DEFAULT_CEILING);
        }
        assert_eq!(policy.wait(u32::MAX), DEFAULT_CEILING);
    }

    #[test]
    fn test_sixth_attempt_is_not_allowed() {
        let policy = BackoffPolicy::default();

        assert!(policy.allows(5));
        assert!(!policy.allows(6));
    }

    #[test]
    fn test_scaled_unit_keeps_the_shape() {
        let policy = BackoffPolicy {
            unit: Duration::from_millis(1),
            ceiling: Duration::from_millis(30),
            max_retries: 5,
        };

        assert_eq!(policy.wait(1), Duration::from_millis(2));
        assert_eq!(policy.wait(5), Duration::from_millis(30));
    }
}
