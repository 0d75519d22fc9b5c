//! Automatic retry policy for the push channel.

use std::time::Duration;

/// Default number of automatic reconnection attempts
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default fixed delay between attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Whether the channel retries on its own at all.
    pub enabled: bool,
    /// Maximum number of consecutive attempts.
    pub attempts: u32,
    /// Delay before each attempt.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: DEFAULT_RECONNECT_ATTEMPTS,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Check if the given 1-based attempt may run.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && attempt <= self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_should_retry_is_bounded() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(5));
        assert!(!policy.should_retry(6));
    }

    #[test]
    fn test_disabled_never_retries() {
        let policy = ReconnectPolicy::disabled();
        assert!(!policy.should_retry(1));
    }
}
