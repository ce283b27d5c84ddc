// ABOUTME: Exponential backoff for bridge reconnection attempts.
// ABOUTME: Retries with 2s, 4s, 8s... capped at 30s, flat thereafter.

use std::time::Duration;

/// Backoff configuration for socket reconnection
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Starting delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier applied to delay after each failure
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

/// Tracks reconnection state with exponential backoff
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    consecutive_failures: u32,
    current_delay: Duration,
}

impl BackoffState {
    /// Create a new backoff state with the given config
    pub fn new(config: BackoffConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            consecutive_failures: 0,
            current_delay,
        }
    }

    /// Record a successful connection (resets backoff)
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.config.initial_delay;
    }

    /// Record a failure and return the delay before the next retry
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures += 1;

        let delay = self.current_delay;

        // Next delay grows exponentially, capped at max_delay
        self.current_delay = std::cmp::min(
            self.current_delay * self.config.multiplier,
            self.config.max_delay,
        );

        delay
    }

    /// Get the number of consecutive failures
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Get the delay that would be used on the next failure
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_config() {
        let config = BackoffConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(2));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.multiplier, 2);
    }

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut state = BackoffState::default();

        // 2s, 4s, 8s, 16s
        assert_eq!(state.record_failure(), Duration::from_secs(2));
        assert_eq!(state.record_failure(), Duration::from_secs(4));
        assert_eq!(state.record_failure(), Duration::from_secs(8));
        assert_eq!(state.record_failure(), Duration::from_secs(16));

        // Fifth failure: capped at 30s (not 32s)
        assert_eq!(state.record_failure(), Duration::from_secs(30));

        // Flat at 30s thereafter
        assert_eq!(state.record_failure(), Duration::from_secs(30));
        assert_eq!(state.record_failure(), Duration::from_secs(30));

        assert_eq!(state.consecutive_failures(), 7);
    }

    #[test]
    fn test_delays_never_decrease() {
        let mut state = BackoffState::default();
        let mut previous = Duration::ZERO;
        for _ in 0..20 {
            let delay = state.record_failure();
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(30));
            previous = delay;
        }
    }

    #[test]
    fn test_success_resets_backoff() {
        let mut state = BackoffState::default();

        state.record_failure();
        state.record_failure();
        state.record_failure();
        assert_eq!(state.consecutive_failures(), 3);

        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.current_delay(), Duration::from_secs(2));

        // Next failure starts from the initial delay again
        assert_eq!(state.record_failure(), Duration::from_secs(2));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = BackoffConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 3,
        };
        let mut state = BackoffState::new(config);

        assert_eq!(state.record_failure(), Duration::from_secs(1));
        assert_eq!(state.record_failure(), Duration::from_secs(3));
        assert_eq!(state.record_failure(), Duration::from_secs(9));
        // Capped, not 27s
        assert_eq!(state.record_failure(), Duration::from_secs(10));
        assert_eq!(state.record_failure(), Duration::from_secs(10));
    }
}
