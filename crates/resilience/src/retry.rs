use std::time::Duration;

use crate::policy::ResilienceConfig;

/// Tracks attempts for one guarded call and hands out fixed delays.
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self { attempts: 0 }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self, policy: &ResilienceConfig) -> Option<Duration> {
        if self.attempts + 1 >= policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(policy.retry_delay())
    }

    pub fn retries(&self) -> u32 {
        self.attempts
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_attempts_yield_two_delays() {
        let policy = ResilienceConfig::default();
        let mut state = RetryState::new();
        assert_eq!(state.next_delay(&policy), Some(Duration::from_secs(1)));
        assert_eq!(state.next_delay(&policy), Some(Duration::from_secs(1)));
        assert_eq!(state.next_delay(&policy), None);
        assert_eq!(state.retries(), 2);
    }

    #[test]
    fn single_attempt_never_retries() {
        let policy = ResilienceConfig {
            max_attempts: 1,
            ..ResilienceConfig::default()
        };
        assert_eq!(RetryState::new().next_delay(&policy), None);
    }
}
