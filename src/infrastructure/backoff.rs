//! Error Backoff
//!
//! Self-disables remote lookups after repeated transport failures.
//!
//! # States
//! - Healthy: requests go to the network
//! - Backoff: requests are short-circuited until the deadline passes
//!
//! # State Transitions
//! ```text
//! Healthy → Backoff: consecutive failures reach the threshold
//! Backoff → Healthy: deadline elapsed, or manual reset
//! ```
//!
//! A successful transfer resets the consecutive failure count.

use std::fmt;
use std::time::{Duration, Instant};

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Consecutive transport failures that engage backoff
    pub error_threshold: u32,
    /// How long requests stay short-circuited
    pub backoff_duration: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            error_threshold: 10,
            backoff_duration: Duration::from_secs(300),
        }
    }
}

/// Backoff state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffState {
    /// Normal operation - requests allowed
    #[default]
    Healthy,
    /// Backend assumed unavailable until the deadline
    Backoff { until: Instant },
}

impl fmt::Display for BackoffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffState::Healthy => write!(f, "healthy"),
            BackoffState::Backoff { until } => {
                let remaining = until.saturating_duration_since(Instant::now());
                write!(f, "backoff ({}s left)", remaining.as_secs())
            }
        }
    }
}

/// Consecutive-failure tracker with a timed backoff.
#[derive(Debug)]
pub struct ErrorBackoff {
    config: BackoffConfig,
    consecutive_errors: u32,
    state: BackoffState,
}

impl ErrorBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            consecutive_errors: 0,
            state: BackoffState::Healthy,
        }
    }

    /// Check whether a request may go to the network.
    ///
    /// An elapsed deadline lifts the backoff and clears the error count.
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            BackoffState::Healthy => true,
            BackoffState::Backoff { until } => {
                if Instant::now() >= until {
                    self.consecutive_errors = 0;
                    self.state = BackoffState::Healthy;
                    tracing::info!("lookup backoff elapsed, re-enabling remote lookups");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a transfer that reached the backend successfully.
    pub fn record_success(&mut self) {
        if self.state == BackoffState::Healthy {
            self.consecutive_errors = 0;
        }
    }

    /// Record a transport failure.
    ///
    /// Returns true when this failure engaged the backoff.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);

        if self.state == BackoffState::Healthy
            && self.consecutive_errors >= self.config.error_threshold
        {
            self.state = BackoffState::Backoff {
                until: Instant::now() + self.config.backoff_duration,
            };
            tracing::warn!(
                "lookup backoff engaged after {} consecutive failures for {:?}",
                self.consecutive_errors,
                self.config.backoff_duration
            );
            return true;
        }
        false
    }

    /// Clear the error count and lift any backoff immediately.
    pub fn reset(&mut self) {
        if let BackoffState::Backoff { .. } = self.state {
            tracing::info!("lookup backoff manually reset");
        }
        self.consecutive_errors = 0;
        self.state = BackoffState::Healthy;
    }

    pub fn state(&self) -> BackoffState {
        self.state
    }

    pub fn is_engaged(&self) -> bool {
        matches!(self.state, BackoffState::Backoff { .. })
    }

    /// When the current backoff ends, if one is engaged.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            BackoffState::Healthy => None,
            BackoffState::Backoff { until } => Some(until),
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}

impl Default for ErrorBackoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(threshold: u32, duration: Duration) -> ErrorBackoff {
        ErrorBackoff::new(BackoffConfig {
            error_threshold: threshold,
            backoff_duration: duration,
        })
    }

    #[test]
    fn test_config_default() {
        let config = BackoffConfig::default();
        assert_eq!(config.error_threshold, 10);
        assert_eq!(config.backoff_duration, Duration::from_secs(300));
    }

    #[test]
    fn test_initially_healthy() {
        let mut b = ErrorBackoff::default();
        assert_eq!(b.state(), BackoffState::Healthy);
        assert!(b.allow_request());
        assert_eq!(b.deadline(), None);
    }

    #[test]
    fn test_engages_at_threshold() {
        let mut b = backoff(3, Duration::from_secs(60));

        assert!(!b.record_failure());
        assert!(!b.record_failure());
        assert!(b.allow_request());

        assert!(b.record_failure());
        assert!(b.is_engaged());
        assert!(!b.allow_request());
        assert!(b.deadline().is_some());
    }

    #[test]
    fn test_failures_while_engaged_do_not_rearm() {
        let mut b = backoff(1, Duration::from_secs(60));
        assert!(b.record_failure());
        let deadline = b.deadline();

        assert!(!b.record_failure());
        assert_eq!(b.deadline(), deadline);
        assert_eq!(b.consecutive_errors(), 2);
    }

    #[test]
    fn test_success_resets_count() {
        let mut b = backoff(3, Duration::from_secs(60));
        b.record_failure();
        b.record_failure();
        b.record_success();
        assert_eq!(b.consecutive_errors(), 0);

        b.record_failure();
        b.record_failure();
        assert!(!b.is_engaged());
    }

    #[test]
    fn test_success_does_not_lift_backoff() {
        let mut b = backoff(1, Duration::from_secs(60));
        b.record_failure();
        b.record_success();
        assert!(b.is_engaged());
        assert!(!b.allow_request());
    }

    #[test]
    fn test_deadline_lifts_backoff() {
        let mut b = backoff(1, Duration::from_millis(10));
        b.record_failure();
        assert!(!b.allow_request());

        std::thread::sleep(Duration::from_millis(20));

        assert!(b.allow_request());
        assert_eq!(b.state(), BackoffState::Healthy);
        assert_eq!(b.consecutive_errors(), 0);
    }

    #[test]
    fn test_manual_reset() {
        let mut b = backoff(2, Duration::from_secs(60));
        b.record_failure();
        b.record_failure();
        assert!(b.is_engaged());

        b.reset();
        assert!(!b.is_engaged());
        assert_eq!(b.consecutive_errors(), 0);
        assert!(b.allow_request());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(BackoffState::Healthy.to_string(), "healthy");
        let state = BackoffState::Backoff {
            until: Instant::now() + Duration::from_secs(120),
        };
        assert!(state.to_string().starts_with("backoff ("));
    }
}
