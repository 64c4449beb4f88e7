//! Period and timeout for a single wait.

use std::time::Duration;

use thiserror::Error;

/// How often to check and how long to keep checking.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Minimum spacing between two checks.
    pub period: Duration,
    /// Total time budget for the wait.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(period: Duration, timeout: Duration) -> Self {
        Self { period, timeout }
    }

    /// Creates a policy from millisecond values.
    #[must_use]
    pub const fn from_millis(period_ms: u64, timeout_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(period_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    /// Upper bound on the number of checks a wait under this policy performs.
    #[must_use]
    pub fn max_attempts(&self) -> u128 {
        let period = self.period.as_nanos().max(1);
        self.timeout.as_nanos().div_ceil(period).saturating_add(1)
    }

    /// Rejects policies that would poll forever or spin.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ZeroTimeout`] or [`PolicyError::ZeroPeriod`].
    pub const fn validate(&self) -> Result<(), PolicyError> {
        if self.timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        if self.period.is_zero() {
            return Err(PolicyError::ZeroPeriod);
        }
        Ok(())
    }

    /// Like [`PollPolicy::validate`], additionally requiring the timeout to
    /// exceed `minimum`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::TimeoutTooShort`] when the timeout is not
    /// strictly greater than `minimum`.
    pub fn validate_with_minimum(&self, minimum: Duration) -> Result<(), PolicyError> {
        self.validate()?;
        if self.timeout <= minimum {
            return Err(PolicyError::TimeoutTooShort {
                minimum,
                actual: self.timeout,
            });
        }
        Ok(())
    }
}

/// Configuration errors for [`PollPolicy`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PolicyError {
    /// Raised when the timeout is zero.
    #[error("poll timeout must be greater than zero")]
    ZeroTimeout,
    /// Raised when the period is zero.
    #[error("poll period must be greater than zero")]
    ZeroPeriod,
    /// Raised when the timeout does not exceed the required minimum.
    #[error("poll timeout {actual:?} must be greater than {minimum:?}")]
    TimeoutTooShort {
        /// Exclusive lower bound.
        minimum: Duration,
        /// Configured timeout.
        actual: Duration,
    },
}
