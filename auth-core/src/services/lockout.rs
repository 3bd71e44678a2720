//! Failed-attempt counter and timed account lock.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::LockoutConfig;
use crate::models::User;
use crate::services::{AuthStore, ServiceError};

/// Outcome of evaluating a login attempt against the lockout state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutDecision {
    /// Below the threshold; proceed.
    Proceed,
    /// Threshold reached but the lock window has elapsed; reset the
    /// counter and proceed.
    ProceedAfterReset,
    /// Locked; reject with the remaining whole minutes.
    Reject { minutes_remaining: i64 },
    /// Threshold reached but no lock timestamp recorded; fail closed and
    /// start a fresh lock window.
    RejectAndLock { until: DateTime<Utc> },
}

/// Evaluate the pre-verification lockout state machine.
pub fn evaluate(
    failed_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &LockoutConfig,
) -> LockoutDecision {
    if failed_attempts < config.max_failed_attempts {
        return LockoutDecision::Proceed;
    }

    match locked_until {
        Some(until) if until > now => {
            let seconds = (until - now).num_seconds();
            LockoutDecision::Reject {
                minutes_remaining: ((seconds + 59) / 60).max(1),
            }
        }
        Some(_) => LockoutDecision::ProceedAfterReset,
        None => LockoutDecision::RejectAndLock {
            until: now + Duration::minutes(config.lockout_minutes),
        },
    }
}

/// Store-backed guard applying [`evaluate`] and recording outcomes.
#[derive(Clone)]
pub struct LockoutGuard {
    store: Arc<dyn AuthStore>,
    config: LockoutConfig,
}

impl LockoutGuard {
    pub fn new(store: Arc<dyn AuthStore>, config: LockoutConfig) -> Self {
        Self { store, config }
    }

    /// Run the pre-verification check for a login attempt. Writes back the
    /// reset or the fail-closed lock where the state machine demands one.
    pub async fn ensure_unlocked(&self, user: &User) -> Result<(), ServiceError> {
        match evaluate(
            user.failed_login_attempts,
            user.locked_until,
            Utc::now(),
            &self.config,
        ) {
            LockoutDecision::Proceed => Ok(()),
            LockoutDecision::ProceedAfterReset => {
                self.store.set_lockout_state(user.user_id, 0, None).await?;
                Ok(())
            }
            LockoutDecision::Reject { minutes_remaining } => {
                Err(ServiceError::AccountLocked { minutes_remaining })
            }
            LockoutDecision::RejectAndLock { until } => {
                self.store
                    .set_lockout_state(user.user_id, user.failed_login_attempts, Some(until))
                    .await?;
                Err(ServiceError::AccountLocked {
                    minutes_remaining: self.config.lockout_minutes,
                })
            }
        }
    }

    /// Record a password mismatch; the attempt that reaches the threshold
    /// starts the lock window.
    pub async fn record_failure(&self, user: &User) -> Result<(), ServiceError> {
        let attempts = user.failed_login_attempts + 1;
        let locked_until = if attempts >= self.config.max_failed_attempts {
            let until = Utc::now() + Duration::minutes(self.config.lockout_minutes);
            tracing::warn!(user_id = %user.user_id, attempts, "Account locked after repeated login failures");
            Some(until)
        } else {
            None
        };

        self.store
            .set_lockout_state(user.user_id, attempts, locked_until)
            .await
    }

    /// Clear the counter after a successful login. Skips the write when
    /// there is nothing to clear.
    pub async fn record_success(&self, user: &User) -> Result<(), ServiceError> {
        if user.failed_login_attempts == 0 && user.locked_until.is_none() {
            return Ok(());
        }
        self.store.set_lockout_state(user.user_id, 0, None).await
    }
}
