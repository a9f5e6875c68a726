//! Retrying flaky UI actions
//!
//! Some triggers need to be redone, not just waited on: a menu toggle clicked
//! before its animation settles, a hover menu that closes under the cursor.
//! [`ActionRetrier`] repeats the action itself until a success predicate holds.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::wait::poll_until;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of times the action is performed
    pub attempts: u32,
    /// How long the predicate is polled after each action
    pub per_attempt_timeout: Duration,
    /// Predicate polling interval
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            per_attempt_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionRetrier {
    policy: RetryPolicy,
}

impl ActionRetrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Perform `action` until `predicate` holds, at most `attempts` times.
    ///
    /// Returns the 1-based attempt that succeeded. A failing action counts as
    /// a failed attempt; its error is kept for the exhaustion report.
    pub async fn run<A, AFut, P, PFut>(
        &self,
        action_name: &str,
        predicate_name: &str,
        mut action: A,
        mut predicate: P,
    ) -> E2eResult<u32>
    where
        A: FnMut() -> AFut,
        AFut: Future<Output = E2eResult<()>>,
        P: FnMut() -> PFut,
        PFut: Future<Output = E2eResult<bool>>,
    {
        let attempts = self.policy.attempts.max(1);
        let mut last_error: Option<String> = None;

        for attempt in 1..=attempts {
            debug!("{} (attempt {}/{})", action_name, attempt, attempts);

            if let Err(e) = action().await {
                warn!("{} failed on attempt {}: {}", action_name, attempt, e);
                last_error = Some(e.to_string());
                continue;
            }

            match poll_until(
                predicate_name,
                self.policy.per_attempt_timeout,
                self.policy.poll_interval,
                &mut predicate,
            )
            .await
            {
                Ok(()) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", action_name, attempt);
                    }
                    return Ok(attempt);
                }
                Err(e) => {
                    warn!(
                        "'{}' not satisfied after {} (attempt {}/{}), retrying action",
                        predicate_name, action_name, attempt, attempts
                    );
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(E2eError::RetryExhausted {
            action: action_name.to_string(),
            predicate: predicate_name.to_string(),
            attempts,
            last_error,
        })
    }
}
