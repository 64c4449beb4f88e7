//! Deadline-bounded readiness polling.
//!
//! [`ReadinessPoller`] turns an asynchronous provider operation into a
//! bounded wait: it repeatedly runs a check, spaced a full period apart,
//! until the check reports ready or the timeout elapses. The total wait,
//! checks included, is bounded by `timeout + period`: a check still running
//! at that deadline is dropped and the wait ends as not ready.

mod policy;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

pub use policy::{PolicyError, PollPolicy};

/// Result of a single readiness check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Probe<S> {
    /// The resource is ready; carries the observed state.
    Ready(S),
    /// The resource is not ready yet; carries the observed state when the
    /// resource was visible at all.
    NotReady(Option<S>),
}

/// Summary of a completed wait.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Waited<S> {
    /// Whether the check reported ready before the timeout.
    pub ready: bool,
    /// Number of checks performed.
    pub attempts: u32,
    /// Time spent waiting, measured from the first check.
    pub elapsed: Duration,
    /// Last state the check observed, if any.
    pub last_observed: Option<S>,
}

/// Errors that abort a wait before it reaches a verdict.
///
/// Aborted waits keep the progress made so far: the number of checks, the
/// time spent against the configured timeout, and the last observed state.
#[derive(Debug, Error)]
pub enum PollError<E, S = ()>
where
    E: std::error::Error + 'static,
    S: fmt::Debug,
{
    /// Raised when the period or timeout is unusable. Nothing was polled.
    #[error(transparent)]
    InvalidPolicy(#[from] PolicyError),
    /// Raised when the wait was cancelled from outside.
    #[error("wait cancelled after {attempts} checks ({elapsed:?} of {timeout:?})")]
    Cancelled {
        /// Checks performed before cancellation was observed.
        attempts: u32,
        /// Time spent waiting before cancellation.
        elapsed: Duration,
        /// Configured timeout.
        timeout: Duration,
        /// Last state the check observed, if any.
        last_observed: Option<S>,
    },
    /// Raised when the check itself failed with a non-transient error.
    #[error("readiness check {attempts} failed after {elapsed:?} of {timeout:?}: {source}")]
    Check {
        /// Check error.
        #[source]
        source: E,
        /// Checks performed, the failing one included.
        attempts: u32,
        /// Time spent waiting when the check failed.
        elapsed: Duration,
        /// Configured timeout.
        timeout: Duration,
        /// Last state observed before the failure, if any.
        last_observed: Option<S>,
    },
}

/// Bounded, cancellable evaluator of readiness checks.
#[derive(Clone, Debug, Default)]
pub struct ReadinessPoller {
    cancel: CancellationToken,
}

impl ReadinessPoller {
    /// Creates a poller with its own cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a poller that stops when `cancel` is cancelled.
    #[must_use]
    pub const fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Token that cancels every wait issued through this poller.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Polls `check` until it reports [`Probe::Ready`] or `policy.timeout`
    /// elapses.
    ///
    /// Each unsuccessful check is followed by a sleep of a full
    /// `policy.period`. No new check starts once cancellation is observed; a
    /// check already in flight runs until it completes or the overall
    /// deadline of `timeout + period` passes, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::InvalidPolicy`] without polling when the policy
    /// is unusable, [`PollError::Check`] as soon as `check` fails, and
    /// [`PollError::Cancelled`] when the poller's token is cancelled.
    pub async fn until<S, E, F, Fut>(
        &self,
        policy: &PollPolicy,
        mut check: F,
    ) -> Result<Waited<S>, PollError<E, S>>
    where
        S: fmt::Debug,
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<S>, E>>,
    {
        policy.validate()?;
        let started = Instant::now();
        let deadline = started.checked_add(policy.timeout.saturating_add(policy.period));
        let mut attempts = 0_u32;
        let mut last_observed = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(PollError::Cancelled {
                    attempts,
                    elapsed: started.elapsed(),
                    timeout: policy.timeout,
                    last_observed,
                });
            }

            attempts = attempts.saturating_add(1);
            let Some(outcome) = bounded(deadline, check()).await else {
                warn!(
                    attempt = attempts,
                    timeout_ms = policy.timeout.as_millis(),
                    "readiness check still running at the deadline"
                );
                return Ok(Waited {
                    ready: false,
                    attempts,
                    elapsed: started.elapsed(),
                    last_observed,
                });
            };
            match outcome {
                Ok(Probe::Ready(state)) => {
                    return Ok(Waited {
                        ready: true,
                        attempts,
                        elapsed: started.elapsed(),
                        last_observed: Some(state),
                    });
                }
                Ok(Probe::NotReady(observed)) => {
                    if observed.is_some() {
                        last_observed = observed;
                    }
                }
                Err(source) => {
                    return Err(PollError::Check {
                        source,
                        attempts,
                        elapsed: started.elapsed(),
                        timeout: policy.timeout,
                        last_observed,
                    });
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= policy.timeout {
                return Ok(Waited {
                    ready: false,
                    attempts,
                    elapsed,
                    last_observed,
                });
            }

            trace!(
                attempt = attempts,
                elapsed_ms = elapsed.as_millis(),
                "not ready, retrying"
            );
            tokio::select! {
                () = sleep(policy.period) => {}
                () = self.cancel.cancelled() => {
                    return Err(PollError::Cancelled {
                        attempts,
                        elapsed: started.elapsed(),
                        timeout: policy.timeout,
                        last_observed,
                    });
                }
            }
        }
    }

    /// Boolean form of [`ReadinessPoller::until`]: resolves to `true` on the
    /// first check that returns `true`, or `false` once the timeout elapses.
    ///
    /// # Errors
    ///
    /// Same as [`ReadinessPoller::until`].
    pub async fn await_ready<E, F, Fut>(
        &self,
        policy: &PollPolicy,
        mut check: F,
    ) -> Result<bool, PollError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        let waited = self
            .until(policy, || {
                let ready = check();
                async move {
                    Ok(if ready.await? {
                        Probe::Ready(())
                    } else {
                        Probe::NotReady(None)
                    })
                }
            })
            .await?;
        Ok(waited.ready)
    }
}

/// Runs `fut` to completion, or resolves to `None` once `deadline` passes.
async fn bounded<Fut: Future>(deadline: Option<Instant>, fut: Fut) -> Option<Fut::Output> {
    match deadline {
        Some(at) => timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}
