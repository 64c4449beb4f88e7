//! Errors raised by the lifecycle controllers.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::backend::{OrphanRef, RequestError};
use crate::poll::{PolicyError, PollError};

/// Errors raised while provisioning, tearing down, or imaging nodes.
///
/// `E` is the provider's error type, kept as the source of the failures it
/// caused.
#[derive(Debug, Error)]
pub enum LifecycleError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the provision request is incomplete. Nothing was created.
    #[error("invalid provision request: {0}")]
    InvalidRequest(#[from] RequestError),
    /// Raised when a configured period or timeout is unusable.
    #[error("invalid wait configuration: {0}")]
    InvalidPolicy(#[from] PolicyError),
    /// Raised when the provider rejected the create call. Nothing was
    /// created, so nothing is cleaned up.
    #[error("failed to create {name}: {source}")]
    CreateFailed {
        /// Name of the resource that could not be created.
        name: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Raised when a node did not become ready in time. The node was deleted
    /// best-effort; `cleanup_error` describes a failed delete.
    #[error(
        "node {id} not ready after {elapsed:?} (timeout {timeout:?}); last state: {}{}",
        .last_state.as_deref().unwrap_or("unknown"),
        .cleanup_error.as_ref().map_or_else(String::new, |err| format!("; compensating delete failed: {err}"))
    )]
    ReadinessTimeout {
        /// Node identifier.
        id: String,
        /// Time spent waiting.
        elapsed: Duration,
        /// Configured timeout.
        timeout: Duration,
        /// Last observed node status.
        last_state: Option<String>,
        /// Failure of the compensating delete, if it failed.
        cleanup_error: Option<String>,
    },
    /// Raised when pending operations did not finish in time. The node was
    /// not deleted.
    #[error(
        "node {id} still busy after {elapsed:?} (timeout {timeout:?}); last state: {}",
        .last_state.as_deref().unwrap_or("unknown")
    )]
    DrainTimeout {
        /// Node identifier.
        id: String,
        /// Time spent waiting.
        elapsed: Duration,
        /// Configured timeout.
        timeout: Duration,
        /// Last observed node status and pending operation count.
        last_state: Option<String>,
    },
    /// Raised when the provider rejected the delete call.
    #[error("failed to delete {id}: {source}")]
    DeleteFailed {
        /// Resource identifier.
        id: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Raised when the provider reports a state that contradicts an earlier
    /// observation.
    #[error("{id} is in an inconsistent state: {message}")]
    InconsistentState {
        /// Resource identifier.
        id: String,
        /// What was observed.
        message: String,
    },
    /// Raised when reading a resource failed with a non-transient error.
    /// `progress` is set when the read was part of a wait.
    #[error(
        "failed to query {id}: {source}{}",
        .progress.as_ref().map_or_else(String::new, |wait| format!("; {wait}"))
    )]
    Query {
        /// Resource identifier.
        id: String,
        /// Provider error.
        #[source]
        source: E,
        /// How far the wait had got when the read failed.
        progress: Option<WaitProgress>,
    },
    /// Raised when a wait was cancelled from outside.
    #[error("wait for {id} cancelled {progress}")]
    Cancelled {
        /// Resource identifier.
        id: String,
        /// How far the wait had got when it was cancelled.
        progress: WaitProgress,
    },
    /// Raised when an image did not become available in time.
    #[error(
        "image {id} not available after {elapsed:?} (timeout {timeout:?}); last state: {}",
        .last_state.as_deref().unwrap_or("unknown")
    )]
    ImageTimeout {
        /// Image identifier.
        id: String,
        /// Time spent waiting.
        elapsed: Duration,
        /// Configured timeout.
        timeout: Duration,
        /// Last observed image status.
        last_state: Option<String>,
    },
}

impl<E> LifecycleError<E>
where
    E: std::error::Error + 'static,
{
    /// Maps a poller error for the wait on `id`. `describe` renders the last
    /// observed state.
    pub(crate) fn from_poll<S>(
        id: &str,
        err: PollError<E, S>,
        describe: impl FnOnce(S) -> Option<String>,
    ) -> Self
    where
        S: fmt::Debug,
    {
        match err {
            PollError::InvalidPolicy(policy) => Self::InvalidPolicy(policy),
            PollError::Cancelled {
                elapsed,
                timeout,
                last_observed,
                ..
            } => Self::Cancelled {
                id: id.to_owned(),
                progress: WaitProgress {
                    elapsed,
                    timeout,
                    last_state: last_observed.and_then(describe),
                },
            },
            PollError::Check {
                source,
                elapsed,
                timeout,
                last_observed,
                ..
            } => Self::Query {
                id: id.to_owned(),
                source,
                progress: Some(WaitProgress {
                    elapsed,
                    timeout,
                    last_state: last_observed.and_then(describe),
                }),
            },
        }
    }
}

/// Progress of a wait that ended without a verdict.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WaitProgress {
    /// Time spent waiting.
    pub elapsed: Duration,
    /// Configured timeout.
    pub timeout: Duration,
    /// Last observed state, if any.
    pub last_state: Option<String>,
}

impl fmt::Display for WaitProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "after {:?} (timeout {:?}); last state: {}",
            self.elapsed,
            self.timeout,
            self.last_state.as_deref().unwrap_or("unknown")
        )
    }
}

/// A secondary resource that could not be removed during teardown.
///
/// Collected rather than raised: teardown still completes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrphanCleanupFailed {
    /// Resource that failed to delete, or `None` when listing failed.
    pub orphan: Option<OrphanRef>,
    /// Provider error message.
    pub message: String,
}

impl fmt::Display for OrphanCleanupFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.orphan {
            None => write!(f, "failed to list orphans: {}", self.message),
            Some(orphan) => write!(f, "failed to delete {orphan}: {}", self.message),
        }
    }
}
