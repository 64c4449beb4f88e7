//! Create, wait for login details, extract credentials, or destroy.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::LifecycleError;
use crate::backend::{
    ComputeApi, LoginCredentials, NodeState, ProviderError, ProvisionRequest, ResourceHandle,
};
use crate::poll::{PolicyError, PollError, PollPolicy, Probe, ReadinessPoller};

/// Login details waits must allow more than this.
pub const MIN_LOGIN_DETAILS_TIMEOUT: Duration = Duration::from_millis(500);

/// Phases of a single provisioning flow.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProvisionState {
    /// Issuing the create call.
    Creating,
    /// Polling until the node exposes its login details.
    WaitingReady,
    /// Reading the final node state.
    FetchingCredentials,
    /// Node is ready and its credentials were extracted.
    Ready,
    /// Deleting a node that never became ready.
    Destroying,
    /// Flow ended with an error.
    Failed,
}

impl ProvisionState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::WaitingReady => "waiting_ready",
            Self::FetchingCredentials => "fetching_credentials",
            Self::Ready => "ready",
            Self::Destroying => "destroying",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for [`ProvisionController`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProvisionConfig {
    /// How long to wait for login details.
    pub login_details_timeout: Duration,
    /// Spacing between login detail checks.
    pub login_details_period: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            login_details_timeout: Duration::from_secs(20 * 60),
            login_details_period: Duration::from_secs(10),
        }
    }
}

impl ProvisionConfig {
    /// Creates a configuration.
    #[must_use]
    pub const fn new(login_details_timeout: Duration, login_details_period: Duration) -> Self {
        Self {
            login_details_timeout,
            login_details_period,
        }
    }

    /// Poll policy for the login details wait.
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        PollPolicy::new(self.login_details_period, self.login_details_timeout)
    }

    /// Validates the wait policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the period is zero or the timeout does
    /// not exceed [`MIN_LOGIN_DETAILS_TIMEOUT`].
    pub fn validate(&self) -> Result<(), PolicyError> {
        self.policy()
            .validate_with_minimum(MIN_LOGIN_DETAILS_TIMEOUT)
    }
}

/// A node that reached readiness.
#[derive(Clone, Debug)]
pub struct Provisioned<N> {
    /// Handle returned by the create call.
    pub handle: ResourceHandle,
    /// Final node state.
    pub node: N,
    /// Initial login pair.
    pub credentials: LoginCredentials,
    /// Readiness checks performed.
    pub attempts: u32,
    /// Time from the create call until credentials were extracted.
    pub elapsed: Duration,
}

/// Drives one node from create to ready, destroying it when it never gets
/// there.
#[derive(Debug)]
pub struct ProvisionController<A> {
    api: A,
    poller: ReadinessPoller,
    config: ProvisionConfig,
}

impl<A> ProvisionController<A>
where
    A: ComputeApi,
{
    /// Creates a controller over `api`.
    #[must_use]
    pub fn new(api: A, config: ProvisionConfig) -> Self {
        Self {
            api,
            poller: ReadinessPoller::new(),
            config,
        }
    }

    /// Replaces the poller, for example to share a cancellation token.
    #[must_use]
    pub fn with_poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Compute collaborator.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Creates a node and waits until it exposes its login details.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CreateFailed`] when the create call fails.
    /// Returns [`LifecycleError::ReadinessTimeout`],
    /// [`LifecycleError::Cancelled`] or [`LifecycleError::Query`] once the
    /// node has been deleted best-effort after a failed wait. Once the node
    /// reported login details it is never deleted here: a failed final read
    /// returns [`LifecycleError::Query`] and a ready node without
    /// credentials returns [`LifecycleError::InconsistentState`], both
    /// leaving the node for the caller to tear down.
    pub async fn provision(
        &self,
        request: &ProvisionRequest<A::Spec>,
    ) -> Result<Provisioned<A::Node>, LifecycleError<A::Error>> {
        request.validate()?;
        self.config.validate()?;
        let started = Instant::now();

        enter(ProvisionState::Creating, &request.instance_name);
        let handle = self.api.create(request).await.map_err(|source| {
            enter(ProvisionState::Failed, &request.instance_name);
            LifecycleError::CreateFailed {
                name: request.instance_name.clone(),
                source,
            }
        })?;

        let attempts = self.await_login_details(&handle).await?;
        let (node, credentials) = self.fetch_credentials(&handle).await?;

        enter(ProvisionState::Ready, &handle.id);
        let elapsed = started.elapsed();
        info!(
            node = %handle.id,
            name = %handle.name,
            attempts,
            elapsed_ms = elapsed.as_millis(),
            "node provisioned"
        );
        Ok(Provisioned {
            handle,
            node,
            credentials,
            attempts,
            elapsed,
        })
    }

    /// Polls until the node exposes login details and returns the number of
    /// checks. Destroys the node when the wait fails.
    async fn await_login_details(
        &self,
        handle: &ResourceHandle,
    ) -> Result<u32, LifecycleError<A::Error>> {
        enter(ProvisionState::WaitingReady, &handle.id);
        debug!(node = %handle.id, ">> awaiting login details");
        let policy = self.config.policy();
        let api = &self.api;
        let id = handle.id.as_str();
        let outcome = self
            .poller
            .until(&policy, move || async move {
                match api.get(id).await {
                    Ok(Some(node)) if node.has_login_details() => Ok(Probe::Ready(node.status())),
                    Ok(Some(node)) => Ok(Probe::NotReady(Some(node.status()))),
                    Ok(None) => Ok(Probe::NotReady(None)),
                    Err(err) if err.is_transient() => {
                        trace!(node = id, error = %err, "transient read failure");
                        Ok(Probe::NotReady(None))
                    }
                    Err(err) => Err(err),
                }
            })
            .await;

        match outcome {
            Ok(waited) if waited.ready => {
                debug!(node = %handle.id, attempts = waited.attempts, "<< login details available");
                Ok(waited.attempts)
            }
            Ok(waited) => {
                warn!(
                    node = %handle.id,
                    elapsed_ms = waited.elapsed.as_millis(),
                    timeout_ms = policy.timeout.as_millis(),
                    "node did not report login details in time; destroying"
                );
                let cleanup_error = self.destroy(handle).await;
                Err(LifecycleError::ReadinessTimeout {
                    id: handle.id.clone(),
                    elapsed: waited.elapsed,
                    timeout: policy.timeout,
                    last_state: waited.last_observed,
                    cleanup_error,
                })
            }
            Err(err) => Err(self.abandon(handle, err).await),
        }
    }

    /// Reads the final node state and extracts its login pair.
    async fn fetch_credentials(
        &self,
        handle: &ResourceHandle,
    ) -> Result<(A::Node, LoginCredentials), LifecycleError<A::Error>> {
        enter(ProvisionState::FetchingCredentials, &handle.id);
        let inconsistent = |message: String| {
            enter(ProvisionState::Failed, &handle.id);
            LifecycleError::InconsistentState {
                id: handle.id.clone(),
                message,
            }
        };
        let observed = self.api.get(&handle.id).await.map_err(|source| {
            warn!(
                node = %handle.id,
                error = %source,
                "final read failed; node left running for the caller to tear down"
            );
            enter(ProvisionState::Failed, &handle.id);
            LifecycleError::Query {
                id: handle.id.clone(),
                source,
                progress: None,
            }
        })?;
        let Some(node) = observed else {
            return Err(inconsistent(String::from(
                "node vanished after reporting login details",
            )));
        };
        let Some(credentials) = node.login_credentials() else {
            return Err(inconsistent(format!(
                "node reported login details but no password was issued (status {})",
                node.status()
            )));
        };
        Ok((node, credentials))
    }

    async fn abandon(
        &self,
        handle: &ResourceHandle,
        err: PollError<A::Error, String>,
    ) -> LifecycleError<A::Error> {
        warn!(node = %handle.id, error = %err, "readiness wait aborted; destroying");
        self.destroy(handle).await;
        LifecycleError::from_poll(&handle.id, err, Some)
    }

    /// Best-effort delete. Returns a description of the failure, if any.
    async fn destroy(&self, handle: &ResourceHandle) -> Option<String> {
        enter(ProvisionState::Destroying, &handle.id);
        let failure = match self.api.delete(&handle.id).await {
            Ok(true) => None,
            Ok(false) => Some(String::from("provider still reports the node after delete")),
            Err(err) => Some(err.to_string()),
        };
        if let Some(message) = &failure {
            warn!(node = %handle.id, error = %message, "compensating delete failed");
        }
        enter(ProvisionState::Failed, &handle.id);
        failure
    }
}

fn enter(state: ProvisionState, node: &str) {
    debug!(node, state = %state, "provision state");
}
