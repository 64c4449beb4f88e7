//! Image capture from existing nodes.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::LifecycleError;
use crate::backend::{ImageApi, ImageHandle, ImageStatus, ProviderError};
use crate::poll::{PolicyError, PollPolicy, Probe, ReadinessPoller};

/// Tunables for [`ImageController`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ImageConfig {
    /// How long to wait for a captured image to become available.
    pub available_timeout: Duration,
    /// Spacing between availability checks.
    pub available_period: Duration,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            available_timeout: Duration::from_secs(20 * 60),
            available_period: Duration::from_secs(5),
        }
    }
}

impl ImageConfig {
    /// Poll policy for the availability wait.
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        PollPolicy::new(self.available_period, self.available_timeout)
    }

    /// Validates the availability policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the period or timeout is zero.
    pub const fn validate(&self) -> Result<(), PolicyError> {
        self.policy().validate()
    }
}

/// Captures images from nodes and deletes them.
#[derive(Debug)]
pub struct ImageController<I> {
    api: I,
    poller: ReadinessPoller,
    config: ImageConfig,
}

impl<I> ImageController<I>
where
    I: ImageApi,
{
    /// Creates a controller over `api`.
    #[must_use]
    pub fn new(api: I, config: ImageConfig) -> Self {
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

    /// Captures an image of `node_id` named `name` and waits until it is
    /// available.
    ///
    /// An image that does not become available is left in place.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CreateFailed`] when the capture is rejected,
    /// [`LifecycleError::ImageTimeout`] when it does not become available in
    /// time, and [`LifecycleError::InconsistentState`] when the provider
    /// reports the capture as failed.
    pub async fn create_image(
        &self,
        node_id: &str,
        name: &str,
    ) -> Result<ImageHandle, LifecycleError<I::Error>> {
        self.config.validate()?;
        let handle = self
            .api
            .clone_from_node(node_id, name)
            .await
            .map_err(|source| LifecycleError::CreateFailed {
                name: name.to_owned(),
                source,
            })?;

        debug!(image = %handle.id, node = node_id, ">> awaiting image availability");
        let policy = self.config.policy();
        let api = &self.api;
        let id = handle.id.as_str();
        let waited = self
            .poller
            .until(&policy, move || async move {
                match api.get_image(id).await {
                    Ok(Some(image)) if image.status == ImageStatus::Pending => {
                        Ok(Probe::NotReady(Some(image.status)))
                    }
                    Ok(Some(image)) => Ok(Probe::Ready(image.status)),
                    Ok(None) => Ok(Probe::NotReady(None)),
                    Err(err) if err.is_transient() => {
                        trace!(image = id, error = %err, "transient read failure");
                        Ok(Probe::NotReady(None))
                    }
                    Err(err) => Err(err),
                }
            })
            .await
            .map_err(|err| {
                LifecycleError::from_poll(id, err, |status: ImageStatus| Some(status.to_string()))
            })?;

        if !waited.ready {
            warn!(
                image = %handle.id,
                elapsed_ms = waited.elapsed.as_millis(),
                timeout_ms = policy.timeout.as_millis(),
                "image did not become available in time"
            );
            return Err(LifecycleError::ImageTimeout {
                id: handle.id.clone(),
                elapsed: waited.elapsed,
                timeout: policy.timeout,
                last_state: waited.last_observed.as_ref().map(ToString::to_string),
            });
        }
        if waited.last_observed == Some(ImageStatus::Failed) {
            return Err(LifecycleError::InconsistentState {
                id: handle.id.clone(),
                message: format!("capture from node {node_id} failed"),
            });
        }

        info!(image = %handle.id, node = node_id, attempts = waited.attempts, "image available");
        Ok(handle)
    }

    /// Deletes image `id` and confirms it is gone.
    ///
    /// Resolves to `false` when the provider still reports the image after
    /// the delete call.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::DeleteFailed`] when the delete call fails and
    /// [`LifecycleError::Query`] when the confirmation read fails.
    pub async fn delete_image(&self, id: &str) -> Result<bool, LifecycleError<I::Error>> {
        self.api
            .delete_image(id)
            .await
            .map_err(|source| LifecycleError::DeleteFailed {
                id: id.to_owned(),
                source,
            })?;
        let remaining = self
            .api
            .get_image(id)
            .await
            .map_err(|source| LifecycleError::Query {
                id: id.to_owned(),
                source,
                progress: None,
            })?;
        let deleted = remaining.is_none();
        if !deleted {
            warn!(image = id, "image still present after delete");
        }
        Ok(deleted)
    }
}
