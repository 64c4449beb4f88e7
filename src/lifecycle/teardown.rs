//! Drain, delete, and clean up what a node leaves behind.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::{LifecycleError, OrphanCleanupFailed};
use crate::backend::{ComputeApi, NodeState, OrphanApi, OrphanKind, OrphanRef, ProviderError};
use crate::cache::Invalidate;
use crate::naming::{GroupNamingConvention, RegionAndName};
use crate::poll::{PolicyError, PollPolicy, Probe, ReadinessPoller};

/// Tunables for [`TeardownController`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TeardownConfig {
    /// How long to wait for pending operations to finish.
    pub drain_timeout: Duration,
    /// Spacing between pending operation checks.
    pub drain_period: Duration,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_millis(180_000),
            drain_period: Duration::from_secs(1),
        }
    }
}

impl TeardownConfig {
    /// Creates a configuration.
    #[must_use]
    pub const fn new(drain_timeout: Duration, drain_period: Duration) -> Self {
        Self {
            drain_timeout,
            drain_period,
        }
    }

    /// Poll policy for the drain wait.
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        PollPolicy::new(self.drain_period, self.drain_timeout)
    }

    /// Validates the drain policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the period or timeout is zero.
    pub const fn validate(&self) -> Result<(), PolicyError> {
        self.policy().validate()
    }
}

/// What happened to the node itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TeardownOutcome {
    /// The node was drained and deleted.
    Deleted,
    /// The node disappeared while draining; no delete was issued.
    AlreadyGone,
    /// The node did not exist; nothing was done.
    NotFound,
}

/// Summary of a completed teardown.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownReport {
    /// Node identifier.
    pub id: String,
    /// Fate of the node.
    pub outcome: TeardownOutcome,
    /// Secondary resources that were removed.
    pub removed_orphans: Vec<OrphanRef>,
    /// Secondary resources that could not be removed.
    pub orphan_failures: Vec<OrphanCleanupFailed>,
}

impl TeardownReport {
    fn not_found(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            outcome: TeardownOutcome::NotFound,
            removed_orphans: Vec::new(),
            orphan_failures: Vec::new(),
        }
    }

    /// Returns `true` when every orphan was removed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.orphan_failures.is_empty()
    }
}

/// Phases of a single teardown flow.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TeardownState {
    /// Waiting for pending operations to finish.
    Draining,
    /// Issuing the delete call.
    Deleting,
    /// Removing secondary resources.
    CleaningUp,
    /// Teardown finished.
    Done,
}

impl fmt::Display for TeardownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Draining => "draining",
            Self::Deleting => "deleting",
            Self::CleaningUp => "cleaning_up",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
enum Drain {
    Idle,
    Vanished,
    Busy(String),
}

impl Drain {
    fn into_label(self) -> Option<String> {
        match self {
            Self::Busy(label) => Some(label),
            Self::Idle | Self::Vanished => None,
        }
    }
}

/// Deletes nodes safely and removes the secondary resources of their group.
pub struct TeardownController<A, O> {
    compute: A,
    orphans: O,
    poller: ReadinessPoller,
    config: TeardownConfig,
    naming: GroupNamingConvention,
    key_pairs: Option<Arc<dyn Invalidate<RegionAndName>>>,
}

impl<A, O> TeardownController<A, O>
where
    A: ComputeApi,
    O: OrphanApi,
{
    /// Creates a controller using the default naming convention.
    #[must_use]
    pub fn new(compute: A, orphans: O, config: TeardownConfig) -> Self {
        Self {
            compute,
            orphans,
            poller: ReadinessPoller::new(),
            config,
            naming: GroupNamingConvention::default(),
            key_pairs: None,
        }
    }

    /// Replaces the naming convention used to match orphans.
    #[must_use]
    pub fn with_naming(mut self, naming: GroupNamingConvention) -> Self {
        self.naming = naming;
        self
    }

    /// Invalidates entries of `cache` for every key pair removed.
    #[must_use]
    pub fn with_key_pair_cache(mut self, cache: Arc<dyn Invalidate<RegionAndName>>) -> Self {
        self.key_pairs = Some(cache);
        self
    }

    /// Replaces the poller, for example to share a cancellation token.
    #[must_use]
    pub fn with_poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &TeardownConfig {
        &self.config
    }

    /// Drains and deletes node `id`, then removes orphans of `group`.
    ///
    /// A node that does not exist is reported as
    /// [`TeardownOutcome::NotFound`] without touching anything else, so a
    /// repeated teardown is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::DrainTimeout`] without deleting when pending
    /// operations do not finish in time, [`LifecycleError::DeleteFailed`]
    /// or [`LifecycleError::InconsistentState`] when the delete does not
    /// take, and [`LifecycleError::Query`] when reading the node fails.
    /// Orphan failures never fail the teardown.
    pub async fn teardown(
        &self,
        id: &str,
        group: &str,
    ) -> Result<TeardownReport, LifecycleError<A::Error>> {
        self.config.validate()?;

        let observed = self
            .compute
            .get(id)
            .await
            .map_err(|source| LifecycleError::Query {
                id: id.to_owned(),
                source,
                progress: None,
            })?;
        let Some(node) = observed else {
            info!(node = id, "node not found; nothing to tear down");
            return Ok(TeardownReport::not_found(id));
        };

        let vanished = node.pending_operations() != 0 && self.drain(id).await?;
        let outcome = if vanished {
            debug!(node = id, "node vanished while draining; skipping delete");
            TeardownOutcome::AlreadyGone
        } else {
            self.delete(id).await?;
            TeardownOutcome::Deleted
        };

        enter(TeardownState::CleaningUp, id);
        let (removed_orphans, orphan_failures) = self.cleanup_orphans(group).await;
        enter(TeardownState::Done, id);
        info!(
            node = id,
            group,
            removed = removed_orphans.len(),
            failed = orphan_failures.len(),
            "teardown complete"
        );
        Ok(TeardownReport {
            id: id.to_owned(),
            outcome,
            removed_orphans,
            orphan_failures,
        })
    }

    /// Waits until node `id` has no pending operations. Resolves to `true`
    /// when the node disappeared instead.
    async fn drain(&self, id: &str) -> Result<bool, LifecycleError<A::Error>> {
        enter(TeardownState::Draining, id);
        debug!(node = id, ">> awaiting no pending operations");
        let policy = self.config.policy();
        let compute = &self.compute;
        let waited = self
            .poller
            .until(&policy, move || async move {
                match compute.get(id).await {
                    Ok(Some(node)) if node.pending_operations() == 0 => Ok(Probe::Ready(Drain::Idle)),
                    Ok(Some(node)) => Ok(Probe::NotReady(Some(Drain::Busy(format!(
                        "{} ({} pending)",
                        node.status(),
                        node.pending_operations()
                    ))))),
                    Ok(None) => Ok(Probe::Ready(Drain::Vanished)),
                    Err(err) if err.is_transient() => {
                        trace!(node = id, error = %err, "transient read failure");
                        Ok(Probe::NotReady(None))
                    }
                    Err(err) => Err(err),
                }
            })
            .await
            .map_err(|err| LifecycleError::from_poll(id, err, Drain::into_label))?;

        if waited.ready {
            debug!(node = id, attempts = waited.attempts, "<< drained");
            return Ok(matches!(waited.last_observed, Some(Drain::Vanished)));
        }

        let last_state = waited.last_observed.and_then(Drain::into_label);
        warn!(
            node = id,
            elapsed_ms = waited.elapsed.as_millis(),
            timeout_ms = policy.timeout.as_millis(),
            "pending operations did not finish; refusing to delete"
        );
        Err(LifecycleError::DrainTimeout {
            id: id.to_owned(),
            elapsed: waited.elapsed,
            timeout: policy.timeout,
            last_state,
        })
    }

    async fn delete(&self, id: &str) -> Result<(), LifecycleError<A::Error>> {
        enter(TeardownState::Deleting, id);
        match self.compute.delete(id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(LifecycleError::InconsistentState {
                id: id.to_owned(),
                message: String::from("provider still reports the node after delete"),
            }),
            Err(source) => Err(LifecycleError::DeleteFailed {
                id: id.to_owned(),
                source,
            }),
        }
    }

    async fn cleanup_orphans(&self, group: &str) -> (Vec<OrphanRef>, Vec<OrphanCleanupFailed>) {
        let mut removed = Vec::new();
        let mut failures = Vec::new();
        let candidates = match self.orphans.list_orphans(group).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(group, error = %err, "failed to list orphans");
                failures.push(OrphanCleanupFailed {
                    orphan: None,
                    message: err.to_string(),
                });
                return (removed, failures);
            }
        };

        let mut regions = BTreeSet::new();
        for orphan in candidates
            .into_iter()
            .filter(|orphan| self.naming.contains_group(group, &orphan.name))
        {
            regions.insert(orphan.region.clone());
            match self.orphans.delete_orphan(&orphan).await {
                Ok(()) => {
                    debug!(group, orphan = %orphan, "orphan removed");
                    if orphan.kind == OrphanKind::KeyPair {
                        self.forget_key_pair(&RegionAndName::new(
                            orphan.region.as_str(),
                            orphan.name.as_str(),
                        ));
                    }
                    removed.push(orphan);
                }
                Err(err) => {
                    warn!(group, orphan = %orphan, error = %err, "failed to remove orphan");
                    failures.push(OrphanCleanupFailed {
                        orphan: Some(orphan),
                        message: err.to_string(),
                    });
                }
            }
        }

        let shared = self.naming.shared_name_for_group(group);
        for region in regions {
            self.forget_key_pair(&RegionAndName::new(region, shared.as_str()));
        }
        (removed, failures)
    }

    fn forget_key_pair(&self, key: &RegionAndName) {
        if let Some(cache) = &self.key_pairs {
            trace!(key = %key, "invalidating cached key pair");
            cache.invalidate(key);
        }
    }
}

impl<A, O> fmt::Debug for TeardownController<A, O>
where
    A: fmt::Debug,
    O: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeardownController")
            .field("compute", &self.compute)
            .field("orphans", &self.orphans)
            .field("config", &self.config)
            .field("naming", &self.naming)
            .field("key_pair_cache", &self.key_pairs.is_some())
            .finish_non_exhaustive()
    }
}

fn enter(state: TeardownState, node: &str) {
    debug!(node, state = %state, "teardown state");
}
