//! Lifecycle controllers composing the cache and the poller.
//!
//! [`ProvisionController`] runs create, wait until ready, then extract
//! credentials, deleting the node best-effort when it never becomes ready.
//! [`TeardownController`] drains pending operations, deletes the node, and
//! removes the secondary resources its group left behind.
//! [`ImageController`] captures images and waits for them to become
//! available.

mod error;
mod image;
mod provision;
mod teardown;

pub use error::{LifecycleError, OrphanCleanupFailed, WaitProgress};
pub use image::{ImageConfig, ImageController};
pub use provision::{
    MIN_LOGIN_DETAILS_TIMEOUT, ProvisionConfig, ProvisionController, ProvisionState, Provisioned,
};
pub use teardown::{
    TeardownConfig, TeardownController, TeardownOutcome, TeardownReport, TeardownState,
};

#[cfg(test)]
mod tests;
