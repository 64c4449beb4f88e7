//! Core library for the Hangar node lifecycle toolkit.
//!
//! The crate drives short-lived cloud nodes through their lifecycle
//! (create → wait for login details → tear down and sweep orphans) on top of
//! provider-neutral collaborator traits. Two generic building blocks carry
//! the timing and caching concerns: a single-flight TTL cache and a bounded
//! readiness poller.

pub mod backend;
pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod naming;
pub mod poll;
pub mod test_support;
pub mod token;

pub use backend::{
    ApiFuture, ComputeApi, ImageApi, ImageHandle, ImageState, ImageStatus, LoginCredentials,
    NodeState, OrphanApi, OrphanKind, OrphanRef, ProviderError, ProvisionRequest,
    ProvisionRequestBuilder, RequestError, ResourceHandle,
};
pub use cache::{Invalidate, KeyedCache};
pub use config::{ConfigError, HangarConfig};
pub use lifecycle::{
    ImageConfig, ImageController, LifecycleError, OrphanCleanupFailed, ProvisionConfig,
    ProvisionController, Provisioned, TeardownConfig, TeardownController, TeardownOutcome,
    TeardownReport, WaitProgress,
};
pub use naming::{GroupNamingConvention, RegionAndName};
pub use poll::{PolicyError, PollError, PollPolicy, Probe, ReadinessPoller, Waited};
pub use token::{AuthError, AuthMethods, Authenticator, Credential, Token, TokenSupplier, TokenTtl};
