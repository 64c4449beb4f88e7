//! Collaborator interfaces consumed by the lifecycle controllers.
//!
//! Provider adapters implement these traits. The core never speaks a
//! provider wire format; it only issues create/get/delete calls and inspects
//! the returned state through [`NodeState`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Future returned by collaborator operations.
pub type ApiFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Error type reported by provider collaborators.
pub trait ProviderError: std::error::Error + Send + Sync + 'static {
    /// Returns `true` when the error is an expected "not yet" condition, such
    /// as a freshly created resource that the read API cannot see yet.
    ///
    /// Readiness waits treat transient errors as "not ready" and keep polling;
    /// every other error aborts the wait immediately.
    fn is_transient(&self) -> bool {
        false
    }
}

/// Parameters for provisioning a single node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequest<S> {
    /// Provider specific description of the desired node.
    pub spec: S,
    /// Group the node belongs to. Secondary resources are named after it.
    pub group_name: String,
    /// Name of the node, normally generated from the group.
    pub instance_name: String,
}

impl<S> ProvisionRequest<S> {
    /// Starts a builder for a [`ProvisionRequest`].
    #[must_use]
    pub fn builder(spec: S) -> ProvisionRequestBuilder<S> {
        ProvisionRequestBuilder::new(spec)
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when any name is empty.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.group_name.trim().is_empty() {
            return Err(RequestError::Validation("group_name".to_owned()));
        }
        if self.instance_name.trim().is_empty() {
            return Err(RequestError::Validation("instance_name".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`ProvisionRequest`] that trims names and validates on build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequestBuilder<S> {
    spec: S,
    group_name: String,
    instance_name: String,
}

impl<S> ProvisionRequestBuilder<S> {
    /// Creates a builder around the provider specific spec.
    #[must_use]
    pub const fn new(spec: S) -> Self {
        Self {
            spec,
            group_name: String::new(),
            instance_name: String::new(),
        }
    }

    /// Sets the group name.
    #[must_use]
    pub fn group_name(mut self, value: impl Into<String>) -> Self {
        self.group_name = value.into();
        self
    }

    /// Sets the instance name.
    #[must_use]
    pub fn instance_name(mut self, value: impl Into<String>) -> Self {
        self.instance_name = value.into();
        self
    }

    /// Builds and validates the [`ProvisionRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when a required name is empty.
    pub fn build(self) -> Result<ProvisionRequest<S>, RequestError> {
        let request = ProvisionRequest {
            spec: self.spec,
            group_name: self.group_name.trim().to_owned(),
            instance_name: self.instance_name.trim().to_owned(),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Errors raised while building requests.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Handle returned by a provider once a node has been created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceHandle {
    /// Provider specific identifier for the node.
    pub id: String,
    /// Name the node was created with.
    pub name: String,
}

/// Initial login details extracted from a ready node.
#[derive(Clone, Eq, PartialEq)]
pub struct LoginCredentials {
    /// Login user name.
    pub user: String,
    /// Initial password issued by the provider.
    pub password: String,
}

impl LoginCredentials {
    /// Creates a login pair.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read-only view of a node's last observed state.
pub trait NodeState: Send + Sync {
    /// Short human readable status used in logs and error messages.
    fn status(&self) -> String;

    /// Returns `true` once the node exposes everything needed to log in
    /// (network addresses and an initial secret).
    fn has_login_details(&self) -> bool;

    /// Extracts the initial login pair, if the provider has issued one.
    fn login_credentials(&self) -> Option<LoginCredentials>;

    /// Number of provider operations still pending or active on the node.
    fn pending_operations(&self) -> u32;
}

/// Minimal compute interface implemented by provider adapters.
pub trait ComputeApi: Send + Sync {
    /// Provider specific node description passed to `create`.
    type Spec: Send + Sync;
    /// Provider specific node state returned by `get`.
    type Node: NodeState;
    /// Provider specific error type.
    type Error: ProviderError;

    /// Issues the create call and returns as soon as the provider accepted it.
    fn create<'a>(
        &'a self,
        request: &'a ProvisionRequest<Self::Spec>,
    ) -> ApiFuture<'a, ResourceHandle, Self::Error>;

    /// Fetches the current state of a node, or `None` when it does not exist.
    /// Must be safe to call repeatedly.
    fn get<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Option<Self::Node>, Self::Error>;

    /// Deletes a node. `Ok(false)` means the provider still reports it.
    fn delete<'a>(&'a self, id: &'a str) -> ApiFuture<'a, bool, Self::Error>;
}

/// Kind of secondary resource left behind by a deleted node.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum OrphanKind {
    /// Firewall rule scoped to the node or its group.
    FirewallRule,
    /// Firewall policy scoped to the node or its group.
    FirewallPolicy,
    /// SSH key pair generated for the group.
    KeyPair,
    /// Security group generated for the group.
    SecurityGroup,
}

impl fmt::Display for OrphanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FirewallRule => "firewall rule",
            Self::FirewallPolicy => "firewall policy",
            Self::KeyPair => "key pair",
            Self::SecurityGroup => "security group",
        };
        f.write_str(label)
    }
}

/// Reference to a secondary resource that may outlive its node.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OrphanRef {
    /// Resource kind.
    pub kind: OrphanKind,
    /// Region the resource lives in.
    pub region: String,
    /// Provider side resource name.
    pub name: String,
}

impl OrphanRef {
    /// Creates an orphan reference.
    #[must_use]
    pub fn new(kind: OrphanKind, region: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            region: region.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for OrphanRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}/{})", self.kind, self.region, self.name)
    }
}

/// Enumeration and deletion of secondary resources.
pub trait OrphanApi: Send + Sync {
    /// Provider specific error type.
    type Error: ProviderError;

    /// Lists secondary resources that may belong to `group`.
    fn list_orphans<'a>(&'a self, group: &'a str) -> ApiFuture<'a, Vec<OrphanRef>, Self::Error>;

    /// Deletes a single secondary resource.
    fn delete_orphan<'a>(&'a self, orphan: &'a OrphanRef) -> ApiFuture<'a, (), Self::Error>;
}

/// Handle returned once an image capture has been registered.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageHandle {
    /// Provider specific image identifier.
    pub id: String,
    /// Requested image name.
    pub name: String,
}

/// Availability of an image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageStatus {
    /// Capture is still running.
    Pending,
    /// Image can be used to boot nodes.
    Available,
    /// Capture failed and will not recover.
    Failed,
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Observed state of an image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageState {
    /// Provider specific image identifier.
    pub id: String,
    /// Current availability.
    pub status: ImageStatus,
}

/// Image capture interface implemented by provider adapters.
pub trait ImageApi: Send + Sync {
    /// Provider specific error type.
    type Error: ProviderError;

    /// Starts capturing an image from an existing node.
    fn clone_from_node<'a>(
        &'a self,
        node_id: &'a str,
        name: &'a str,
    ) -> ApiFuture<'a, ImageHandle, Self::Error>;

    /// Fetches an image, or `None` when it does not exist.
    fn get_image<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Option<ImageState>, Self::Error>;

    /// Issues an image delete.
    fn delete_image<'a>(&'a self, id: &'a str) -> ApiFuture<'a, (), Self::Error>;
}
