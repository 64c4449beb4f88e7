//! Test support utilities shared across unit and integration tests.
//!
//! The scripted collaborators return pre-seeded responses and record every
//! call so tests can assert how often the provider was hit.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::backend::{
    ApiFuture, ComputeApi, ImageApi, ImageHandle, ImageState, ImageStatus, LoginCredentials,
    NodeState, OrphanApi, OrphanRef, ProviderError, ProvisionRequest, ResourceHandle,
};
use crate::token::{AuthError, Authenticator, Credential, Token};

/// Error returned by the scripted collaborators.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct ScriptedError {
    message: String,
    transient: bool,
}

impl ScriptedError {
    /// Error that readiness waits should tolerate.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    /// Error that aborts whatever flow observes it.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

impl ProviderError for ScriptedError {
    fn is_transient(&self) -> bool {
        self.transient
    }
}

/// Node state served by [`ScriptedCompute`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptedNode {
    /// Provider status label.
    pub status: String,
    /// Public address, once assigned.
    pub primary_ip: Option<String>,
    /// Private address, once assigned.
    pub backend_ip: Option<String>,
    /// Initial login pair, once issued.
    pub credentials: Option<LoginCredentials>,
    /// Pending or active provider operations.
    pub pending_operations: u32,
}

impl ScriptedNode {
    /// Node that is still being built: no addresses and no password yet.
    #[must_use]
    pub fn building() -> Self {
        Self {
            status: String::from("BUILDING"),
            primary_ip: None,
            backend_ip: None,
            credentials: None,
            pending_operations: 1,
        }
    }

    /// Node with addresses and an initial login pair.
    #[must_use]
    pub fn ready(user: &str, password: &str) -> Self {
        Self {
            status: String::from("ACTIVE"),
            primary_ip: Some(String::from("203.0.113.10")),
            backend_ip: Some(String::from("10.0.0.10")),
            credentials: Some(LoginCredentials::new(user, password)),
            pending_operations: 0,
        }
    }

    /// Ready node with `count` pending operations.
    #[must_use]
    pub fn busy(count: u32) -> Self {
        Self {
            status: String::from("TRANSACTION_PENDING"),
            pending_operations: count,
            ..Self::ready("root", "initial-secret")
        }
    }

    /// Returns the node without its login pair, keeping the addresses.
    #[must_use]
    pub fn without_credentials(mut self) -> Self {
        self.credentials = None;
        self
    }
}

impl NodeState for ScriptedNode {
    fn status(&self) -> String {
        self.status.clone()
    }

    fn has_login_details(&self) -> bool {
        self.primary_ip.is_some() && self.backend_ip.is_some() && self.credentials.is_some()
    }

    fn login_credentials(&self) -> Option<LoginCredentials> {
        self.credentials.clone()
    }

    fn pending_operations(&self) -> u32 {
        self.pending_operations
    }
}

/// Scripted `get` reply, stored as a plain value and turned into a
/// `Result` when served.
#[derive(Clone, Debug)]
enum GetReply {
    Node(ScriptedNode),
    Missing,
    Fail(ScriptedError),
}

impl GetReply {
    fn from_result(response: Result<Option<ScriptedNode>, ScriptedError>) -> Self {
        match response {
            Ok(Some(node)) => Self::Node(node),
            Ok(None) => Self::Missing,
            Err(err) => Self::Fail(err),
        }
    }

    fn into_result(self) -> Result<Option<ScriptedNode>, ScriptedError> {
        match self {
            Self::Node(node) => Ok(Some(node)),
            Self::Missing => Ok(None),
            Self::Fail(err) => Err(err),
        }
    }
}

/// Scripted `delete` reply.
#[derive(Clone, Debug)]
enum DeleteReply {
    Deleted,
    Retained,
    Fail(ScriptedError),
}

impl DeleteReply {
    fn from_result(response: Result<bool, ScriptedError>) -> Self {
        match response {
            Ok(true) => Self::Deleted,
            Ok(false) => Self::Retained,
            Err(err) => Self::Fail(err),
        }
    }

    fn into_result(self) -> Result<bool, ScriptedError> {
        match self {
            Self::Deleted => Ok(true),
            Self::Retained => Ok(false),
            Self::Fail(err) => Err(err),
        }
    }
}

#[derive(Debug, Default)]
struct ComputeScript {
    create_error: Option<ScriptedError>,
    get_replies: VecDeque<GetReply>,
    last_get: Option<GetReply>,
    delete_replies: VecDeque<DeleteReply>,
    created: Vec<String>,
    deleted: BTreeSet<String>,
    delete_calls: Vec<String>,
    get_calls: usize,
}

/// Scripted [`ComputeApi`] double.
///
/// `get` answers from a FIFO queue and keeps repeating the last response
/// once the queue is drained. Nodes that were deleted successfully read back
/// as missing.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCompute {
    script: Arc<Mutex<ComputeScript>>,
}

impl ScriptedCompute {
    /// Creates a double with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create` calls fail with `error`.
    pub fn fail_create(&self, error: ScriptedError) {
        self.script.lock().create_error = Some(error);
    }

    /// Queues a `get` response.
    pub fn push_get(&self, response: Result<Option<ScriptedNode>, ScriptedError>) {
        self.script
            .lock()
            .get_replies
            .push_back(GetReply::from_result(response));
    }

    /// Queues `count` reads returning `node`.
    pub fn push_node_times(&self, node: &ScriptedNode, count: usize) {
        let mut script = self.script.lock();
        for _ in 0..count {
            script.get_replies.push_back(GetReply::Node(node.clone()));
        }
    }

    /// Queues one read returning `node`.
    pub fn push_node(&self, node: ScriptedNode) {
        self.push_get(Ok(Some(node)));
    }

    /// Queues a `delete` response. Unscripted deletes succeed.
    pub fn push_delete(&self, response: Result<bool, ScriptedError>) {
        self.script
            .lock()
            .delete_replies
            .push_back(DeleteReply::from_result(response));
    }

    /// Number of `create` calls.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.script.lock().created.len()
    }

    /// Instance names passed to `create`, in call order.
    #[must_use]
    pub fn created_names(&self) -> Vec<String> {
        self.script.lock().created.clone()
    }

    /// Number of `get` calls.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.script.lock().get_calls
    }

    /// Identifiers passed to `delete`, in call order.
    #[must_use]
    pub fn delete_calls(&self) -> Vec<String> {
        self.script.lock().delete_calls.clone()
    }
}

impl ComputeApi for ScriptedCompute {
    type Spec = String;
    type Node = ScriptedNode;
    type Error = ScriptedError;

    fn create<'a>(
        &'a self,
        request: &'a ProvisionRequest<Self::Spec>,
    ) -> ApiFuture<'a, ResourceHandle, Self::Error> {
        let mut script = self.script.lock();
        let result = script.create_error.clone().map_or_else(
            || {
                script.created.push(request.instance_name.clone());
                Ok(ResourceHandle {
                    id: format!("node-{}", script.created.len()),
                    name: request.instance_name.clone(),
                })
            },
            Err,
        );
        Box::pin(std::future::ready(result))
    }

    fn get<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Option<Self::Node>, Self::Error> {
        let mut script = self.script.lock();
        script.get_calls += 1;
        let result = if script.deleted.contains(id) {
            Ok(None)
        } else if let Some(reply) = script.get_replies.pop_front() {
            script.last_get = Some(reply.clone());
            reply.into_result()
        } else {
            script
                .last_get
                .clone()
                .map_or(Ok(None), GetReply::into_result)
        };
        Box::pin(std::future::ready(result))
    }

    fn delete<'a>(&'a self, id: &'a str) -> ApiFuture<'a, bool, Self::Error> {
        let mut script = self.script.lock();
        script.delete_calls.push(id.to_owned());
        let result = script
            .delete_replies
            .pop_front()
            .map_or(Ok(true), DeleteReply::into_result);
        if matches!(result, Ok(true)) {
            script.deleted.insert(id.to_owned());
        }
        Box::pin(std::future::ready(result))
    }
}

#[derive(Debug, Default)]
struct OrphanScript {
    orphans: Vec<OrphanRef>,
    failing: BTreeSet<String>,
    list_error: Option<ScriptedError>,
    deleted: Vec<OrphanRef>,
    list_calls: Vec<String>,
}

/// Scripted [`OrphanApi`] double.
///
/// Listing returns every seeded orphan regardless of group; successfully
/// deleted orphans disappear from later listings.
#[derive(Clone, Debug, Default)]
pub struct ScriptedOrphans {
    script: Arc<Mutex<OrphanScript>>,
}

impl ScriptedOrphans {
    /// Creates a double seeded with `orphans`.
    #[must_use]
    pub fn with_orphans(orphans: impl IntoIterator<Item = OrphanRef>) -> Self {
        let double = Self::default();
        double.script.lock().orphans.extend(orphans);
        double
    }

    /// Makes deletion of the orphan called `name` fail.
    pub fn fail_delete_of(&self, name: &str) {
        self.script.lock().failing.insert(name.to_owned());
    }

    /// Makes listing fail with `error`.
    pub fn fail_listing(&self, error: ScriptedError) {
        self.script.lock().list_error = Some(error);
    }

    /// Orphans deleted so far, in call order.
    #[must_use]
    pub fn deleted(&self) -> Vec<OrphanRef> {
        self.script.lock().deleted.clone()
    }

    /// Orphans still present.
    #[must_use]
    pub fn remaining(&self) -> Vec<OrphanRef> {
        self.script.lock().orphans.clone()
    }

    /// Groups passed to `list_orphans`, in call order.
    #[must_use]
    pub fn list_calls(&self) -> Vec<String> {
        self.script.lock().list_calls.clone()
    }
}

impl OrphanApi for ScriptedOrphans {
    type Error = ScriptedError;

    fn list_orphans<'a>(&'a self, group: &'a str) -> ApiFuture<'a, Vec<OrphanRef>, Self::Error> {
        let mut script = self.script.lock();
        script.list_calls.push(group.to_owned());
        let result = script
            .list_error
            .clone()
            .map_or_else(|| Ok(script.orphans.clone()), Err);
        Box::pin(std::future::ready(result))
    }

    fn delete_orphan<'a>(&'a self, orphan: &'a OrphanRef) -> ApiFuture<'a, (), Self::Error> {
        let mut script = self.script.lock();
        let result = if script.failing.contains(&orphan.name) {
            Err(ScriptedError::fatal(format!("cannot delete {orphan}")))
        } else {
            script.orphans.retain(|candidate| candidate != orphan);
            script.deleted.push(orphan.clone());
            Ok(())
        };
        Box::pin(std::future::ready(result))
    }
}

/// [`Authenticator`] double that counts calls and issues numbered tokens.
#[derive(Debug)]
pub struct CountingAuthenticator {
    credential_type: String,
    calls: AtomicUsize,
    delay: Duration,
    token_lifetime: Option<Duration>,
    rejected_secrets: Mutex<BTreeSet<String>>,
}

impl CountingAuthenticator {
    /// Creates an authenticator for `credential_type` that answers at once
    /// with tokens carrying no expiry.
    #[must_use]
    pub fn new(credential_type: impl Into<String>) -> Self {
        Self {
            credential_type: credential_type.into(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            token_lifetime: None,
            rejected_secrets: Mutex::new(BTreeSet::new()),
        }
    }

    /// Delays every authentication by `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Issues tokens that expire `lifetime` after they were issued.
    #[must_use]
    pub const fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = Some(lifetime);
        self
    }

    /// Rejects credentials whose secret equals `secret`.
    pub fn reject_secret(&self, secret: &str) {
        self.rejected_secrets.lock().insert(secret.to_owned());
    }

    /// Number of authentication calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Authenticator for CountingAuthenticator {
    fn credential_type(&self) -> &str {
        &self.credential_type
    }

    fn authenticate<'a>(&'a self, credential: &'a Credential) -> ApiFuture<'a, Token, AuthError> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.rejected_secrets.lock().contains(credential.secret()) {
                return Err(AuthError::AuthenticationFailed {
                    identity: credential.identity().to_owned(),
                    message: String::from("invalid credentials"),
                });
            }
            let id = format!("{}-token-{call}", credential.identity());
            if let Some(lifetime) = self.token_lifetime {
                return Ok(Token::expires_in(id, lifetime));
            }
            Ok(Token::new(id))
        })
    }
}

#[derive(Debug, Default)]
struct ImageScript {
    clone_error: Option<ScriptedError>,
    statuses: VecDeque<ImageStatus>,
    last_status: Option<ImageStatus>,
    retain_after_delete: bool,
    images: BTreeSet<String>,
    clone_calls: usize,
    delete_calls: Vec<String>,
}

/// Scripted [`ImageApi`] double.
///
/// Cloned images report the queued statuses in order, repeating the last
/// one. Deleted images read back as missing unless
/// [`ScriptedImages::retain_after_delete`] was called.
#[derive(Clone, Debug, Default)]
pub struct ScriptedImages {
    script: Arc<Mutex<ImageScript>>,
}

impl ScriptedImages {
    /// Creates a double whose images are pending until statuses are queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the status returned by the next `get_image`.
    pub fn push_status(&self, status: ImageStatus) {
        self.script.lock().statuses.push_back(status);
    }

    /// Makes `clone_from_node` fail with `error`.
    pub fn fail_clone(&self, error: ScriptedError) {
        self.script.lock().clone_error = Some(error);
    }

    /// Keeps images visible after a delete call.
    pub fn retain_after_delete(&self) {
        self.script.lock().retain_after_delete = true;
    }

    /// Registers an existing image.
    pub fn seed_image(&self, id: &str) {
        self.script.lock().images.insert(id.to_owned());
    }

    /// Number of `clone_from_node` calls.
    #[must_use]
    pub fn clone_calls(&self) -> usize {
        self.script.lock().clone_calls
    }

    /// Identifiers passed to `delete_image`.
    #[must_use]
    pub fn delete_calls(&self) -> Vec<String> {
        self.script.lock().delete_calls.clone()
    }
}

impl ImageApi for ScriptedImages {
    type Error = ScriptedError;

    fn clone_from_node<'a>(
        &'a self,
        node_id: &'a str,
        name: &'a str,
    ) -> ApiFuture<'a, ImageHandle, Self::Error> {
        let mut script = self.script.lock();
        script.clone_calls += 1;
        let result = script.clone_error.clone().map_or_else(
            || {
                let id = format!("image-{node_id}-{}", script.clone_calls);
                script.images.insert(id.clone());
                Ok(ImageHandle {
                    id,
                    name: name.to_owned(),
                })
            },
            Err,
        );
        Box::pin(std::future::ready(result))
    }

    fn get_image<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Option<ImageState>, Self::Error> {
        let mut script = self.script.lock();
        let result = if script.images.contains(id) {
            let queued = script.statuses.pop_front();
            let status = queued
                .or(script.last_status)
                .unwrap_or(ImageStatus::Pending);
            script.last_status = Some(status);
            Ok(Some(ImageState {
                id: id.to_owned(),
                status,
            }))
        } else {
            Ok(None)
        };
        Box::pin(std::future::ready(result))
    }

    fn delete_image<'a>(&'a self, id: &'a str) -> ApiFuture<'a, (), Self::Error> {
        let mut script = self.script.lock();
        script.delete_calls.push(id.to_owned());
        if !script.retain_after_delete {
            script.images.remove(id);
        }
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and clears environment variables while holding [`ENV_LOCK`].
    /// A `None` value removes the variable for the guard's lifetime.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe {
                match value {
                    Some(text) => env::set_var(key, text),
                    None => env::remove_var(key),
                }
            }
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
