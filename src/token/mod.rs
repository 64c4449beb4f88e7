//! Cached authentication tokens.
//!
//! [`TokenSupplier`] answers "give me a current token" by consulting a
//! [`KeyedCache`] keyed by the active credential. A miss triggers one
//! authentication call no matter how many tasks asked concurrently, and a
//! failed authentication is never cached.

mod credential;
mod strategy;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::KeyedCache;

pub use credential::{API_ACCESS_KEY_CREDENTIALS, Credential, PASSWORD_CREDENTIALS, Token};
pub use strategy::{AuthMethods, Authenticator, TokenTtl};

/// Errors raised while obtaining a token.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AuthError {
    /// Raised when the backend rejected the credential.
    #[error("authentication failed for {identity}: {message}")]
    AuthenticationFailed {
        /// Identity half of the rejected credential.
        identity: String,
        /// Backend supplied reason.
        message: String,
    },
    /// Raised when no strategy handles the credential's type.
    #[error(
        "credential type {requested} is not supported; supported types: {}",
        .supported.join(", ")
    )]
    UnsupportedCredentialType {
        /// Type carried by the credential.
        requested: String,
        /// Types a strategy exists for.
        supported: Vec<String>,
    },
    /// Raised when a freshly issued token is already past its expiry.
    #[error("backend issued an already expired token for {identity}")]
    ExpiredToken {
        /// Identity the token was issued for.
        identity: String,
    },
    /// Raised when the authentication call failed for reasons other than
    /// the credential itself.
    #[error("authentication backend error: {message}")]
    Provider {
        /// Description of the failure.
        message: String,
    },
}

/// Supplies a current, non-expired token for one credential at a time.
pub struct TokenSupplier {
    authenticator: Arc<dyn Authenticator>,
    credential: RwLock<Credential>,
    cache: KeyedCache<Credential, Token, AuthError>,
}

impl TokenSupplier {
    /// Creates a supplier that authenticates `credential` through
    /// `authenticator` and caches tokens for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedCredentialType`] when the credential's
    /// type differs from the one `authenticator` accepts.
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        credential: Credential,
        ttl: Duration,
    ) -> Result<Self, AuthError> {
        ensure_supported(authenticator.as_ref(), &credential)?;
        Ok(Self {
            authenticator,
            credential: RwLock::new(credential),
            cache: KeyedCache::with_ttl(ttl),
        })
    }

    /// Creates a supplier whose strategy is picked from `methods` by the
    /// credential's type.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedCredentialType`] when `methods` has no
    /// strategy for the credential.
    pub fn from_methods(
        methods: &AuthMethods,
        credential: Credential,
        ttl: Duration,
    ) -> Result<Self, AuthError> {
        let authenticator = methods.select(credential.credential_type())?;
        Self::new(authenticator, credential, ttl)
    }

    /// Cache lifetime applied to tokens without their own expiry.
    #[must_use]
    pub const fn ttl(&self) -> Option<Duration> {
        self.cache.ttl()
    }

    /// Returns a current token, authenticating when none is cached.
    ///
    /// A cached token whose backend expiry has passed is dropped and the
    /// credential is authenticated once more.
    ///
    /// # Errors
    ///
    /// Propagates the authenticator's error. Returns
    /// [`AuthError::ExpiredToken`] when even a fresh token is already
    /// expired.
    pub async fn current_token(&self) -> Result<Token, AuthError> {
        let credential = self.credential.read().clone();
        let token = self.load(&credential).await?;
        if !token.is_expired_at(Instant::now()) {
            return Ok(token);
        }

        debug!(
            identity = credential.identity(),
            "cached token expired before its cache entry; re-authenticating"
        );
        self.cache
            .invalidate_if(&credential, |cached| cached.id() == token.id());
        let fresh = self.load(&credential).await?;
        if fresh.is_expired_at(Instant::now()) {
            warn!(
                identity = credential.identity(),
                "backend issued an expired token"
            );
            self.cache.invalidate(&credential);
            return Err(AuthError::ExpiredToken {
                identity: credential.identity().to_owned(),
            });
        }
        Ok(fresh)
    }

    /// Returns the cached token without authenticating.
    #[must_use]
    pub fn cached_token(&self) -> Option<Token> {
        let credential = self.credential.read();
        self.cache
            .peek(&credential)
            .filter(|token| !token.is_expired_at(Instant::now()))
    }

    /// Drops the cached token so the next call re-authenticates, for example
    /// after the backend rejected the token.
    pub fn invalidate(&self) {
        let credential = self.credential.read();
        self.cache.invalidate(&credential);
    }

    /// Switches to `credential` and drops the token cached for the previous
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedCredentialType`] and keeps the current
    /// credential when `credential` does not match the strategy.
    pub fn rotate(&self, credential: Credential) -> Result<(), AuthError> {
        ensure_supported(self.authenticator.as_ref(), &credential)?;
        let previous = std::mem::replace(&mut *self.credential.write(), credential);
        self.cache.invalidate(&previous);
        debug!(identity = previous.identity(), "credential rotated");
        Ok(())
    }

    async fn load(&self, credential: &Credential) -> Result<Token, AuthError> {
        let authenticator = Arc::clone(&self.authenticator);
        self.cache
            .get(credential.clone(), move |key| async move {
                debug!(identity = key.identity(), "authenticating");
                authenticator.authenticate(&key).await
            })
            .await
    }
}

impl std::fmt::Debug for TokenSupplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSupplier")
            .field("credential_type", &self.authenticator.credential_type())
            .field("identity", &self.credential.read().identity())
            .field("cache", &self.cache)
            .finish()
    }
}

fn ensure_supported(
    authenticator: &dyn Authenticator,
    credential: &Credential,
) -> Result<(), AuthError> {
    if authenticator.credential_type() == credential.credential_type() {
        return Ok(());
    }
    Err(AuthError::UnsupportedCredentialType {
        requested: credential.credential_type().to_owned(),
        supported: vec![authenticator.credential_type().to_owned()],
    })
}
