//! Authentication strategies and token lifetimes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{AuthError, Credential, Token};
use crate::backend::ApiFuture;

/// Exchanges a credential for a token.
///
/// One implementation exists per credential type, for example a password
/// flow and an API access key flow.
pub trait Authenticator: Send + Sync {
    /// Credential type tag this strategy accepts.
    fn credential_type(&self) -> &str;

    /// Performs the authentication call.
    fn authenticate<'a>(&'a self, credential: &'a Credential) -> ApiFuture<'a, Token, AuthError>;
}

/// Authentication strategies indexed by the credential type they accept.
#[derive(Clone, Default)]
pub struct AuthMethods {
    methods: BTreeMap<String, Arc<dyn Authenticator>>,
}

impl AuthMethods {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `authenticator` under its credential type, replacing any
    /// previous strategy for that type.
    #[must_use]
    pub fn with(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.register(authenticator);
        self
    }

    /// Registers `authenticator` under its credential type.
    pub fn register(&mut self, authenticator: Arc<dyn Authenticator>) {
        self.methods
            .insert(authenticator.credential_type().to_owned(), authenticator);
    }

    /// Looks up the strategy for `credential_type`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedCredentialType`] listing every
    /// registered type when none matches.
    pub fn select(&self, credential_type: &str) -> Result<Arc<dyn Authenticator>, AuthError> {
        self.methods.get(credential_type).cloned().ok_or_else(|| {
            AuthError::UnsupportedCredentialType {
                requested: credential_type.to_owned(),
                supported: self.supported_types(),
            }
        })
    }

    /// Registered credential types, sorted.
    #[must_use]
    pub fn supported_types(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }
}

impl fmt::Debug for AuthMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthMethods")
            .field("supported", &self.supported_types())
            .finish()
    }
}

/// Cache lifetimes for common token kinds.
#[derive(Clone, Copy, Debug)]
pub struct TokenTtl;

impl TokenTtl {
    /// For OAuth style tokens with a 60 minute absolute validity.
    pub const OAUTH: Duration = Duration::from_secs(59 * 60);
    /// For session tokens.
    pub const SESSION: Duration = Duration::from_secs(11 * 60 * 60);
    /// Margin kept between cache expiry and the backend session interval.
    pub const SAFETY_MARGIN: Duration = Duration::from_secs(30);

    /// Cache lifetime for a backend session interval: the interval minus
    /// [`TokenTtl::SAFETY_MARGIN`] when it is longer than the margin,
    /// otherwise the interval itself.
    #[must_use]
    pub const fn for_session_interval(interval: Duration) -> Duration {
        if interval.as_nanos() > Self::SAFETY_MARGIN.as_nanos() {
            interval.saturating_sub(Self::SAFETY_MARGIN)
        } else {
            interval
        }
    }
}
