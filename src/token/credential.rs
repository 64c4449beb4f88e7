//! Credentials and the tokens exchanged for them.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Credential type tag for user name and password authentication.
pub const PASSWORD_CREDENTIALS: &str = "passwordCredentials";
/// Credential type tag for API access key authentication.
pub const API_ACCESS_KEY_CREDENTIALS: &str = "apiAccessKeyCredentials";

/// Identity and secret presented to an [`crate::token::Authenticator`].
///
/// Used as the token cache key. `Debug` never prints the secret.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Credential {
    credential_type: String,
    identity: String,
    secret: String,
}

impl Credential {
    /// Creates a credential tagged with `credential_type`.
    #[must_use]
    pub fn new(
        credential_type: impl Into<String>,
        identity: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            credential_type: credential_type.into(),
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    /// User name and password credential.
    #[must_use]
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(PASSWORD_CREDENTIALS, user, password)
    }

    /// API access key credential.
    #[must_use]
    pub fn api_access_key(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self::new(API_ACCESS_KEY_CREDENTIALS, access_key, secret_key)
    }

    /// Tag that selects the authentication strategy.
    #[must_use]
    pub fn credential_type(&self) -> &str {
        &self.credential_type
    }

    /// Public half of the credential; safe to log.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Secret half of the credential.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("credential_type", &self.credential_type)
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Bearer or session token returned by an authentication call.
#[derive(Clone, Eq, PartialEq)]
pub struct Token {
    id: String,
    valid_until: Option<Instant>,
}

impl Token {
    /// Token without a backend supplied expiry. It is valid for as long as
    /// the supplier's cache keeps it.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            valid_until: None,
        }
    }

    /// Token that the backend declared valid until `valid_until`.
    #[must_use]
    pub fn expiring_at(id: impl Into<String>, valid_until: Instant) -> Self {
        Self {
            id: id.into(),
            valid_until: Some(valid_until),
        }
    }

    /// Token that expires `lifetime` from now. A lifetime too large to
    /// represent yields a token without a backend expiry.
    #[must_use]
    pub fn expires_in(id: impl Into<String>, lifetime: Duration) -> Self {
        match Instant::now().checked_add(lifetime) {
            Some(valid_until) => Self::expiring_at(id, valid_until),
            None => Self::new(id),
        }
    }

    /// Opaque token value sent with API requests.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Backend supplied expiry, if any.
    #[must_use]
    pub const fn valid_until(&self) -> Option<Instant> {
        self.valid_until
    }

    /// Returns `true` once the backend supplied expiry has passed.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.valid_until.is_some_and(|until| now >= until)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id", &"<redacted>")
            .field("valid_until", &self.valid_until)
            .finish()
    }
}
