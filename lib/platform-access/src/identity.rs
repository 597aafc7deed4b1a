//! Identity provider boundary.
//!
//! The identity provider verifies credentials, issues tokens, and publishes
//! the raw identity of whoever is signed in. The coordinator never patches an
//! [`Identity`]; each provider event supersedes the previous value wholesale.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expense_desk_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

use crate::error::{NetworkError, ProviderError};

/// The minimal user reference issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-issued user ID. Profiles are keyed by this value.
    pub id: UserId,
    /// Email address the user signed in with.
    pub email: String,
}

impl Identity {
    /// Creates an identity.
    #[must_use]
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }
}

/// Email/password credentials for signing in.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sign-up request. The full name is forwarded to the provider as user metadata.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

impl Registration {
    /// Creates a registration request.
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            full_name: full_name.into(),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("full_name", &self.full_name)
            .finish()
    }
}

/// Session material returned by a successful sign-in or sign-up.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: Identity,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The `{data, error}` shaped reply of every provider operation.
///
/// A reply whose `error` is set is a rejection regardless of `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse<T> {
    pub data: Option<T>,
    pub error: Option<ProviderError>,
}

impl<T> ProviderResponse<T> {
    /// A successful reply carrying data.
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// A reply rejected by the provider.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(ProviderError::new(message)),
        }
    }

    /// Converts the reply into a `Result`, treating any `error` as a rejection.
    pub fn into_result(self) -> Result<Option<T>, ProviderError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

impl ProviderResponse<()> {
    /// A successful reply with no payload.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Some(()),
            error: None,
        }
    }
}

/// The external identity provider.
///
/// `Err(NetworkError)` means the request never got an answer; a provider
/// rejection is an `Ok` reply whose `error` is set.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the current identity snapshot.
    fn current_identity(&self) -> Option<Identity>;

    /// Subscribes to identity changes. The receiver starts at the current value.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;

    /// Returns true if an identity is currently present.
    fn is_authenticated(&self) -> bool {
        self.current_identity().is_some()
    }

    /// Resolves once the provider has restored any persisted session.
    async fn session_initialized(&self);

    /// Signs in with email and password.
    async fn sign_in(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderResponse<AuthSession>, NetworkError>;

    /// Creates an account and signs in.
    async fn sign_up(
        &self,
        registration: &Registration,
    ) -> Result<ProviderResponse<AuthSession>, NetworkError>;

    /// Ends the remote session.
    async fn sign_out(&self) -> Result<ProviderResponse<()>, NetworkError>;

    /// Sends a password reset email.
    async fn reset_password(&self, email: &str) -> Result<ProviderResponse<()>, NetworkError>;

    /// Changes the signed-in user's password.
    async fn update_password(
        &self,
        new_password: &str,
    ) -> Result<ProviderResponse<()>, NetworkError>;
}
