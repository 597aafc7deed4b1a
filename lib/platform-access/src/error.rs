//! Error types for the platform-access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `NetworkError` / `ProviderError`: failures reported by the identity provider
//! - `ProfileFetchError`: profile lookups that cannot produce a record
//! - `OrganizationResolveError`: organization context lookups that failed
//! - `SessionError`: coordinator operations refused in the current state
//!
//! Only `NetworkError` and `ProviderError` ever reach a caller, and then only
//! as the message inside an [`AuthOutcome`](crate::coordinator::AuthOutcome).

use expense_desk_core::UserId;
use std::fmt;

/// Transport-level failure while talking to the identity provider.
///
/// The message is optional because not every transport failure carries one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkError {
    /// The failure message, if the transport supplied one.
    pub message: Option<String>,
}

impl NetworkError {
    /// Creates a network error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Creates a network error without a message.
    #[must_use]
    pub fn without_message() -> Self {
        Self { message: None }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "network error: {message}"),
            None => write!(f, "network error"),
        }
    }
}

impl std::error::Error for NetworkError {}

/// An identity operation rejected by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// The provider's user-facing message.
    pub message: String,
}

impl ProviderError {
    /// Creates a provider error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Failure reported by a backing record store (profiles, organizations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub reason: String,
}

impl StoreError {
    /// Creates a store error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store error: {}", self.reason)
    }
}

impl std::error::Error for StoreError {}

/// Errors from loading a user profile.
///
/// These never reach callers: the loader replaces the profile with a
/// provisional one and logs the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileFetchError {
    /// No profile row exists for the user.
    NotFound { user_id: UserId },
    /// The profile store could not be read.
    StoreUnavailable { user_id: UserId, reason: String },
    /// The store returned a profile belonging to a different user.
    IdentityMismatch { expected: UserId, actual: UserId },
}

impl fmt::Display for ProfileFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { user_id } => write!(f, "no profile found for {user_id}"),
            Self::StoreUnavailable { user_id, reason } => {
                write!(f, "profile lookup for {user_id} failed: {reason}")
            }
            Self::IdentityMismatch { expected, actual } => {
                write!(f, "profile lookup for {expected} returned profile {actual}")
            }
        }
    }
}

impl std::error::Error for ProfileFetchError {}

/// Errors from resolving the organization context of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganizationResolveError {
    /// The resolver could not be reached or failed.
    ResolverFailed { user_id: UserId, reason: String },
    /// The resolver returned an organization without a membership (or the reverse).
    IncompleteContext { user_id: UserId },
}

impl fmt::Display for OrganizationResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolverFailed { user_id, reason } => {
                write!(f, "organization resolve for {user_id} failed: {reason}")
            }
            Self::IncompleteContext { user_id } => {
                write!(
                    f,
                    "organization resolve for {user_id} returned an incomplete context"
                )
            }
        }
    }
}

impl std::error::Error for OrganizationResolveError {}

/// Errors from coordinator operations that require a particular session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No user profile is committed.
    NotAuthenticated,
    /// The coordinator has been disposed.
    Disposed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "user is not authenticated"),
            Self::Disposed => write!(f, "session coordinator has been disposed"),
        }
    }
}

impl std::error::Error for SessionError {}
