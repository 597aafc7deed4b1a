//! Authentication and session context coordination for expense-desk.
//!
//! This crate keeps a single consistent view of who is signed in, which
//! profile and role they have, which organization context applies, and
//! whether their session is still live, fed by independent asynchronous
//! sources:
//! - the identity provider (`IdentityProvider`)
//! - the profile store (`ProfileStore`), read through a generation-gated `ProfileLoader`
//! - the organization resolver (`OrganizationResolver`), kept downstream of the
//!   committed profile by `OrganizationContextSync`
//! - user activity, timed by `InactivityMonitor`
//!
//! Feature code reads the derived state through [`AuthCoordinator`] and never
//! mutates it directly.
//!
//! # Example
//!
//! ```
//! use expense_desk_platform_access::{AccessView, Role, UserProfile};
//! use expense_desk_core::UserId;
//!
//! let profile = UserProfile::new(UserId::new(), "alice@example.com", None, Role::Finance);
//! let access = AccessView::new(Some(&profile), false);
//!
//! assert!(access.is_finance_or_admin());
//! assert!(!access.is_admin());
//! assert_eq!(access.default_route(), "/organization/setup");
//! assert_eq!(access.landing_route(Some("/?returnUrl=/expenses")), "/organization/setup");
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod inactivity;
pub mod memory;
pub mod notify;
pub mod organization;
pub mod profile;
pub mod role;
pub mod routing;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export main types at crate root
pub use config::SessionConfig;
pub use coordinator::{AuthCoordinator, AuthOutcome, Collaborators};
pub use error::{
    NetworkError, OrganizationResolveError, ProfileFetchError, ProviderError, SessionError,
    StoreError,
};
pub use identity::{
    AuthSession, Credentials, Identity, IdentityProvider, ProviderResponse, Registration,
};
pub use inactivity::{
    ActivitySignal, InactivityMonitor, SessionPhase, SessionTimeoutState, TimeoutPolicy,
};
pub use notify::{Navigator, Notifier};
pub use organization::{
    ContextStatus, Membership, Organization, OrganizationContext, OrganizationContextSync,
    OrganizationResolver, ResolvedContext,
};
pub use profile::{ProfileLoader, ProfileStore, UserProfile};
pub use role::Role;
pub use routing::{AccessView, HOME_ROUTE, LOGIN_ROUTE, ORGANIZATION_SETUP_ROUTE};

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// Critical sections in this crate never await and never leave state half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
