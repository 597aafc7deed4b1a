//! Role checks and landing-route decisions.
//!
//! Everything here is a pure function of the committed profile and
//! organization context; nothing performs I/O or holds state.

use crate::profile::UserProfile;
use crate::role::Role;

/// Where signed-out users are sent.
pub const LOGIN_ROUTE: &str = "/auth/login";
/// Landing page for users with an organization.
pub const HOME_ROUTE: &str = "/home";
/// Landing page for users who still need to create or join an organization.
pub const ORGANIZATION_SETUP_ROUTE: &str = "/organization/setup";

/// Returns the landing page for the organization state.
#[must_use]
pub fn default_route(has_organization: bool) -> &'static str {
    if has_organization {
        HOME_ROUTE
    } else {
        ORGANIZATION_SETUP_ROUTE
    }
}

/// Returns true for legacy root URLs: `/`, optionally followed by a query string.
///
/// Old bookmarks point at the root (sometimes with a `returnUrl`), which no
/// longer renders anything useful, so callers send these to [`default_route`].
#[must_use]
pub fn should_use_default_route(path: &str) -> bool {
    match path.strip_prefix('/') {
        Some(rest) => rest.is_empty() || rest.starts_with('?'),
        None => false,
    }
}

/// Read-only view over the committed session state.
#[derive(Debug, Clone, Copy)]
pub struct AccessView<'a> {
    profile: Option<&'a UserProfile>,
    has_organization: bool,
}

impl<'a> AccessView<'a> {
    #[must_use]
    pub fn new(profile: Option<&'a UserProfile>, has_organization: bool) -> Self {
        Self {
            profile,
            has_organization,
        }
    }

    #[must_use]
    pub fn user_role(&self) -> Option<Role> {
        self.profile.map(|p| p.role)
    }

    /// Returns true iff a profile is loaded and its role is `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.user_role() == Some(role)
    }

    #[must_use]
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.user_role().is_some_and(|r| roles.contains(&r))
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user_role().is_some_and(|r| r.is_admin())
    }

    #[must_use]
    pub fn is_finance_or_admin(&self) -> bool {
        self.user_role().is_some_and(|r| r.is_finance_or_admin())
    }

    #[must_use]
    pub fn has_organization(&self) -> bool {
        self.has_organization
    }

    #[must_use]
    pub fn default_route(&self) -> &'static str {
        default_route(self.has_organization)
    }

    /// Picks where to go after sign-in or invitation acceptance.
    ///
    /// The requested path wins unless it is missing, a legacy root URL, or
    /// not an app-relative path.
    #[must_use]
    pub fn landing_route(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim) {
            Some(path)
                if path.starts_with('/')
                    && !path.starts_with("//")
                    && !should_use_default_route(path) =>
            {
                path.to_string()
            }
            _ => self.default_route().to_string(),
        }
    }
}
