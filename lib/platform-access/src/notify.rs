//! Outbound collaborators: user-visible notices and navigation.

use std::time::Duration;

/// Shows transient notices to the user.
pub trait Notifier: Send + Sync {
    /// Soft warning: the session will expire after `remaining` without activity.
    fn inactivity_warning(&self, remaining: Duration);

    /// Hard notice: the session expired and the user is being signed out.
    fn inactivity_expired(&self);
}

/// Moves the application to another route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}
