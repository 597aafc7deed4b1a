//! Organization context and its synchronisation with the committed profile.
//!
//! The organization context is strictly downstream of the profile stream:
//! every committed profile opens a resolve generation, and a resolve result
//! only commits if no newer profile commit (or explicit override) happened
//! in the meantime. Signing out clears the context synchronously, without a
//! round-trip to the resolver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expense_desk_core::{MembershipId, OrganizationId, Result as Reported, UserId};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{OrganizationResolveError, SessionError, StoreError};
use crate::lock;
use crate::profile::UserProfile;
use crate::role::Role;

/// An organization that expenses, budgets and vendors belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    /// Creates an organization stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: OrganizationId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A user's membership in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    /// The member's role within this organization.
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    /// Creates a membership of `user_id` in `organization`.
    #[must_use]
    pub fn new(organization: &Organization, user_id: UserId, role: Role) -> Self {
        Self {
            id: MembershipId::new(),
            organization_id: organization.id,
            user_id,
            role,
            joined_at: Utc::now(),
        }
    }
}

/// Where the organization context is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    /// No profile, or the last resolve failed.
    #[default]
    Empty,
    /// A resolve for the committed profile is outstanding.
    Pending,
    /// The user has a current organization.
    Resolved,
    /// The resolver reported that the user belongs to no organization.
    NoOrganization,
}

/// The currently selected organization and the user's membership in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationContext {
    pub current_organization: Option<Organization>,
    pub current_membership: Option<Membership>,
    pub status: ContextStatus,
}

impl OrganizationContext {
    fn resolved(organization: Organization, membership: Membership) -> Self {
        Self {
            current_organization: Some(organization),
            current_membership: Some(membership),
            status: ContextStatus::Resolved,
        }
    }

    fn no_organization() -> Self {
        Self {
            status: ContextStatus::NoOrganization,
            ..Self::default()
        }
    }

    /// Returns true if an organization is selected.
    #[must_use]
    pub fn has_organization(&self) -> bool {
        self.current_organization.is_some()
    }

    /// Returns true once a resolve has answered (either way) for the current profile.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            ContextStatus::Resolved | ContextStatus::NoOrganization
        )
    }
}

/// What the resolver reports for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedContext {
    pub current_organization: Option<Organization>,
    pub current_membership: Option<Membership>,
}

/// The organization/membership resolver.
///
/// `get_context` computes the context server-side; the push methods mirror
/// the coordinator's decision into the resolver's own cache.
#[async_trait]
pub trait OrganizationResolver: Send + Sync {
    /// Resolves the current organization context for a user.
    async fn get_context(&self, user_id: UserId) -> Result<ResolvedContext, StoreError>;

    /// Records the organization the coordinator selected.
    fn set_current_organization(&self, organization: &Organization, membership: &Membership);

    /// Forgets any selected organization.
    fn clear_current_organization(&self);
}

/// Proof that a resolve was started for a particular generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveTicket {
    generation: u64,
    user_id: UserId,
}

#[derive(Debug, Default)]
struct SyncState {
    generation: u64,
    user_id: Option<UserId>,
}

/// Keeps the organization context consistent with the committed profile.
pub struct OrganizationContextSync {
    resolver: Arc<dyn OrganizationResolver>,
    context: watch::Sender<OrganizationContext>,
    state: Mutex<SyncState>,
}

impl OrganizationContextSync {
    /// Creates a sync with an empty context.
    pub fn new(resolver: Arc<dyn OrganizationResolver>) -> Self {
        let (context, _) = watch::channel(OrganizationContext::default());
        Self {
            resolver,
            context,
            state: Mutex::new(SyncState::default()),
        }
    }

    /// Returns the current context snapshot.
    #[must_use]
    pub fn current(&self) -> OrganizationContext {
        self.context.borrow().clone()
    }

    /// Subscribes to context changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<OrganizationContext> {
        self.context.subscribe()
    }

    /// Returns true if an organization is currently selected.
    #[must_use]
    pub fn has_organization(&self) -> bool {
        self.context.borrow().has_organization()
    }

    /// Reacts to a committed profile change.
    ///
    /// A cleared profile clears the context immediately and returns `None`.
    /// A present profile marks the context pending and returns the ticket to
    /// resolve with. A different user's previous context is dropped right
    /// away so it can never be observed alongside the new profile.
    pub fn on_profile_committed(&self, profile: Option<&UserProfile>) -> Option<ResolveTicket> {
        let Some(profile) = profile else {
            self.clear();
            return None;
        };

        let mut state = lock(&self.state);
        state.generation += 1;
        let same_user = state.user_id == Some(profile.id);
        state.user_id = Some(profile.id);
        self.context.send_modify(|context| {
            if !same_user {
                *context = OrganizationContext::default();
            }
            context.status = ContextStatus::Pending;
        });
        Some(ResolveTicket {
            generation: state.generation,
            user_id: profile.id,
        })
    }

    /// Asks the resolver for the user's context.
    ///
    /// # Errors
    ///
    /// Returns `OrganizationResolveError` if the resolver fails or answers
    /// with only half of the context.
    pub async fn resolve(
        &self,
        ticket: ResolveTicket,
    ) -> Reported<ResolvedContext, OrganizationResolveError> {
        let user_id = ticket.user_id;
        let resolved = self.resolver.get_context(user_id).await.map_err(|e| {
            OrganizationResolveError::ResolverFailed {
                user_id,
                reason: e.reason,
            }
        })?;

        if resolved.current_organization.is_some() != resolved.current_membership.is_some() {
            return Err(OrganizationResolveError::IncompleteContext { user_id }.into());
        }
        Ok(resolved)
    }

    /// Commits a resolve result if its generation is still the newest.
    ///
    /// Failures leave the context cleared rather than stale.
    pub fn apply(
        &self,
        ticket: ResolveTicket,
        result: Reported<ResolvedContext, OrganizationResolveError>,
    ) -> bool {
        let next = {
            let state = lock(&self.state);
            if state.generation != ticket.generation {
                debug!(
                    user_id = %ticket.user_id,
                    generation = ticket.generation,
                    current = state.generation,
                    "discarding superseded organization resolve"
                );
                return false;
            }

            let next = match result {
                Ok(ResolvedContext {
                    current_organization: Some(organization),
                    current_membership: Some(membership),
                }) => OrganizationContext::resolved(organization, membership),
                Ok(_) => OrganizationContext::no_organization(),
                Err(e) => {
                    warn!(
                        user_id = %ticket.user_id,
                        error = %e,
                        "organization resolve failed, clearing context"
                    );
                    OrganizationContext::default()
                }
            };
            self.context.send_replace(next.clone());
            next
        };

        self.mirror(&next);
        true
    }

    /// Resolves and commits the context for a ticket.
    pub async fn sync(&self, ticket: ResolveTicket) -> bool {
        let result = self.resolve(ticket).await;
        self.apply(ticket, result)
    }

    /// Installs an organization the caller already knows about.
    ///
    /// The override counts as a completed resolve: any resolve started
    /// before it is discarded when it finishes.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` if no profile is committed.
    pub fn set_current_organization(
        &self,
        organization: Organization,
        membership: Membership,
    ) -> Reported<(), SessionError> {
        let next = {
            let mut state = lock(&self.state);
            let Some(user_id) = state.user_id else {
                return Err(SessionError::NotAuthenticated.into());
            };
            if membership.user_id != user_id {
                warn!(
                    user_id = %user_id,
                    member = %membership.user_id,
                    "installing organization with a membership for another user"
                );
            }
            state.generation += 1;
            let next = OrganizationContext::resolved(organization, membership);
            self.context.send_replace(next.clone());
            next
        };

        if let Some(organization) = &next.current_organization {
            info!(organization_id = %organization.id, "current organization set");
        }
        self.mirror(&next);
        Ok(())
    }

    /// Clears the context and invalidates every in-flight resolve.
    pub fn clear(&self) {
        let changed = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.user_id = None;
            self.context.send_if_modified(|context| {
                let changed = *context != OrganizationContext::default();
                *context = OrganizationContext::default();
                changed
            })
        };
        if changed {
            self.resolver.clear_current_organization();
        }
    }

    fn mirror(&self, context: &OrganizationContext) {
        match (&context.current_organization, &context.current_membership) {
            (Some(organization), Some(membership)) => {
                self.resolver
                    .set_current_organization(organization, membership);
            }
            _ => self.resolver.clear_current_organization(),
        }
    }
}
