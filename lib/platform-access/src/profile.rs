//! User profiles and the generation-gated profile loader.
//!
//! The loader turns raw identities into committed [`UserProfile`] values.
//! Every identity change opens a new load generation and only the newest
//! generation may commit, so a slow fetch for a previous identity can never
//! overwrite what a later identity change produced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expense_desk_core::{Result as Reported, UserId};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{ProfileFetchError, StoreError};
use crate::identity::Identity;
use crate::lock;
use crate::role::Role;

/// Application-level user record, keyed by the identity ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Creates a profile stamped with the current time.
    #[must_use]
    pub fn new(
        id: UserId,
        email: impl Into<String>,
        full_name: Option<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            email: email.into(),
            full_name,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Synthesizes a stand-in profile when the stored record cannot be read.
    #[must_use]
    pub fn provisional(identity: &Identity, role: Role) -> Self {
        Self::new(identity.id, identity.email.clone(), None, role)
    }
}

/// Read access to stored profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Looks up a profile by user ID. `Ok(None)` means no row exists.
    async fn find_by_id(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError>;
}

/// Proof that a load was started for a particular generation.
///
/// Handed back to [`ProfileLoader::commit`], which refuses it once a newer
/// generation has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    user_id: UserId,
}

#[derive(Debug, Default)]
struct LoaderState {
    generation: u64,
    in_flight: Option<UserId>,
}

/// Loads profiles for identities and owns the committed profile stream.
pub struct ProfileLoader {
    store: Arc<dyn ProfileStore>,
    default_role: Role,
    profile: watch::Sender<Option<UserProfile>>,
    state: Mutex<LoaderState>,
}

impl ProfileLoader {
    /// Creates a loader with an empty profile stream.
    pub fn new(store: Arc<dyn ProfileStore>, default_role: Role) -> Self {
        let (profile, _) = watch::channel(None);
        Self {
            store,
            default_role,
            profile,
            state: Mutex::new(LoaderState::default()),
        }
    }

    /// Returns the last committed profile.
    #[must_use]
    pub fn current(&self) -> Option<UserProfile> {
        self.profile.borrow().clone()
    }

    /// Subscribes to committed profile changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<UserProfile>> {
        self.profile.subscribe()
    }

    /// Starts a load generation for an identity change.
    ///
    /// Returns `None` when a load for the same user is already in flight;
    /// that load will commit for both events.
    pub fn begin(&self, identity: &Identity) -> Option<LoadTicket> {
        let mut state = lock(&self.state);
        if state.in_flight == Some(identity.id) {
            debug!(user_id = %identity.id, "profile load already in flight");
            return None;
        }
        Some(Self::advance(&mut state, identity.id))
    }

    /// Starts a load generation unconditionally, superseding any in-flight load.
    pub fn begin_refresh(&self, identity: &Identity) -> LoadTicket {
        Self::advance(&mut lock(&self.state), identity.id)
    }

    fn advance(state: &mut LoaderState, user_id: UserId) -> LoadTicket {
        state.generation += 1;
        state.in_flight = Some(user_id);
        LoadTicket {
            generation: state.generation,
            user_id,
        }
    }

    /// Fetches the stored profile for an identity.
    ///
    /// # Errors
    ///
    /// Returns `ProfileFetchError` if the row is missing, unreadable, or
    /// belongs to another user.
    pub async fn fetch(
        &self,
        identity: &Identity,
    ) -> Reported<UserProfile, ProfileFetchError> {
        let user_id = identity.id;
        let found = self
            .store
            .find_by_id(user_id)
            .await
            .map_err(|e| ProfileFetchError::StoreUnavailable {
                user_id,
                reason: e.reason,
            })?;

        let profile = found.ok_or(ProfileFetchError::NotFound { user_id })?;
        if profile.id != user_id {
            return Err(ProfileFetchError::IdentityMismatch {
                expected: user_id,
                actual: profile.id,
            }
            .into());
        }
        Ok(profile)
    }

    /// Fetches the profile, falling back to a provisional one on failure.
    pub async fn load(&self, identity: &Identity) -> UserProfile {
        match self.fetch(identity).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(
                    user_id = %identity.id,
                    error = %e,
                    "profile fetch failed, using provisional profile"
                );
                UserProfile::provisional(identity, self.default_role)
            }
        }
    }

    /// Commits a loaded profile if its generation is still the newest.
    ///
    /// Returns false (and leaves the stream untouched) for a stale ticket.
    pub fn commit(&self, ticket: LoadTicket, profile: UserProfile) -> bool {
        let mut state = lock(&self.state);
        if state.generation != ticket.generation {
            debug!(
                user_id = %ticket.user_id,
                generation = ticket.generation,
                current = state.generation,
                "discarding superseded profile load"
            );
            return false;
        }
        state.in_flight = None;
        self.profile.send_replace(Some(profile));
        true
    }

    /// Clears the committed profile and invalidates every in-flight load.
    ///
    /// Returns true if a profile was present.
    pub fn clear(&self) -> bool {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.in_flight = None;
        self.profile.send_if_modified(|profile| profile.take().is_some())
    }
}
