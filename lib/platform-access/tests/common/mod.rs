//! Shared fixtures for coordinator integration tests.

use expense_desk_core::UserId;
use expense_desk_platform_access::memory::{
    InMemoryIdentityProvider, InMemoryOrganizationResolver, InMemoryProfileStore,
    RecordingNavigator, RecordingNotifier,
};
use expense_desk_platform_access::{
    AuthCoordinator, AuthOutcome, Collaborators, Credentials, Identity, Membership, Organization,
    Role, SessionConfig, UserProfile,
};
use std::sync::Arc;
use std::time::Duration;

pub const PASSWORD: &str = "correct horse battery";

/// In-memory collaborators with handles kept for scripting and assertions.
pub struct Harness {
    pub identity: Arc<InMemoryIdentityProvider>,
    pub profiles: Arc<InMemoryProfileStore>,
    pub organizations: Arc<InMemoryOrganizationResolver>,
    pub notifier: Arc<RecordingNotifier>,
    pub navigator: Arc<RecordingNavigator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_identity(InMemoryIdentityProvider::new())
    }

    pub fn with_identity(identity: InMemoryIdentityProvider) -> Self {
        Self {
            identity: Arc::new(identity),
            profiles: Arc::new(InMemoryProfileStore::new()),
            organizations: Arc::new(InMemoryOrganizationResolver::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            navigator: Arc::new(RecordingNavigator::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            identity: self.identity.clone(),
            profiles: self.profiles.clone(),
            organizations: self.organizations.clone(),
            notifier: self.notifier.clone(),
            navigator: self.navigator.clone(),
        }
    }

    /// Starts a coordinator with the default 25/30 minute policy.
    pub fn start(&self) -> AuthCoordinator {
        AuthCoordinator::start(self.collaborators(), &SessionConfig::default())
    }

    /// Creates an account with a stored profile.
    pub fn add_user(&self, email: &str, role: Role) -> UserProfile {
        let identity = self.identity.add_account(email, PASSWORD);
        let profile = UserProfile::new(identity.id, email, Some(display_name(email)), role);
        self.profiles.insert(profile.clone());
        profile
    }

    /// Creates an organization and makes `user_id` a member of it.
    pub fn add_membership(&self, user_id: UserId, name: &str) -> (Organization, Membership) {
        let organization = Organization::new(name);
        let membership = Membership::new(&organization, user_id, Role::Admin);
        self.organizations
            .add_membership(organization.clone(), membership.clone());
        (organization, membership)
    }
}

pub fn identity_of(profile: &UserProfile) -> Identity {
    Identity::new(profile.id, profile.email.clone())
}

fn display_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

pub async fn sign_in(coordinator: &AuthCoordinator, email: &str) -> AuthOutcome {
    coordinator
        .sign_in(&Credentials::new(email, PASSWORD))
        .await
}

/// Polls `check` until it holds, failing the test after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

/// Lets spawned tasks run without moving past any pending timer of interest.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
