//! In-memory collaborators.
//!
//! These back the console binary and the tests. They behave like the real
//! services at the contract level (provider rejections, missing rows,
//! transport failures) without any network.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use expense_desk_core::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{NetworkError, StoreError};
use crate::identity::{
    AuthSession, Credentials, Identity, IdentityProvider, ProviderResponse, Registration,
};
use crate::lock;
use crate::notify::{Navigator, Notifier};
use crate::organization::{Membership, Organization, OrganizationResolver, ResolvedContext};
use crate::profile::{ProfileStore, UserProfile};

const OFFLINE: &str = "Failed to fetch";

#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password: String,
    /// Sign-up metadata.
    full_name: Option<String>,
}

/// Identity provider backed by an in-memory account table.
pub struct InMemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    identity: watch::Sender<Option<Identity>>,
    initialized: watch::Sender<bool>,
    offline: AtomicBool,
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentityProvider {
    /// Creates a provider with no accounts and an initialised session.
    #[must_use]
    pub fn new() -> Self {
        let (identity, _) = watch::channel(None);
        let (initialized, _) = watch::channel(true);
        Self {
            accounts: Mutex::new(HashMap::new()),
            identity,
            initialized,
            offline: AtomicBool::new(false),
        }
    }

    /// Creates a provider that is still restoring its session.
    #[must_use]
    pub fn uninitialized() -> Self {
        let provider = Self::new();
        provider.initialized.send_replace(false);
        provider
    }

    /// Marks the persisted session as restored.
    pub fn mark_initialized(&self) {
        self.initialized.send_replace(true);
    }

    /// Adds an account and returns its identity.
    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        self.insert_account(email, password, None)
    }

    fn insert_account(&self, email: &str, password: &str, full_name: Option<String>) -> Identity {
        let identity = Identity::new(UserId::new(), email);
        lock(&self.accounts).insert(
            email.to_string(),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
                full_name,
            },
        );
        identity
    }

    /// Returns the full name recorded at sign-up.
    #[must_use]
    pub fn full_name(&self, email: &str) -> Option<String> {
        lock(&self.accounts)
            .get(email)
            .and_then(|account| account.full_name.clone())
    }

    /// Makes every operation fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Publishes an identity event directly (e.g. a token refresh or a
    /// session restored in another tab).
    pub fn emit(&self, identity: Option<Identity>) {
        self.identity.send_replace(identity);
    }

    fn check_online(&self) -> Result<(), NetworkError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::new(OFFLINE));
        }
        Ok(())
    }

    fn open_session(&self, identity: Identity) -> AuthSession {
        self.identity.send_replace(Some(identity.clone()));
        AuthSession {
            user: identity,
            access_token: format!("tok_{}", UserId::new().as_ulid()),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        }
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    fn current_identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    async fn session_initialized(&self) {
        let mut initialized = self.initialized.subscribe();
        // The sender lives as long as `self`, so this cannot fail while borrowed.
        let _ = initialized.wait_for(|ready| *ready).await;
    }

    async fn sign_in(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderResponse<AuthSession>, NetworkError> {
        self.check_online()?;
        let account = lock(&self.accounts).get(&credentials.email).cloned();
        match account {
            Some(account) if account.password == credentials.password => {
                Ok(ProviderResponse::ok(self.open_session(account.identity)))
            }
            _ => Ok(ProviderResponse::rejected("Invalid login credentials")),
        }
    }

    async fn sign_up(
        &self,
        registration: &Registration,
    ) -> Result<ProviderResponse<AuthSession>, NetworkError> {
        self.check_online()?;
        if lock(&self.accounts).contains_key(&registration.email) {
            return Ok(ProviderResponse::rejected("User already registered"));
        }
        let identity = self.insert_account(
            &registration.email,
            &registration.password,
            Some(registration.full_name.clone()),
        );
        Ok(ProviderResponse::ok(self.open_session(identity)))
    }

    async fn sign_out(&self) -> Result<ProviderResponse<()>, NetworkError> {
        self.check_online()?;
        self.identity.send_replace(None);
        Ok(ProviderResponse::empty())
    }

    async fn reset_password(&self, _email: &str) -> Result<ProviderResponse<()>, NetworkError> {
        self.check_online()?;
        // Unknown addresses succeed too, so the reply never reveals which accounts exist.
        Ok(ProviderResponse::empty())
    }

    async fn update_password(
        &self,
        new_password: &str,
    ) -> Result<ProviderResponse<()>, NetworkError> {
        self.check_online()?;
        let Some(identity) = self.current_identity() else {
            return Ok(ProviderResponse::rejected("Auth session missing!"));
        };
        match lock(&self.accounts).get_mut(&identity.email) {
            Some(account) => {
                account.password = new_password.to_string();
                Ok(ProviderResponse::empty())
            }
            None => Ok(ProviderResponse::rejected("User not found")),
        }
    }
}

/// Profile table with optional per-user latency and failures.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: Mutex<HashMap<UserId, UserProfile>>,
    latency: Mutex<HashMap<UserId, Duration>>,
    failing: Mutex<HashMap<UserId, String>>,
    lookups: AtomicUsize,
}

impl InMemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        lock(&self.profiles).insert(profile.id, profile);
    }

    /// Delays lookups for one user.
    pub fn set_latency(&self, user_id: UserId, latency: Duration) {
        lock(&self.latency).insert(user_id, latency);
    }

    /// Makes lookups for one user fail.
    pub fn fail_for(&self, user_id: UserId, reason: &str) {
        lock(&self.failing).insert(user_id, reason.to_string());
    }

    /// Returns how many lookups have been served.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn find_by_id(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let latency = lock(&self.latency).get(&user_id).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(reason) = lock(&self.failing).get(&user_id) {
            return Err(StoreError::new(reason.clone()));
        }
        Ok(lock(&self.profiles).get(&user_id).cloned())
    }
}

/// Organization resolver with a per-user membership table.
#[derive(Default)]
pub struct InMemoryOrganizationResolver {
    contexts: Mutex<HashMap<UserId, (Organization, Membership)>>,
    latency: Mutex<Option<Duration>>,
    failing: AtomicBool,
    current: Mutex<Option<(Organization, Membership)>>,
}

impl InMemoryOrganizationResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `membership` as the user's current organization.
    pub fn add_membership(&self, organization: Organization, membership: Membership) {
        lock(&self.contexts).insert(membership.user_id, (organization, membership));
    }

    /// Delays every resolve.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    /// Makes every resolve fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the organization last pushed by the coordinator.
    #[must_use]
    pub fn current(&self) -> Option<Organization> {
        lock(&self.current).as_ref().map(|(org, _)| org.clone())
    }
}

#[async_trait]
impl OrganizationResolver for InMemoryOrganizationResolver {
    async fn get_context(&self, user_id: UserId) -> Result<ResolvedContext, StoreError> {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::new("organization service unavailable"));
        }
        Ok(match lock(&self.contexts).get(&user_id).cloned() {
            Some((organization, membership)) => ResolvedContext {
                current_organization: Some(organization),
                current_membership: Some(membership),
            },
            None => ResolvedContext::default(),
        })
    }

    fn set_current_organization(&self, organization: &Organization, membership: &Membership) {
        lock(&self.contexts).insert(
            membership.user_id,
            (organization.clone(), membership.clone()),
        );
        *lock(&self.current) = Some((organization.clone(), membership.clone()));
    }

    fn clear_current_organization(&self) {
        *lock(&self.current) = None;
    }
}

/// Notifier that records every notice.
#[derive(Default)]
pub struct RecordingNotifier {
    warnings: Mutex<Vec<Duration>>,
    expiries: AtomicUsize,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining durations carried by each warning, oldest first.
    #[must_use]
    pub fn warnings(&self) -> Vec<Duration> {
        lock(&self.warnings).clone()
    }

    #[must_use]
    pub fn expiries(&self) -> usize {
        self.expiries.load(Ordering::SeqCst)
    }
}

impl Notifier for RecordingNotifier {
    fn inactivity_warning(&self, remaining: Duration) {
        lock(&self.warnings).push(remaining);
    }

    fn inactivity_expired(&self) {
        self.expiries.fetch_add(1, Ordering::SeqCst);
    }
}

/// Navigator that records every navigation.
#[derive(Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn visits(&self) -> Vec<String> {
        lock(&self.visits).clone()
    }

    /// Counts navigations to `path`.
    #[must_use]
    pub fn count(&self, path: &str) -> usize {
        lock(&self.visits).iter().filter(|p| *p == path).count()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        lock(&self.visits).push(path.to_string());
    }
}
