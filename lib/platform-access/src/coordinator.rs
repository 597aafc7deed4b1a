//! The session coordinator facade.
//!
//! [`AuthCoordinator`] wires the identity provider into the profile loader,
//! the organization context sync, and the inactivity monitor, and exposes
//! the only supported way to read or change that state.
//!
//! Pipeline:
//!
//! ```text
//! identity stream ──► ProfileLoader ──► committed profile ──► OrganizationContextSync
//!                                              │
//!                                              └──► InactivityMonitor ──► expiry ──► sign-out
//! ```
//!
//! The identity listener only reacts to the newest identity; intermediate
//! values that arrive while it is busy are coalesced, which is safe because
//! only the newest load generation may commit anyway.

use expense_desk_core::{Result as Reported, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::error::{NetworkError, SessionError};
use crate::identity::{
    AuthSession, Credentials, Identity, IdentityProvider, ProviderResponse, Registration,
};
use crate::inactivity::{ActivitySignal, InactivityMonitor, SessionPhase, TimeoutPolicy};
use crate::lock;
use crate::notify::{Navigator, Notifier};
use crate::organization::{
    Membership, Organization, OrganizationContext, OrganizationContextSync, OrganizationResolver,
};
use crate::profile::{LoadTicket, ProfileLoader, ProfileStore, UserProfile};
use crate::role::Role;
use crate::routing::{self, AccessView, LOGIN_ROUTE};

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";
const PASSWORD_RESET_FAILED: &str = "Password reset failed";
const PASSWORD_UPDATE_FAILED: &str = "Password update failed";

/// Normalised result of a credential operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    /// Message to show in the calling form when `success` is false.
    pub error: Option<String>,
}

impl AuthOutcome {
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }

    /// Folds a provider reply into an outcome.
    ///
    /// Provider rejections keep the provider's message; transport failures
    /// use their own message when they have one, else `fallback`.
    fn from_reply<T>(
        operation: &'static str,
        reply: Result<ProviderResponse<T>, NetworkError>,
        fallback: &str,
    ) -> Self {
        match reply.map(ProviderResponse::into_result) {
            Ok(Ok(_)) => Self::succeeded(),
            Ok(Err(rejection)) => {
                info!(operation, reason = %rejection, "identity provider rejected request");
                Self::failed(rejection.message)
            }
            Err(e) => {
                warn!(operation, error = %e, "identity provider unreachable");
                Self::failed(
                    e.message
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| fallback.to_string()),
                )
            }
        }
    }
}

/// External collaborators the coordinator is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub organizations: Arc<dyn OrganizationResolver>,
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
}

struct CoordinatorInner {
    identity: Arc<dyn IdentityProvider>,
    profiles: ProfileLoader,
    organizations: OrganizationContextSync,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    policy: TimeoutPolicy,
    /// Only populated while a profile is committed.
    monitor: Mutex<Option<InactivityMonitor>>,
    /// Held across every transition of the committed profile, the monitor
    /// and the organization context so they change together. Taken before
    /// any stage lock.
    session: Mutex<()>,
    expired_tx: mpsc::UnboundedSender<UserId>,
    disposed: AtomicBool,
}

impl CoordinatorInner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn on_identity(self: &Arc<Self>, identity: Option<Identity>) {
        if self.is_disposed() {
            return;
        }
        let Some(identity) = identity else {
            self.clear_local_session();
            return;
        };

        // A different user must never be observed next to the old profile.
        if self
            .profiles
            .current()
            .is_some_and(|profile| profile.id != identity.id)
        {
            self.clear_local_session();
        }

        if let Some(ticket) = self.profiles.begin(&identity) {
            self.spawn_load(ticket, identity);
        }
    }

    fn spawn_load(self: &Arc<Self>, ticket: LoadTicket, identity: Identity) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let profile = inner.profiles.load(&identity).await;
            inner.commit_profile(ticket, profile);
        });
    }

    fn commit_profile(self: &Arc<Self>, ticket: LoadTicket, profile: UserProfile) {
        let resolve = {
            let _session = lock(&self.session);
            if self.is_disposed() || !self.profiles.commit(ticket, profile.clone()) {
                return;
            }
            info!(user_id = %profile.id, role = %profile.role, "user profile committed");
            self.ensure_monitor(profile.id);
            self.organizations.on_profile_committed(Some(&profile))
        };

        if let Some(resolve) = resolve {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                let result = inner.organizations.resolve(resolve).await;
                let _session = lock(&inner.session);
                if !inner.is_disposed() {
                    inner.organizations.apply(resolve, result);
                }
            });
        }
    }

    fn ensure_monitor(&self, user_id: UserId) {
        let mut monitor = lock(&self.monitor);
        if monitor.as_ref().is_some_and(|m| m.user_id() == user_id) {
            return;
        }
        *monitor = Some(InactivityMonitor::start(
            user_id,
            self.policy,
            Arc::clone(&self.notifier),
            self.expired_tx.clone(),
        ));
    }

    /// Starts a fresh inactivity clock if `user_id` is the monitored user.
    fn restart_monitor(&self, user_id: UserId) {
        let _session = lock(&self.session);
        if self.is_disposed() {
            return;
        }
        let mut monitor = lock(&self.monitor);
        if monitor.as_ref().is_some_and(|m| m.user_id() == user_id) {
            *monitor = Some(InactivityMonitor::start(
                user_id,
                self.policy,
                Arc::clone(&self.notifier),
                self.expired_tx.clone(),
            ));
            debug!(user_id = %user_id, "inactivity clock restarted for new sign-in");
        }
    }

    /// Clears profile, organization context and the inactivity clock.
    fn clear_local_session(&self) {
        let _session = lock(&self.session);
        let had_profile = self.profiles.clear();
        self.organizations.on_profile_committed(None);
        drop(lock(&self.monitor).take());
        if had_profile {
            info!("session cleared");
        }
    }

    async fn sign_out(&self) {
        self.clear_local_session();
        match self.identity.sign_out().await.map(ProviderResponse::into_result) {
            Ok(Ok(_)) => debug!("remote sign-out completed"),
            Ok(Err(rejection)) => warn!(reason = %rejection, "remote sign-out rejected"),
            Err(e) => warn!(error = %e, "remote sign-out failed"),
        }
        self.navigator.navigate(LOGIN_ROUTE);
    }
}

/// Coordinates who is signed in, their profile, organization context and
/// session liveness.
///
/// Construct with [`AuthCoordinator::start`] inside a tokio runtime. All
/// reads are synchronous snapshots of committed state; all mutation goes
/// through the methods below. Dropping the coordinator disposes it.
pub struct AuthCoordinator {
    inner: Arc<CoordinatorInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AuthCoordinator {
    /// Builds the coordinator and starts listening to the identity provider.
    ///
    /// The first identity is processed once the provider reports that its
    /// session is initialised.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(collaborators: Collaborators, config: &SessionConfig) -> Self {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(CoordinatorInner {
            identity: collaborators.identity,
            profiles: ProfileLoader::new(collaborators.profiles, config.default_role),
            organizations: OrganizationContextSync::new(collaborators.organizations),
            notifier: collaborators.notifier,
            navigator: collaborators.navigator,
            policy: config.timeout_policy(),
            monitor: Mutex::new(None),
            session: Mutex::new(()),
            expired_tx,
            disposed: AtomicBool::new(false),
        });

        let tasks = vec![
            tokio::spawn(run_identity_listener(Arc::clone(&inner))),
            tokio::spawn(run_expiry_listener(Arc::clone(&inner), expired_rx)),
        ];
        debug!("session coordinator started");

        Self {
            inner,
            tasks: Mutex::new(tasks),
        }
    }

    /// Waits until the identity provider has restored any persisted session.
    pub async fn wait_until_ready(&self) {
        self.inner.identity.session_initialized().await;
    }

    /// Stops every task and timer. Safe to call more than once.
    ///
    /// Loads and resolves still in flight are discarded when they finish.
    pub fn dispose(&self) {
        {
            let _session = lock(&self.inner.session);
            if self.inner.disposed.swap(true, Ordering::SeqCst) {
                return;
            }
            drop(lock(&self.inner.monitor).take());
        }
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        debug!("session coordinator disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    // Credential operations

    /// Signs in with email and password.
    ///
    /// A successful sign-in always starts a fresh inactivity clock, also
    /// when the same user was already signed in.
    #[instrument(skip_all, fields(email = %credentials.email))]
    pub async fn sign_in(&self, credentials: &Credentials) -> AuthOutcome {
        let reply = self.inner.identity.sign_in(credentials).await;
        self.open_session(reply, "sign_in", LOGIN_FAILED)
    }

    /// Creates an account and signs it in.
    #[instrument(skip_all, fields(email = %registration.email))]
    pub async fn register(&self, registration: &Registration) -> AuthOutcome {
        let reply = self.inner.identity.sign_up(registration).await;
        self.open_session(reply, "register", REGISTRATION_FAILED)
    }

    fn open_session(
        &self,
        reply: Result<ProviderResponse<AuthSession>, NetworkError>,
        operation: &'static str,
        fallback: &str,
    ) -> AuthOutcome {
        let user_id = match &reply {
            Ok(ProviderResponse {
                data: Some(session),
                error: None,
            }) => Some(session.user.id),
            _ => None,
        };
        let outcome = AuthOutcome::from_reply(operation, reply, fallback);
        if let Some(user_id) = user_id {
            self.inner.restart_monitor(user_id);
        }
        outcome
    }

    /// Sends a password reset email.
    #[instrument(skip(self))]
    pub async fn reset_password(&self, email: &str) -> AuthOutcome {
        let reply = self.inner.identity.reset_password(email).await;
        AuthOutcome::from_reply("reset_password", reply, PASSWORD_RESET_FAILED)
    }

    /// Changes the signed-in user's password.
    #[instrument(skip_all)]
    pub async fn update_password(&self, new_password: &str) -> AuthOutcome {
        let reply = self.inner.identity.update_password(new_password).await;
        AuthOutcome::from_reply("update_password", reply, PASSWORD_UPDATE_FAILED)
    }

    /// Signs out and navigates to the login route.
    ///
    /// Local state is cleared even if the provider can't be reached.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        self.inner.sign_out().await;
    }

    /// Reloads the committed user's profile. No-op when signed out.
    ///
    /// The provider's identity must still be the committed user; a sign-out
    /// whose remote call failed leaves the provider holding a stale identity.
    #[instrument(skip(self))]
    pub async fn refresh_user_profile(&self) {
        let Some(identity) = self.inner.identity.current_identity() else {
            debug!("no identity, skipping profile refresh");
            return;
        };
        let ticket = {
            let _session = lock(&self.inner.session);
            if self.is_disposed() || self.current_user_id() != Some(identity.id) {
                debug!(
                    user_id = %identity.id,
                    "no matching committed profile, skipping refresh"
                );
                return;
            }
            self.inner.profiles.begin_refresh(&identity)
        };
        let profile = self.inner.profiles.load(&identity).await;
        self.inner.commit_profile(ticket, profile);
    }

    // Activity

    /// Records qualifying user activity.
    ///
    /// Returns false when no session is being monitored.
    pub fn record_activity(&self, signal: ActivitySignal) -> bool {
        let monitor = lock(&self.inner.monitor);
        match monitor.as_ref() {
            Some(monitor) => {
                let accepted = monitor.record_activity();
                if accepted {
                    debug!(signal = %signal, "activity recorded");
                }
                accepted
            }
            None => false,
        }
    }

    /// Records a raw UI event if it is on the activity allow-list.
    pub fn record_activity_event(&self, event_name: &str) -> bool {
        ActivitySignal::from_event_name(event_name)
            .is_some_and(|signal| self.record_activity(signal))
    }

    /// Returns the inactivity phase, or `None` while nobody is signed in.
    #[must_use]
    pub fn session_phase(&self) -> Option<SessionPhase> {
        lock(&self.inner.monitor).as_ref().map(InactivityMonitor::phase)
    }

    /// Returns the idle time left before expiry, or `None` while nobody is signed in.
    #[must_use]
    pub fn time_until_expiry(&self) -> Option<Duration> {
        lock(&self.inner.monitor)
            .as_ref()
            .map(InactivityMonitor::time_until_expiry)
    }

    // Profile reads

    #[must_use]
    pub fn current_user_profile(&self) -> Option<UserProfile> {
        self.inner.profiles.current()
    }

    #[must_use]
    pub fn current_user_id(&self) -> Option<UserId> {
        self.current_user_profile().map(|p| p.id)
    }

    /// Live profile stream, starting with the current value.
    #[must_use]
    pub fn user_profile_stream(&self) -> WatchStream<Option<UserProfile>> {
        WatchStream::new(self.inner.profiles.subscribe())
    }

    /// Returns true while a profile is committed.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current_user_profile().is_some()
    }

    // Organization context

    #[must_use]
    pub fn organization_context(&self) -> OrganizationContext {
        self.inner.organizations.current()
    }

    #[must_use]
    pub fn subscribe_organization_context(&self) -> watch::Receiver<OrganizationContext> {
        self.inner.organizations.subscribe()
    }

    #[must_use]
    pub fn current_organization(&self) -> Option<Organization> {
        self.organization_context().current_organization
    }

    #[must_use]
    pub fn current_membership(&self) -> Option<Membership> {
        self.organization_context().current_membership
    }

    #[must_use]
    pub fn has_organization(&self) -> bool {
        self.inner.organizations.has_organization()
    }

    /// Installs an organization the caller just created or joined.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` if nobody is signed in, or
    /// `SessionError::Disposed` after disposal.
    pub fn set_current_organization(
        &self,
        organization: Organization,
        membership: Membership,
    ) -> Reported<(), SessionError> {
        if self.is_disposed() {
            return Err(SessionError::Disposed.into());
        }
        self.inner
            .organizations
            .set_current_organization(organization, membership)
    }

    // Roles and routes

    fn with_access<R>(&self, f: impl FnOnce(AccessView<'_>) -> R) -> R {
        let profile = self.current_user_profile();
        f(AccessView::new(profile.as_ref(), self.has_organization()))
    }

    #[must_use]
    pub fn user_role(&self) -> Option<Role> {
        self.with_access(|access| access.user_role())
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.with_access(|access| access.has_role(role))
    }

    #[must_use]
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.with_access(|access| access.has_any_role(roles))
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.with_access(|access| access.is_admin())
    }

    #[must_use]
    pub fn is_finance_or_admin(&self) -> bool {
        self.with_access(|access| access.is_finance_or_admin())
    }

    #[must_use]
    pub fn default_route(&self) -> &'static str {
        routing::default_route(self.has_organization())
    }

    #[must_use]
    pub fn should_use_default_route(&self, path: &str) -> bool {
        routing::should_use_default_route(path)
    }

    /// Picks the post-login or post-invitation redirect target.
    #[must_use]
    pub fn landing_route(&self, requested: Option<&str>) -> String {
        self.with_access(|access| access.landing_route(requested))
    }
}

impl Drop for AuthCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run_identity_listener(inner: Arc<CoordinatorInner>) {
    inner.identity.session_initialized().await;
    let mut identities = inner.identity.subscribe();
    loop {
        let identity = identities.borrow_and_update().clone();
        inner.on_identity(identity);
        if identities.changed().await.is_err() {
            debug!("identity stream closed");
            return;
        }
    }
}

async fn run_expiry_listener(
    inner: Arc<CoordinatorInner>,
    mut expired: mpsc::UnboundedReceiver<UserId>,
) {
    while let Some(user_id) = expired.recv().await {
        if inner.profiles.current().map(|p| p.id) != Some(user_id) {
            debug!(user_id = %user_id, "ignoring expiry for a session that already ended");
            continue;
        }
        inner.sign_out().await;
    }
}
