//! End-to-end tests for the session coordinator over in-memory collaborators.
//!
//! Every test runs on a paused clock, so the 25/30 minute inactivity
//! thresholds elapse instantly once all tasks are idle.

mod common;

use common::{eventually, identity_of, settle, sign_in, Harness, PASSWORD};
use expense_desk_platform_access::memory::InMemoryIdentityProvider;
use expense_desk_platform_access::{
    ActivitySignal, AuthOutcome, ContextStatus, Credentials, IdentityProvider, Membership,
    Organization, OrganizationContext, Registration, Role, SessionPhase, LOGIN_ROUTE,
};
use std::time::Duration;
use tokio_stream::StreamExt;

const MINUTE: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn sign_in_commits_profile_and_organization() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Finance);
    let (acme, _) = harness.add_membership(alice.id, "Acme");
    let coordinator = harness.start();

    assert!(!coordinator.is_authenticated());
    let outcome = sign_in(&coordinator, "alice@example.com").await;
    assert_eq!(outcome, AuthOutcome::succeeded());

    eventually(|| coordinator.has_organization()).await;
    assert_eq!(coordinator.current_user_profile(), Some(alice.clone()));
    assert_eq!(coordinator.current_user_id(), Some(alice.id));
    assert_eq!(coordinator.user_role(), Some(Role::Finance));
    assert!(coordinator.has_role(Role::Finance));
    assert!(!coordinator.has_role(Role::Admin));
    assert!(coordinator.is_finance_or_admin());
    assert!(!coordinator.is_admin());
    assert_eq!(coordinator.current_organization(), Some(acme.clone()));
    assert_eq!(
        coordinator.organization_context().status,
        ContextStatus::Resolved
    );
    assert_eq!(coordinator.default_route(), "/home");
    assert_eq!(coordinator.session_phase(), Some(SessionPhase::Active));
    assert_eq!(harness.organizations.current(), Some(acme));
}

#[tokio::test(start_paused = true)]
async fn rejected_sign_in_returns_provider_message() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Employee);
    let coordinator = harness.start();

    let outcome = coordinator
        .sign_in(&Credentials::new("alice@example.com", "wrong"))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Invalid login credentials"));
    settle().await;
    assert!(coordinator.current_user_profile().is_none());
}

#[tokio::test(start_paused = true)]
async fn unreachable_provider_reports_transport_message() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Employee);
    harness.identity.set_offline(true);
    let coordinator = harness.start();

    let outcome = sign_in(&coordinator, "alice@example.com").await;
    assert_eq!(outcome, AuthOutcome::failed("Failed to fetch"));

    let outcome = coordinator.reset_password("alice@example.com").await;
    assert_eq!(outcome, AuthOutcome::failed("Failed to fetch"));
}

#[tokio::test(start_paused = true)]
async fn register_signs_in_with_provisional_profile() {
    let harness = Harness::new();
    let coordinator = harness.start();

    let outcome = coordinator
        .register(&Registration::new("new@example.com", PASSWORD, "New Person"))
        .await;
    assert!(outcome.success);

    eventually(|| coordinator.is_authenticated()).await;
    let profile = coordinator.current_user_profile().expect("profile committed");
    assert_eq!(profile.email, "new@example.com");
    assert_eq!(profile.role, Role::Employee);
    assert_eq!(Some(profile.id), harness.identity.current_identity().map(|i| i.id));
    assert_eq!(
        harness.identity.full_name("new@example.com").as_deref(),
        Some("New Person")
    );

    eventually(|| coordinator.organization_context().is_settled()).await;
    assert_eq!(
        coordinator.organization_context().status,
        ContextStatus::NoOrganization
    );
    assert_eq!(coordinator.default_route(), "/organization/setup");

    let again = coordinator
        .register(&Registration::new("new@example.com", PASSWORD, "New Person"))
        .await;
    assert_eq!(again, AuthOutcome::failed("User already registered"));
}

#[tokio::test(start_paused = true)]
async fn unreadable_profile_falls_back_to_default_role() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Admin);
    harness.profiles.fail_for(alice.id, "connection reset");
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;

    let profile = coordinator.current_user_profile().expect("profile committed");
    assert_eq!(profile.id, alice.id);
    assert_eq!(profile.role, Role::Employee);
    assert!(profile.full_name.is_none());
}

#[tokio::test(start_paused = true)]
async fn latest_identity_wins_over_slow_earlier_load() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Admin);
    let bob = harness.add_user("bob@example.com", Role::Employee);
    harness.profiles.set_latency(alice.id, Duration::from_secs(1));
    let coordinator = harness.start();
    settle().await;

    harness.identity.emit(Some(identity_of(&alice)));
    tokio::task::yield_now().await;
    harness.identity.emit(Some(identity_of(&bob)));

    eventually(|| coordinator.current_user_id() == Some(bob.id)).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(coordinator.current_user_profile(), Some(bob));
    assert!(!coordinator.is_admin());
}

#[tokio::test(start_paused = true)]
async fn switching_users_never_exposes_previous_profile() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Admin);
    let bob = harness.add_user("bob@example.com", Role::Employee);
    harness.add_membership(alice.id, "Acme");
    harness.profiles.set_latency(bob.id, Duration::from_secs(1));
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.has_organization()).await;

    harness.identity.emit(Some(identity_of(&bob)));
    settle().await;
    assert!(coordinator.current_user_profile().is_none());
    assert_eq!(coordinator.organization_context(), OrganizationContext::default());
    assert!(!coordinator.has_role(Role::Admin));

    eventually(|| coordinator.current_user_id() == Some(bob.id)).await;
    eventually(|| coordinator.organization_context().is_settled()).await;
    assert!(!coordinator.has_organization());
}

#[tokio::test(start_paused = true)]
async fn sign_out_clears_state_even_when_provider_fails() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Admin);
    harness.add_membership(alice.id, "Acme");
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.has_organization()).await;

    harness.identity.set_offline(true);
    coordinator.sign_out().await;

    assert!(coordinator.current_user_profile().is_none());
    assert!(!coordinator.is_authenticated());
    assert_eq!(coordinator.organization_context(), OrganizationContext::default());
    assert!(coordinator.session_phase().is_none());
    assert_eq!(harness.navigator.visits(), vec![LOGIN_ROUTE.to_string()]);
    assert!(harness.organizations.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn sign_out_navigates_once() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Employee);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;

    coordinator.sign_out().await;
    settle().await;

    assert!(harness.identity.current_identity().is_none());
    assert_eq!(harness.navigator.count(LOGIN_ROUTE), 1);
}

#[tokio::test(start_paused = true)]
async fn losing_identity_clears_profile() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Finance);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;

    harness.identity.emit(None);
    eventually(|| !coordinator.is_authenticated()).await;
    assert!(coordinator.user_role().is_none());
    assert!(coordinator.session_phase().is_none());
}

#[tokio::test(start_paused = true)]
async fn waits_for_session_initialization() {
    let harness = Harness::with_identity(InMemoryIdentityProvider::uninitialized());
    let alice = harness.add_user("alice@example.com", Role::Employee);
    harness.identity.emit(Some(identity_of(&alice)));
    let coordinator = harness.start();

    settle().await;
    assert!(coordinator.current_user_profile().is_none());
    assert_eq!(harness.profiles.lookups(), 0);

    harness.identity.mark_initialized();
    coordinator.wait_until_ready().await;
    eventually(|| coordinator.current_user_id() == Some(alice.id)).await;
}

#[tokio::test(start_paused = true)]
async fn inactivity_warns_then_signs_out() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Employee);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;

    tokio::time::sleep(25 * MINUTE + Duration::from_secs(1)).await;
    assert_eq!(coordinator.session_phase(), Some(SessionPhase::Warning));
    let warnings = harness.notifier.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0] <= 5 * MINUTE && warnings[0] > 4 * MINUTE);
    assert!(coordinator.is_authenticated());

    tokio::time::sleep(5 * MINUTE).await;
    eventually(|| !coordinator.is_authenticated()).await;

    assert_eq!(harness.notifier.warnings().len(), 1);
    assert_eq!(harness.notifier.expiries(), 1);
    assert_eq!(harness.navigator.count(LOGIN_ROUTE), 1);
    assert!(harness.identity.current_identity().is_none());
    assert!(coordinator.session_phase().is_none());
}

#[tokio::test(start_paused = true)]
async fn activity_postpones_expiry() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Employee);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;

    tokio::time::sleep(20 * MINUTE).await;
    assert!(coordinator.record_activity(ActivitySignal::KeyPress));
    tokio::time::sleep(20 * MINUTE).await;
    assert!(coordinator.record_activity_event("scroll"));
    assert!(!coordinator.record_activity_event("resize"));
    tokio::time::sleep(20 * MINUTE).await;

    assert!(harness.notifier.warnings().is_empty());
    assert_eq!(harness.notifier.expiries(), 0);
    assert_eq!(coordinator.session_phase(), Some(SessionPhase::Active));
    let left = coordinator.time_until_expiry().expect("monitor running");
    assert!(left <= 10 * MINUTE);
    assert!(coordinator.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn activity_during_warning_returns_to_active() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Employee);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;

    tokio::time::sleep(26 * MINUTE).await;
    assert_eq!(coordinator.session_phase(), Some(SessionPhase::Warning));

    assert!(coordinator.record_activity(ActivitySignal::Click));
    assert_eq!(coordinator.session_phase(), Some(SessionPhase::Active));

    tokio::time::sleep(10 * MINUTE).await;
    assert!(coordinator.is_authenticated());
    assert_eq!(harness.notifier.expiries(), 0);
}

#[tokio::test(start_paused = true)]
async fn no_inactivity_monitor_while_signed_out() {
    let harness = Harness::new();
    let coordinator = harness.start();
    settle().await;

    assert!(coordinator.session_phase().is_none());
    assert!(coordinator.time_until_expiry().is_none());
    assert!(!coordinator.record_activity(ActivitySignal::MouseMove));

    tokio::time::sleep(31 * MINUTE).await;
    assert!(harness.notifier.warnings().is_empty());
    assert_eq!(harness.notifier.expiries(), 0);
    assert!(harness.navigator.visits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn set_current_organization_requires_profile() {
    let harness = Harness::new();
    let coordinator = harness.start();
    settle().await;

    let acme = Organization::new("Acme");
    let membership = Membership::new(&acme, expense_desk_core::UserId::new(), Role::Admin);
    let err = coordinator
        .set_current_organization(acme, membership)
        .unwrap_err();
    assert!(err.to_string().contains("not authenticated"));
}

#[tokio::test(start_paused = true)]
async fn set_current_organization_updates_context_and_routes() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Admin);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.organization_context().is_settled()).await;
    assert!(!coordinator.has_organization());
    assert_eq!(coordinator.landing_route(None), "/organization/setup");

    let acme = Organization::new("Acme");
    let membership = Membership::new(&acme, alice.id, Role::Admin);
    coordinator
        .set_current_organization(acme.clone(), membership.clone())
        .expect("signed in");

    assert!(coordinator.has_organization());
    assert_eq!(coordinator.current_organization(), Some(acme.clone()));
    assert_eq!(coordinator.current_membership(), Some(membership));
    assert_eq!(coordinator.default_route(), "/home");
    assert_eq!(coordinator.landing_route(Some("/?returnUrl=/x")), "/home");
    assert_eq!(coordinator.landing_route(Some("/expenses/7")), "/expenses/7");
    assert_eq!(harness.organizations.current(), Some(acme));
}

#[tokio::test(start_paused = true)]
async fn explicit_organization_beats_in_flight_resolve() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Admin);
    harness.add_membership(alice.id, "Old Org");
    harness.organizations.set_latency(Duration::from_secs(1));
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;
    assert_eq!(
        coordinator.organization_context().status,
        ContextStatus::Pending
    );

    let fresh = Organization::new("Fresh Org");
    let membership = Membership::new(&fresh, alice.id, Role::Admin);
    coordinator
        .set_current_organization(fresh.clone(), membership)
        .expect("signed in");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(coordinator.current_organization(), Some(fresh));
}

#[tokio::test(start_paused = true)]
async fn failing_resolver_leaves_empty_context() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Employee);
    harness.add_membership(alice.id, "Acme");
    harness.organizations.set_failing(true);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;
    eventually(|| coordinator.organization_context().status == ContextStatus::Empty).await;

    assert!(!coordinator.has_organization());
    assert!(coordinator.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn refresh_picks_up_role_change() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Employee);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;
    assert!(!coordinator.is_admin());

    let mut promoted = alice.clone();
    promoted.role = Role::Admin;
    harness.profiles.insert(promoted);

    coordinator.refresh_user_profile().await;
    assert!(coordinator.is_admin());
    assert!(coordinator.has_any_role(&[Role::Finance, Role::Admin]));
}

#[tokio::test(start_paused = true)]
async fn refresh_without_identity_is_a_no_op() {
    let harness = Harness::new();
    let coordinator = harness.start();
    settle().await;

    coordinator.refresh_user_profile().await;
    assert!(coordinator.current_user_profile().is_none());
    assert_eq!(harness.profiles.lookups(), 0);
}

#[tokio::test(start_paused = true)]
async fn profile_stream_follows_sign_in_and_out() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Finance);
    let coordinator = harness.start();
    let mut profiles = coordinator.user_profile_stream();

    assert_eq!(profiles.next().await, Some(None));

    sign_in(&coordinator, "alice@example.com").await;
    assert_eq!(profiles.next().await, Some(Some(alice)));

    coordinator.sign_out().await;
    assert_eq!(profiles.next().await, Some(None));
}

#[tokio::test(start_paused = true)]
async fn password_update_needs_a_session() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Employee);
    let coordinator = harness.start();

    let outcome = coordinator.update_password("n3w-password").await;
    assert_eq!(outcome, AuthOutcome::failed("Auth session missing!"));

    sign_in(&coordinator, "alice@example.com").await;
    let outcome = coordinator.update_password("n3w-password").await;
    assert_eq!(outcome, AuthOutcome::succeeded());
}

#[tokio::test(start_paused = true)]
async fn dispose_stops_timers_and_listeners() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Employee);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;

    coordinator.dispose();
    coordinator.dispose();
    assert!(coordinator.is_disposed());
    assert!(coordinator.session_phase().is_none());

    harness.identity.emit(None);
    tokio::time::sleep(31 * MINUTE).await;

    assert!(harness.notifier.warnings().is_empty());
    assert_eq!(harness.notifier.expiries(), 0);
    assert!(harness.navigator.visits().is_empty());
    assert_eq!(coordinator.current_user_id(), Some(alice.id));

    let acme = Organization::new("Acme");
    let membership = Membership::new(&acme, alice.id, Role::Admin);
    let err = coordinator
        .set_current_organization(acme, membership)
        .unwrap_err();
    assert!(err.to_string().contains("disposed"));
}

#[tokio::test(start_paused = true)]
async fn dropping_coordinator_cancels_monitor() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Employee);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;
    drop(coordinator);

    tokio::time::sleep(31 * MINUTE).await;
    assert_eq!(harness.notifier.expiries(), 0);
    assert!(harness.navigator.visits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn refresh_after_failed_remote_sign_out_stays_signed_out() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Admin);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;

    harness.identity.set_offline(true);
    coordinator.sign_out().await;
    assert!(harness.identity.current_identity().is_some());

    let lookups = harness.profiles.lookups();
    coordinator.refresh_user_profile().await;
    settle().await;

    assert!(!coordinator.is_authenticated());
    assert!(!coordinator.is_admin());
    assert!(coordinator.session_phase().is_none());
    assert_eq!(harness.profiles.lookups(), lookups);
}

#[tokio::test(start_paused = true)]
async fn signing_in_again_restarts_the_inactivity_clock() {
    let harness = Harness::new();
    harness.add_user("alice@example.com", Role::Employee);
    let coordinator = harness.start();

    sign_in(&coordinator, "alice@example.com").await;
    eventually(|| coordinator.is_authenticated()).await;

    tokio::time::sleep(26 * MINUTE).await;
    assert_eq!(coordinator.session_phase(), Some(SessionPhase::Warning));

    let outcome = sign_in(&coordinator, "alice@example.com").await;
    assert_eq!(outcome, AuthOutcome::succeeded());
    assert_eq!(coordinator.session_phase(), Some(SessionPhase::Active));
    settle().await;

    tokio::time::sleep(5 * MINUTE).await;
    assert_eq!(harness.notifier.expiries(), 0);
    assert!(coordinator.is_authenticated());
    assert!(coordinator.time_until_expiry().expect("monitor running") > 20 * MINUTE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sign_out_racing_profile_loads_leaves_nothing_running() {
    let harness = Harness::new();
    let alice = harness.add_user("alice@example.com", Role::Admin);
    harness.add_membership(alice.id, "Acme");
    let coordinator = harness.start();

    for _ in 0..50 {
        harness.identity.emit(Some(identity_of(&alice)));
        tokio::task::yield_now().await;
        coordinator.sign_out().await;

        eventually(|| {
            coordinator.current_user_profile().is_none()
                && coordinator.session_phase().is_none()
                && coordinator.organization_context() == OrganizationContext::default()
        })
        .await;
    }
}
