//! Interactive console for the expense-desk session coordinator.
//!
//! Reads one command per line from stdin and drives an [`AuthCoordinator`]
//! backed by in-memory collaborators. Run with `RUST_LOG=debug` to see the
//! coordinator's internal decisions.

mod command;
mod config;
mod demo;
mod ui;

use command::{Command, HELP};
use config::ConsoleConfig;
use expense_desk_platform_access::memory::{
    InMemoryIdentityProvider, InMemoryOrganizationResolver, InMemoryProfileStore,
};
use expense_desk_platform_access::{
    AuthCoordinator, AuthOutcome, Collaborators, Credentials, Membership, Organization,
    Registration, Role,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ui::{ConsoleNavigator, ConsoleNotifier};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ConsoleConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.session.validate() {
        tracing::error!(error = %e, "invalid session configuration");
        return ExitCode::FAILURE;
    }
    tracing::info!(
        warning_after_minutes = config.session.warning_after_minutes,
        expire_after_minutes = config.session.expire_after_minutes,
        "Loaded configuration"
    );

    let identity = Arc::new(InMemoryIdentityProvider::new());
    let profiles = Arc::new(InMemoryProfileStore::new());
    let organizations = Arc::new(InMemoryOrganizationResolver::new());
    if config.seed_demo_accounts {
        demo::seed(&identity, &profiles, &organizations, &config.demo_password);
    }

    let coordinator = AuthCoordinator::start(
        Collaborators {
            identity,
            profiles,
            organizations,
            notifier: Arc::new(ConsoleNotifier),
            navigator: Arc::new(ConsoleNavigator),
        },
        &config.session,
    );
    coordinator.wait_until_ready().await;

    let mut profile_changes = coordinator.user_profile_stream();
    let announcer = tokio::spawn(async move {
        while let Some(profile) = profile_changes.next().await {
            match profile {
                Some(profile) => println!("* signed in as {} ({})", profile.email, profile.role),
                None => println!("* no user signed in"),
            }
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read stdin");
                break;
            }
        };

        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => run(&coordinator, command).await,
            Err(command::ParseCommandError::Empty) => {}
            Err(e) => println!("{e}"),
        }
    }

    coordinator.dispose();
    announcer.abort();
    ExitCode::SUCCESS
}

async fn run(coordinator: &AuthCoordinator, command: Command) {
    match command {
        Command::SignIn { email, password } => {
            let outcome = coordinator
                .sign_in(&Credentials::new(email, password))
                .await;
            report(&outcome);
        }
        Command::Register {
            email,
            password,
            full_name,
        } => {
            let outcome = coordinator
                .register(&Registration::new(email, password, full_name))
                .await;
            report(&outcome);
        }
        Command::SignOut => coordinator.sign_out().await,
        Command::ResetPassword { email } => {
            report(&coordinator.reset_password(&email).await);
        }
        Command::UpdatePassword { new_password } => {
            report(&coordinator.update_password(&new_password).await);
        }
        Command::Activity { event } => {
            if !coordinator.record_activity_event(&event) {
                println!("activity '{event}' ignored");
            }
        }
        Command::Refresh => coordinator.refresh_user_profile().await,
        Command::Organization { name } => {
            let Some(user_id) = coordinator.current_user_id() else {
                println!("sign in first");
                return;
            };
            let organization = Organization::new(name);
            let membership = Membership::new(&organization, user_id, Role::Admin);
            match coordinator.set_current_organization(organization, membership) {
                Ok(()) => println!("-> {}", coordinator.default_route()),
                Err(e) => println!("error: {e}"),
            }
        }
        Command::Status => print_status(coordinator),
        Command::Route { path } => println!("-> {}", coordinator.landing_route(path.as_deref())),
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

fn report(outcome: &AuthOutcome) {
    match &outcome.error {
        None => println!("ok"),
        Some(message) => println!("error: {message}"),
    }
}

fn print_status(coordinator: &AuthCoordinator) {
    let Some(profile) = coordinator.current_user_profile() else {
        println!("signed out");
        return;
    };
    let context = coordinator.organization_context();
    println!("user:         {} <{}>", profile.id, profile.email);
    if let Some(name) = &profile.full_name {
        println!("name:         {name}");
    }
    println!("role:         {}", profile.role);
    match &context.current_organization {
        Some(organization) => println!("organization: {}", organization.name),
        None => println!("organization: none ({:?})", context.status),
    }
    if let (Some(phase), Some(left)) =
        (coordinator.session_phase(), coordinator.time_until_expiry())
    {
        println!("session:      {phase:?}, expires in {}s when idle", left.as_secs());
    }
    println!("home:         {}", coordinator.default_route());
}
