//! Terminal implementations of the coordinator's UI ports.

use expense_desk_platform_access::{Navigator, Notifier};
use std::time::Duration;

/// Prints inactivity notices to stdout.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn inactivity_warning(&self, remaining: Duration) {
        let minutes = remaining.as_secs().div_ceil(60);
        println!(
            "! Your session will expire in {minutes} minute(s) due to inactivity. \
             Type 'activity' to stay signed in."
        );
    }

    fn inactivity_expired(&self) {
        println!("! Your session has expired due to inactivity.");
    }
}

/// Prints navigations to stdout.
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, path: &str) {
        println!("-> {path}");
    }
}
