//! Session coordinator configuration.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::inactivity::TimeoutPolicy;
use crate::role::Role;

/// Session-related configuration.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Idle minutes before the inactivity warning is shown.
    #[serde(default = "default_warning_after_minutes")]
    pub warning_after_minutes: u64,

    /// Idle minutes before the session is signed out.
    #[serde(default = "default_expire_after_minutes")]
    pub expire_after_minutes: u64,

    /// Role given to provisional profiles when the stored profile can't be read.
    #[serde(default)]
    pub default_role: Role,
}

/// Longest accepted threshold: one week.
pub const MAX_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;

fn default_warning_after_minutes() -> u64 {
    25
}

fn default_expire_after_minutes() -> u64 {
    30
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            warning_after_minutes: default_warning_after_minutes(),
            expire_after_minutes: default_expire_after_minutes(),
            default_role: Role::default(),
        }
    }
}

/// Invalid session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionConfigError {
    /// The warning must come strictly before expiry.
    WarningNotBeforeExpiry { warning: u64, expiry: u64 },
    /// A threshold exceeds [`MAX_TIMEOUT_MINUTES`].
    TooLong { field: &'static str, minutes: u64 },
}

impl fmt::Display for SessionConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WarningNotBeforeExpiry { warning, expiry } => write!(
                f,
                "inactivity warning ({warning} min) must come before expiry ({expiry} min)"
            ),
            Self::TooLong { field, minutes } => write!(
                f,
                "{field} ({minutes} min) exceeds the maximum of {MAX_TIMEOUT_MINUTES} min"
            ),
        }
    }
}

impl std::error::Error for SessionConfigError {}

impl SessionConfig {
    /// Checks the thresholds are usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the warning threshold is zero or not below expiry,
    /// or if either threshold is longer than [`MAX_TIMEOUT_MINUTES`].
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        for (field, minutes) in [
            ("warning_after_minutes", self.warning_after_minutes),
            ("expire_after_minutes", self.expire_after_minutes),
        ] {
            if minutes > MAX_TIMEOUT_MINUTES {
                return Err(SessionConfigError::TooLong { field, minutes });
            }
        }
        let warning = self.warning_after_minutes;
        if warning == 0 || warning >= self.expire_after_minutes {
            return Err(SessionConfigError::WarningNotBeforeExpiry {
                warning,
                expiry: self.expire_after_minutes,
            });
        }
        Ok(())
    }

    /// Returns the inactivity thresholds. Unvalidated values saturate.
    #[must_use]
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            warn_after: minutes(self.warning_after_minutes),
            expire_after: minutes(self.expire_after_minutes),
        }
    }
}

fn minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}
