//! Console configuration.
//!
//! Loaded via the `config` crate from environment variables, using `__` as
//! the nesting separator (e.g. `SESSION__WARNING_AFTER_MINUTES=1`).

use expense_desk_platform_access::SessionConfig;
use serde::Deserialize;

/// Console configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Session timeout and fallback-role settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Whether to create the demo accounts on startup.
    #[serde(default = "default_seed_demo_accounts")]
    pub seed_demo_accounts: bool,

    /// Password shared by the demo accounts.
    #[serde(default = "default_demo_password")]
    pub demo_password: String,
}

fn default_seed_demo_accounts() -> bool {
    true
}

fn default_demo_password() -> String {
    "expense-desk".to_string()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            seed_demo_accounts: default_seed_demo_accounts(),
            demo_password: default_demo_password(),
        }
    }
}

impl ConsoleConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but can't be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
