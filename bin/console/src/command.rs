//! Console command parsing.

use std::fmt;
use std::str::FromStr;

/// A single console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SignIn { email: String, password: String },
    Register {
        email: String,
        password: String,
        full_name: String,
    },
    SignOut,
    ResetPassword { email: String },
    UpdatePassword { new_password: String },
    /// Records a UI event; defaults to a key press.
    Activity { event: String },
    Refresh,
    /// Creates an organization and makes it current.
    Organization { name: String },
    Status,
    /// Shows where a redirect to `path` would land.
    Route { path: Option<String> },
    Help,
    Quit,
}

/// A line that isn't a valid command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCommandError {
    Empty,
    Unknown(String),
    Usage(&'static str),
}

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::Unknown(name) => write!(f, "unknown command '{name}', try 'help'"),
            Self::Usage(usage) => write!(f, "usage: {usage}"),
        }
    }
}

impl std::error::Error for ParseCommandError {}

pub const HELP: &str = "\
commands:
  signin <email> <password>
  register <email> <password> <full name>
  signout
  reset <email>
  password <new password>
  activity [event]          (mousedown, mousemove, keypress, scroll, touchstart, click)
  refresh
  org <name>
  status
  route [path]
  help
  quit";

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(ParseCommandError::Empty);
        };
        let rest: Vec<&str> = words.collect();

        let command = match (name.to_ascii_lowercase().as_str(), rest.as_slice()) {
            ("signin" | "login", [email, password]) => Self::SignIn {
                email: (*email).to_string(),
                password: (*password).to_string(),
            },
            ("signin" | "login", _) => {
                return Err(ParseCommandError::Usage("signin <email> <password>"));
            }
            ("register", [email, password, name @ ..]) if !name.is_empty() => Self::Register {
                email: (*email).to_string(),
                password: (*password).to_string(),
                full_name: name.join(" "),
            },
            ("register", _) => {
                return Err(ParseCommandError::Usage(
                    "register <email> <password> <full name>",
                ));
            }
            ("signout" | "logout", []) => Self::SignOut,
            ("reset", [email]) => Self::ResetPassword {
                email: (*email).to_string(),
            },
            ("reset", _) => return Err(ParseCommandError::Usage("reset <email>")),
            ("password", [new_password]) => Self::UpdatePassword {
                new_password: (*new_password).to_string(),
            },
            ("password", _) => return Err(ParseCommandError::Usage("password <new password>")),
            ("activity", []) => Self::Activity {
                event: "keypress".to_string(),
            },
            ("activity", [event]) => Self::Activity {
                event: (*event).to_string(),
            },
            ("refresh", []) => Self::Refresh,
            ("org", name) if !name.is_empty() => Self::Organization {
                name: name.join(" "),
            },
            ("org", _) => return Err(ParseCommandError::Usage("org <name>")),
            ("status", []) => Self::Status,
            ("route", []) => Self::Route { path: None },
            ("route", [path]) => Self::Route {
                path: Some((*path).to_string()),
            },
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            (other, _) => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}
