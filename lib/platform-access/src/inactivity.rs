//! Two-stage inactivity timeout.
//!
//! [`SessionTimeoutState`] is a pure state machine over a monotonic clock:
//! `Active` until the warning threshold passes without qualifying activity,
//! then `Warning`, then the terminal `Expired` once the expiry threshold
//! passes. [`InactivityMonitor`] drives it with a single task that sleeps
//! until the next deadline and recomputes that deadline whenever activity
//! is recorded. Dropping the monitor cancels the task.

use expense_desk_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::lock;
use crate::notify::Notifier;

/// UI interaction signals that count as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySignal {
    MouseDown,
    MouseMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

impl ActivitySignal {
    /// Every qualifying signal.
    pub const ALL: [Self; 6] = [
        Self::MouseDown,
        Self::MouseMove,
        Self::KeyPress,
        Self::Scroll,
        Self::TouchStart,
        Self::Click,
    ];

    /// Returns the DOM event name of the signal.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::MouseDown => "mousedown",
            Self::MouseMove => "mousemove",
            Self::KeyPress => "keypress",
            Self::Scroll => "scroll",
            Self::TouchStart => "touchstart",
            Self::Click => "click",
        }
    }

    /// Maps an event name onto the allow-list.
    #[must_use]
    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.event_name() == name)
    }
}

impl fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

impl FromStr for ActivitySignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_event_name(s).ok_or_else(|| format!("not an activity signal: {s}"))
    }
}

/// Phase of the inactivity state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Active,
    Warning,
    Expired,
}

/// Inactivity thresholds, both measured from the last qualifying activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub warn_after: Duration,
    pub expire_after: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            warn_after: Duration::from_secs(25 * 60),
            expire_after: Duration::from_secs(30 * 60),
        }
    }
}

/// A phase the state machine just entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseChange {
    /// Entered `Warning`; the session expires after `remaining` more idle time.
    Warning { remaining: Duration },
    /// Entered `Expired`.
    Expired,
}

/// Inactivity clock for one signed-in session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTimeoutState {
    last_activity_at: Instant,
    phase: SessionPhase,
}

impl SessionTimeoutState {
    /// Starts a fresh `Active` clock.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            last_activity_at: now,
            phase: SessionPhase::Active,
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// Resets the clock. Returns false if the session already expired.
    pub fn record_activity(&mut self, now: Instant) -> bool {
        if self.phase == SessionPhase::Expired {
            return false;
        }
        self.last_activity_at = now;
        self.phase = SessionPhase::Active;
        true
    }

    /// Moves to the phase the elapsed idle time calls for.
    ///
    /// Returns the phase entered, if any. Each phase is entered at most once
    /// per idle stretch; a late call that is already past expiry goes
    /// straight to `Expired`.
    pub fn advance(&mut self, now: Instant, policy: &TimeoutPolicy) -> Option<PhaseChange> {
        let idle = now.saturating_duration_since(self.last_activity_at);
        match self.phase {
            SessionPhase::Expired => None,
            _ if idle >= policy.expire_after => {
                self.phase = SessionPhase::Expired;
                Some(PhaseChange::Expired)
            }
            SessionPhase::Active if idle >= policy.warn_after => {
                self.phase = SessionPhase::Warning;
                Some(PhaseChange::Warning {
                    remaining: policy.expire_after - idle,
                })
            }
            _ => None,
        }
    }

    /// Returns when the next phase change is due.
    ///
    /// `None` once expired, or when the threshold lies beyond what the clock
    /// can represent.
    #[must_use]
    pub fn next_deadline(&self, policy: &TimeoutPolicy) -> Option<Instant> {
        let after = match self.phase {
            SessionPhase::Active => policy.warn_after,
            SessionPhase::Warning => policy.expire_after,
            SessionPhase::Expired => return None,
        };
        self.last_activity_at.checked_add(after)
    }

    /// Returns how much idle time is left before expiry.
    #[must_use]
    pub fn time_until_expiry(&self, now: Instant, policy: &TimeoutPolicy) -> Duration {
        match self.last_activity_at.checked_add(policy.expire_after) {
            Some(expiry) => expiry.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }
}

struct MonitorShared {
    state: Mutex<SessionTimeoutState>,
    activity: Notify,
}

/// Runs the inactivity state machine for one signed-in user.
///
/// Expiry is reported by sending the user's ID on the channel handed to
/// [`InactivityMonitor::start`]; the receiver is expected to sign out.
pub struct InactivityMonitor {
    user_id: UserId,
    policy: TimeoutPolicy,
    shared: Arc<MonitorShared>,
    task: JoinHandle<()>,
}

impl InactivityMonitor {
    /// Starts a fresh clock and its timer task.
    pub fn start(
        user_id: UserId,
        policy: TimeoutPolicy,
        notifier: Arc<dyn Notifier>,
        expired: mpsc::UnboundedSender<UserId>,
    ) -> Self {
        let shared = Arc::new(MonitorShared {
            state: Mutex::new(SessionTimeoutState::new(Instant::now())),
            activity: Notify::new(),
        });
        let task = tokio::spawn(run_monitor(
            user_id,
            policy,
            Arc::clone(&shared),
            notifier,
            expired,
        ));
        debug!(user_id = %user_id, "inactivity monitor started");
        Self {
            user_id,
            policy,
            shared,
            task,
        }
    }

    /// Returns the user this monitor watches.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Records qualifying activity. Returns false if the session already expired.
    pub fn record_activity(&self) -> bool {
        let accepted = lock(&self.shared.state).record_activity(Instant::now());
        if accepted {
            self.shared.activity.notify_one();
        }
        accepted
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        lock(&self.shared.state).phase()
    }

    /// Returns how much idle time is left before expiry.
    #[must_use]
    pub fn time_until_expiry(&self) -> Duration {
        lock(&self.shared.state).time_until_expiry(Instant::now(), &self.policy)
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
        debug!(user_id = %self.user_id, "inactivity monitor stopped");
    }
}

async fn run_monitor(
    user_id: UserId,
    policy: TimeoutPolicy,
    shared: Arc<MonitorShared>,
    notifier: Arc<dyn Notifier>,
    expired: mpsc::UnboundedSender<UserId>,
) {
    loop {
        let deadline = {
            let state = lock(&shared.state);
            if state.phase() == SessionPhase::Expired {
                return;
            }
            state.next_deadline(&policy)
        };

        tokio::select! {
            () = sleep_until(deadline) => {
                let change = lock(&shared.state).advance(Instant::now(), &policy);
                match change {
                    Some(PhaseChange::Warning { remaining }) => {
                        info!(
                            user_id = %user_id,
                            remaining_secs = remaining.as_secs(),
                            "session inactivity warning"
                        );
                        notifier.inactivity_warning(remaining);
                    }
                    Some(PhaseChange::Expired) => {
                        info!(user_id = %user_id, "session expired due to inactivity");
                        notifier.inactivity_expired();
                        // The receiver may already be gone during disposal.
                        let _ = expired.send(user_id);
                        return;
                    }
                    None => {}
                }
            }
            () = shared.activity.notified() => {}
        }
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
