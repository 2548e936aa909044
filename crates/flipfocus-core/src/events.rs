use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{AppMode, TimerState};

/// Every state change in the system produces an Event.
/// The engine broadcasts them; front-ends and tests subscribe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The flip gate is armed; the session starts when the phone goes
    /// face-down.
    SessionArmed {
        mode: AppMode,
        at: DateTime<Utc>,
    },
    /// The phone went face-down and focus began. `duration_secs` is `None`
    /// for stopwatch sessions.
    FocusStarted {
        mode: AppMode,
        duration_secs: Option<u64>,
        at: DateTime<Utc>,
    },
    /// The phone came back up mid-session in a countdown mode.
    FocusFailed {
        at: DateTime<Utc>,
    },
    /// A focus span ran to its end. `recorded` is false for spans too short
    /// for the stats store.
    SessionCompleted {
        mode: AppMode,
        focused_secs: u64,
        recorded: bool,
        quote: String,
        at: DateTime<Utc>,
    },
    /// A pomodoro focus rolled into its break.
    BreakStarted {
        round: u32,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// A break ran to completion; `round` is the new round number.
    BreakFinished {
        round: u32,
        at: DateTime<Utc>,
    },
    SessionReset {
        at: DateTime<Utc>,
    },
    /// Today's bucket changed.
    StatsUpdated {
        key: String,
        total_secs: u64,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        state: TimerState,
        mode: AppMode,
        round: u32,
        clock_secs: u64,
        started_at: Option<DateTime<Utc>>,
        quote: Option<String>,
        at: DateTime<Utc>,
    },
}
