use std::sync::Arc;

use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use flipfocus_core::feedback::{
    FeedbackDispatcher, NoopHaptics, NoopInterruptionPolicy, NoopSoundBank,
};
use flipfocus_core::storage::{Config, Database};
use flipfocus_core::{
    AmbientTrack, AppMode, Effect, Event, SessionMachine, StatsAggregator, TimerState,
};

const SESSION_KEY: &str = "session";

#[derive(Subcommand)]
pub enum SessionAction {
    /// Arm the flip gate; the session starts when the phone goes face-down
    Start,
    /// Feed an orientation edge to the machine
    Flip {
        #[arg(value_enum)]
        direction: FlipArg,
    },
    /// Back to idle from an armed, failed, or completed session
    Reset,
    /// Print the current session state as JSON
    Status {
        /// Also print the events recovered by the wall-clock catch-up
        #[arg(long)]
        catch_up: bool,
    },
    /// Switch the session mode (idle only)
    Mode {
        #[arg(value_enum)]
        mode: ModeArg,
    },
    /// Set the focus duration for the current mode (idle only)
    Minutes { minutes: u32 },
    /// Pick the ambient track for the next session (idle only)
    Track {
        #[arg(value_enum)]
        track: TrackArg,
    },
    /// Toggle the Do-Not-Disturb preference (idle only)
    Dnd {
        #[arg(value_enum)]
        state: ToggleArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FlipArg {
    Down,
    Up,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Timer,
    Pomodoro,
    Stopwatch,
}

impl From<ModeArg> for AppMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Timer => AppMode::Timer,
            ModeArg::Pomodoro => AppMode::Pomodoro,
            ModeArg::Stopwatch => AppMode::Stopwatch,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TrackArg {
    None,
    Rain,
    Waves,
    Zen,
}

impl From<TrackArg> for AmbientTrack {
    fn from(track: TrackArg) -> Self {
        match track {
            TrackArg::None => AmbientTrack::None,
            TrackArg::Rain => AmbientTrack::Rain,
            TrackArg::Waves => AmbientTrack::Waves,
            TrackArg::Zen => AmbientTrack::Zen,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ToggleArg {
    On,
    Off,
}

fn load_machine(db: &Database) -> SessionMachine {
    if let Ok(Some(json)) = db.kv_get(SESSION_KEY) {
        if let Ok(machine) = serde_json::from_str::<SessionMachine>(&json) {
            return machine;
        }
    }
    SessionMachine::new(Config::load_or_default().initial_session())
}

fn save_machine(db: &Database, machine: &SessionMachine) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string(machine)?;
    db.kv_set(SESSION_KEY, &json)?;
    Ok(())
}

/// Run the machine's effects in the polling front-end. Stats and the DND
/// preference apply here; timers, audio, and haptics need a live runtime
/// and are skipped. A failed stats write warns and moves on -- it never
/// blocks the transition.
fn execute_effects(
    stats: &StatsAggregator,
    dispatcher: &FeedbackDispatcher,
    effects: Vec<Effect>,
) -> Vec<Event> {
    let mut events = Vec::new();
    for effect in effects {
        match effect {
            Effect::RecordStat { seconds } => match stats.record(seconds) {
                Ok((key, total_secs)) => events.push(Event::StatsUpdated {
                    key,
                    total_secs,
                    at: Utc::now(),
                }),
                Err(e) => eprintln!("warning: failed to record focus stat: {e}"),
            },
            Effect::SetDnd(enabled) => dispatcher.set_do_not_disturb(enabled),
            Effect::Notify(event) => events.push(event),
            _ => {}
        }
    }
    events
}

fn print_events(events: &[Event]) -> Result<(), Box<dyn std::error::Error>> {
    for event in events {
        println!("{}", serde_json::to_string_pretty(event)?);
    }
    Ok(())
}

fn apply_action(
    action: SessionAction,
    machine: &mut SessionMachine,
    stats: &StatsAggregator,
    dispatcher: &FeedbackDispatcher,
    caught_up: &[Event],
) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    match action {
        SessionAction::Start => {
            let events = execute_effects(stats, dispatcher, machine.request_start(now));
            print_events(&events)?;
        }
        SessionAction::Flip { direction } => {
            let effects = match direction {
                FlipArg::Down => machine.face_down(now),
                FlipArg::Up => machine.face_up(now),
            };
            let events = execute_effects(stats, dispatcher, effects);
            print_events(&events)?;
        }
        SessionAction::Reset => {
            let events = execute_effects(stats, dispatcher, machine.request_reset(now));
            print_events(&events)?;
        }
        SessionAction::Status { catch_up } => {
            if catch_up {
                print_events(caught_up)?;
            }
        }
        SessionAction::Mode { mode } => {
            machine.select_mode(mode.into());
        }
        SessionAction::Minutes { minutes } => {
            machine.set_minutes(minutes)?;
        }
        SessionAction::Track { track } => {
            machine.select_track(track.into());
        }
        SessionAction::Dnd { state } => {
            let enable = matches!(state, ToggleArg::On);
            let applied = machine.state() == TimerState::Idle;
            if applied {
                dispatcher.set_dnd_preference(enable);
            }
            println!(
                "{}",
                serde_json::json!({
                    "applied": applied,
                    "dnd_enabled": dispatcher.dnd_preference(),
                })
            );
        }
    }
    Ok(())
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(Database::open()?);
    let stats = StatsAggregator::new(db.clone());
    let dispatcher = FeedbackDispatcher::new(
        Arc::new(NoopHaptics),
        Arc::new(NoopSoundBank),
        Arc::new(NoopInterruptionPolicy),
        db.clone(),
    );
    let mut machine = load_machine(&db);

    // Catch the countdown up with the wall clock before applying anything,
    // so a session that expired between invocations completes instead of
    // swallowing the trigger.
    let caught_up = execute_effects(&stats, &dispatcher, machine.flush_elapsed(Utc::now()));

    let applied = apply_action(action, &mut machine, &stats, &dispatcher, &caught_up);

    // Persist before surfacing any rejection: the catch-up above already
    // wrote its stats, and replaying it next invocation would count them
    // twice.
    save_machine(&db, &machine)?;
    applied?;

    println!("{}", serde_json::to_string_pretty(&machine.snapshot())?);
    Ok(())
}
