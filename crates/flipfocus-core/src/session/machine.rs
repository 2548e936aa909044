//! Session state machine.
//!
//! The machine is a pure value: every trigger is a method that mutates the
//! [`Session`] and returns the side effects the runtime must execute. It
//! spawns no tasks and touches no hardware -- the async engine (or the CLI's
//! poll-based driver) owns both.
//!
//! ## State Transitions
//!
//! ```text
//! Idle ──start──> ReadyToFlip ──face-down──> Focusing ──face-up──> Failed
//!                                               │    (stopwatch: face-up
//!                                               │     completes instead)
//!                                        countdown zero
//!                                               │
//!                              Completed <──────┴──────> Break ──zero──> Idle
//!                                                 (pomodoro only)   (round+1)
//! ```
//!
//! Triggers fired from any other source state are silent no-ops; that is the
//! machine's only strictly enforced rule.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::events::Event;
use crate::feedback::{SoundCue, VIBE_ARM, VIBE_FAIL, VIBE_FLIP, VIBE_SUCCESS};
use crate::session::quotes::QuotePicker;

/// Upper bound for the duration wheel, in minutes.
pub(crate) const MAX_MINUTES: u32 = 180;

/// Sessions at or below this length never reach the stats store.
const MIN_STAT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    Timer,
    Pomodoro,
    Stopwatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    ReadyToFlip,
    Focusing,
    Failed,
    Completed,
    Break,
}

/// Looping background noise played while focusing. `None` selects silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbientTrack {
    None,
    Rain,
    Waves,
    Zen,
}

impl AmbientTrack {
    /// Symbolic asset name for the sink lookup.
    pub fn asset_name(&self) -> Option<&'static str> {
        match self {
            AmbientTrack::None => None,
            AmbientTrack::Rain => Some("rain"),
            AmbientTrack::Waves => Some("waves"),
            AmbientTrack::Zen => Some("zen"),
        }
    }
}

/// The published session value. Replaced wholesale on every transition;
/// observers never see a half-applied state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub app_mode: AppMode,
    pub timer_state: TimerState,
    /// Current pomodoro round, starting at 1. Increments only when a break
    /// runs to completion; reset to 1 only by an explicit reset.
    pub pomodoro_round: u32,
    pub timer_minutes: u32,
    pub pomodoro_minutes: u32,
    pub break_minutes: u32,
    pub ambient_track: AmbientTrack,
    /// Set on entry into `Focusing`, cleared on every exit from it.
    pub started_at: Option<DateTime<Utc>>,
    /// Remaining seconds while counting down; elapsed seconds for the
    /// stopwatch. While idle, previews the selected duration (0 for
    /// stopwatch).
    pub clock_secs: u64,
    /// Motivational message picked by the last completion.
    pub completion_quote: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        let mut session = Self {
            app_mode: AppMode::Timer,
            timer_state: TimerState::Idle,
            pomodoro_round: 1,
            timer_minutes: 25,
            pomodoro_minutes: 25,
            break_minutes: 5,
            ambient_track: AmbientTrack::None,
            started_at: None,
            clock_secs: 0,
            completion_quote: None,
        };
        session.clock_secs = session.idle_preview_secs();
        session
    }
}

impl Session {
    /// True while a countdown owns the clock (focus in timer/pomodoro, or a
    /// break).
    pub fn is_counting(&self) -> bool {
        match self.timer_state {
            TimerState::Focusing => self.app_mode != AppMode::Stopwatch,
            TimerState::Break => true,
            _ => false,
        }
    }

    pub fn is_stopwatch_running(&self) -> bool {
        self.timer_state == TimerState::Focusing && self.app_mode == AppMode::Stopwatch
    }

    /// Focus duration for the current mode, in seconds.
    pub fn focus_duration_secs(&self) -> u64 {
        match self.app_mode {
            AppMode::Timer => self.timer_minutes as u64 * 60,
            AppMode::Pomodoro => self.pomodoro_minutes as u64 * 60,
            AppMode::Stopwatch => 0,
        }
    }

    pub fn break_duration_secs(&self) -> u64 {
        self.break_minutes as u64 * 60
    }

    /// What the clock shows while idle.
    pub(crate) fn idle_preview_secs(&self) -> u64 {
        match self.app_mode {
            AppMode::Stopwatch => 0,
            _ => self.focus_duration_secs(),
        }
    }
}

/// Side effects a transition asks the runtime to execute, in order.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Forward a waveform to the haptics collaborator.
    Vibrate(&'static [u64]),
    /// Play a one-shot feedback cue.
    PlaySound(SoundCue),
    /// Apply or revert the interruption filter, subject to the user
    /// preference.
    SetDnd(bool),
    /// Begin looping ambient audio after the grace delay, if the session is
    /// still focusing by then.
    ScheduleAmbient(AmbientTrack),
    /// Ramp the ambient channel down to silence, then stop it.
    FadeOutAmbient,
    /// Stop the ambient channel at once, no ramp.
    StopAmbient,
    /// Spawn a fresh countdown for the phase that just began.
    ArmCountdown { duration_secs: u64 },
    /// Spawn the stopwatch loop, resuming from accumulated elapsed seconds.
    ArmStopwatch { accumulated_secs: u64 },
    /// Cancel any live countdown/stopwatch/grace tasks.
    CancelTimers,
    /// Add a completed focus span to today's bucket.
    RecordStat { seconds: u64 },
    /// Broadcast to observers.
    Notify(Event),
}

/// The session state machine.
///
/// Serializable so poll-based callers can persist it between invocations and
/// keep applying triggers to the same session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionMachine {
    session: Session,
    /// Wall-clock instant of the last applied countdown second. Lets
    /// [`flush_elapsed`](Self::flush_elapsed) catch up after a gap.
    #[serde(default)]
    last_tick_at: Option<DateTime<Utc>>,
    #[serde(skip, default)]
    quotes: QuotePicker,
}

impl SessionMachine {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            last_tick_at: None,
            quotes: QuotePicker::default(),
        }
    }

    /// A machine with a deterministic quote picker.
    pub fn with_picker(session: Session, quotes: QuotePicker) -> Self {
        Self {
            session,
            last_tick_at: None,
            quotes,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> TimerState {
        self.session.timer_state
    }

    pub fn mode(&self) -> AppMode {
        self.session.app_mode
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            state: self.session.timer_state,
            mode: self.session.app_mode,
            round: self.session.pomodoro_round,
            clock_secs: self.session.clock_secs,
            started_at: self.session.started_at,
            quote: self.session.completion_quote.clone(),
            at: Utc::now(),
        }
    }

    // ── Triggers ─────────────────────────────────────────────────────

    /// Arm the flip gate. Accepted from `Idle`, or from `Break` to cut the
    /// rest of the break short (the round does not advance).
    pub fn request_start(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        match self.session.timer_state {
            TimerState::Idle => {
                self.session.timer_state = TimerState::ReadyToFlip;
                vec![
                    Effect::Vibrate(VIBE_ARM),
                    Effect::Notify(Event::SessionArmed {
                        mode: self.session.app_mode,
                        at: now,
                    }),
                ]
            }
            TimerState::Break => {
                self.session.timer_state = TimerState::ReadyToFlip;
                self.session.clock_secs = self.session.focus_duration_secs();
                self.last_tick_at = None;
                vec![
                    Effect::CancelTimers,
                    Effect::Vibrate(VIBE_ARM),
                    Effect::Notify(Event::SessionArmed {
                        mode: self.session.app_mode,
                        at: now,
                    }),
                ]
            }
            _ => Vec::new(),
        }
    }

    /// The phone went face-down: the focus gate opens.
    pub fn face_down(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        if self.session.timer_state != TimerState::ReadyToFlip {
            return Vec::new();
        }
        self.session.timer_state = TimerState::Focusing;
        self.session.started_at = Some(now);

        let mut effects = vec![
            Effect::Vibrate(VIBE_FLIP),
            Effect::SetDnd(true),
            Effect::PlaySound(SoundCue::Start),
        ];
        if self.session.ambient_track != AmbientTrack::None {
            effects.push(Effect::ScheduleAmbient(self.session.ambient_track));
        }

        let duration_secs = match self.session.app_mode {
            AppMode::Stopwatch => {
                effects.push(Effect::ArmStopwatch {
                    accumulated_secs: self.session.clock_secs,
                });
                None
            }
            _ => {
                let secs = self.session.focus_duration_secs();
                self.session.clock_secs = secs;
                self.last_tick_at = Some(now);
                effects.push(Effect::ArmCountdown {
                    duration_secs: secs,
                });
                Some(secs)
            }
        };
        effects.push(Effect::Notify(Event::FocusStarted {
            mode: self.session.app_mode,
            duration_secs,
            at: now,
        }));
        effects
    }

    /// The phone came back face-up. Ends a stopwatch session; fails any
    /// other focus session.
    pub fn face_up(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        if self.session.timer_state != TimerState::Focusing {
            return Vec::new();
        }
        if self.session.app_mode == AppMode::Stopwatch {
            return self.complete(now);
        }
        self.session.timer_state = TimerState::Failed;
        self.session.started_at = None;
        self.last_tick_at = None;
        vec![
            Effect::CancelTimers,
            Effect::SetDnd(false),
            Effect::FadeOutAmbient,
            Effect::Vibrate(VIBE_FAIL),
            Effect::Notify(Event::FocusFailed { at: now }),
        ]
    }

    /// One countdown pulse: a second of focus or break has elapsed.
    pub fn countdown_tick(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        if !self.session.is_counting() {
            return Vec::new();
        }
        self.session.clock_secs = self.session.clock_secs.saturating_sub(1);
        self.last_tick_at = Some(now);
        if self.session.clock_secs == 0 {
            return self.complete(now);
        }
        Vec::new()
    }

    /// Stopwatch refresh with elapsed seconds recomputed from the wall
    /// clock by the caller.
    pub fn stopwatch_tick(&mut self, _now: DateTime<Utc>, elapsed_secs: u64) -> Vec<Effect> {
        if self.session.is_stopwatch_running() {
            self.session.clock_secs = elapsed_secs;
        }
        Vec::new()
    }

    /// Back to `Idle`. Accepted from `ReadyToFlip` (cancel before flipping),
    /// `Failed` and `Completed`; a no-op anywhere else.
    pub fn request_reset(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        match self.session.timer_state {
            TimerState::ReadyToFlip | TimerState::Failed | TimerState::Completed => {
                self.session.timer_state = TimerState::Idle;
                self.session.pomodoro_round = 1;
                self.session.started_at = None;
                self.session.completion_quote = None;
                self.session.clock_secs = self.session.idle_preview_secs();
                self.last_tick_at = None;
                vec![
                    Effect::StopAmbient,
                    Effect::Notify(Event::SessionReset { at: now }),
                ]
            }
            _ => Vec::new(),
        }
    }

    /// Apply the wall-clock time elapsed since the last applied tick, one
    /// second at a time, rolling through completions (a pomodoro focus that
    /// expired an hour ago rolls into its break, and the break into `Idle`).
    /// For poll-based callers; the async engine ticks in real time instead.
    pub fn flush_elapsed(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.session.is_counting() {
            let Some(last) = self.last_tick_at else {
                return effects;
            };
            let mut at = last;
            let mut pending = (now - last).num_seconds();
            while pending > 0 && self.session.is_counting() {
                at += Duration::seconds(1);
                effects.extend(self.countdown_tick(at));
                pending -= 1;
            }
        } else if self.session.is_stopwatch_running() {
            if let Some(started) = self.session.started_at {
                let elapsed = (now - started).num_seconds().max(0) as u64;
                effects.extend(self.stopwatch_tick(now, elapsed));
            }
        }
        effects
    }

    // ── Selectors (idle only) ────────────────────────────────────────

    /// Switch modes. Returns false when not idle or nothing changed.
    pub fn select_mode(&mut self, mode: AppMode) -> bool {
        if self.session.timer_state != TimerState::Idle || self.session.app_mode == mode {
            return false;
        }
        self.session.app_mode = mode;
        self.session.clock_secs = self.session.idle_preview_secs();
        true
    }

    /// Set the focus duration for the current mode. Silently ignored when
    /// not idle or in stopwatch mode.
    pub fn set_minutes(&mut self, minutes: u32) -> Result<(), ValidationError> {
        if minutes < 1 || minutes > MAX_MINUTES {
            return Err(ValidationError::InvalidValue {
                field: "minutes".into(),
                message: format!("must be between 1 and {MAX_MINUTES}"),
            });
        }
        if self.session.timer_state != TimerState::Idle {
            return Ok(());
        }
        match self.session.app_mode {
            AppMode::Timer => self.session.timer_minutes = minutes,
            AppMode::Pomodoro => self.session.pomodoro_minutes = minutes,
            AppMode::Stopwatch => return Ok(()),
        }
        self.session.clock_secs = self.session.idle_preview_secs();
        Ok(())
    }

    /// Pick the ambient noise for the next session. Returns false when not
    /// idle or nothing changed.
    pub fn select_track(&mut self, track: AmbientTrack) -> bool {
        if self.session.timer_state != TimerState::Idle || self.session.ambient_track == track {
            return false;
        }
        self.session.ambient_track = track;
        true
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Shared completion handler for face-up-while-stopwatch and
    /// countdown-zero. A break expiring lands here too; it carries no start
    /// timestamp, so nothing is recorded for it.
    fn complete(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let from_break = self.session.timer_state == TimerState::Break;
        let focused_secs = self
            .session
            .started_at
            .take()
            .map(|started| (now - started).num_seconds().max(0) as u64)
            .unwrap_or(0);

        let mut effects = vec![Effect::CancelTimers];
        let recorded = focused_secs > MIN_STAT_SECS;
        if recorded {
            effects.push(Effect::RecordStat {
                seconds: focused_secs,
            });
        }

        let quote = self.quotes.pick().to_string();
        self.session.completion_quote = Some(quote.clone());
        effects.push(Effect::Vibrate(VIBE_SUCCESS));
        effects.push(Effect::PlaySound(SoundCue::Success));
        effects.push(Effect::FadeOutAmbient);
        effects.push(Effect::SetDnd(false));

        if self.session.app_mode == AppMode::Pomodoro {
            if from_break {
                self.session.timer_state = TimerState::Idle;
                self.session.pomodoro_round += 1;
                self.session.clock_secs = self.session.idle_preview_secs();
                self.last_tick_at = None;
                effects.push(Effect::Notify(Event::BreakFinished {
                    round: self.session.pomodoro_round,
                    at: now,
                }));
            } else {
                let break_secs = self.session.break_duration_secs();
                self.session.timer_state = TimerState::Break;
                self.session.clock_secs = break_secs;
                self.last_tick_at = Some(now);
                effects.push(Effect::Notify(Event::SessionCompleted {
                    mode: self.session.app_mode,
                    focused_secs,
                    recorded,
                    quote,
                    at: now,
                }));
                effects.push(Effect::ArmCountdown {
                    duration_secs: break_secs,
                });
                effects.push(Effect::Notify(Event::BreakStarted {
                    round: self.session.pomodoro_round,
                    duration_secs: break_secs,
                    at: now,
                }));
            }
        } else {
            self.session.timer_state = TimerState::Completed;
            self.last_tick_at = None;
            effects.push(Effect::Notify(Event::SessionCompleted {
                mode: self.session.app_mode,
                focused_secs,
                recorded,
                quote,
                at: now,
            }));
        }
        effects
    }
}
