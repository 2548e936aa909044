//! Async runtime around the session machine.
//!
//! ```text
//!   commands ──┐
//!   sensor pump├──> machine (behind one lock) ──> effects
//!   tick tasks ┘          │                          │
//!                         ▼                          ▼
//!               watch<Session> snapshots    audio / feedback / stats
//!                                           broadcast<Event>
//! ```
//!
//! The machine is the single writer. Every entry point locks it, applies
//! one trigger, publishes the full session snapshot, and only then runs
//! the returned effects with the lock released. Observers woken by an
//! effect therefore always read the post-transition state.
//!
//! Background tasks (countdown, stopwatch, ambient grace, sensor pump)
//! stop by polling a [`CancelToken`] between steps. They also re-check the
//! session snapshot each step, so a tick that lost the cancellation race
//! hits a machine guard and dies as a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::audio::{AmbientSink, AudioFadeController, FadeTiming, NoopAmbientSink};
use crate::cancel::CancelToken;
use crate::error::ValidationError;
use crate::events::Event;
use crate::feedback::{
    FeedbackDispatcher, Haptics, InterruptionPolicy, NoopHaptics, NoopInterruptionPolicy,
    NoopSoundBank, SoundBank,
};
use crate::orientation::{AccelSample, OrientationEdge, OrientationMonitor};
use crate::session::{AmbientTrack, AppMode, Effect, Session, SessionMachine, TimerState};
use crate::stats::StatsAggregator;
use crate::storage::Database;
use crate::timer;

/// Cadences and ramp shapes for the background tasks. The default is the
/// production clock; tests shrink everything.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Countdown pulse interval.
    pub countdown_tick: Duration,
    /// Stopwatch refresh interval.
    pub stopwatch_tick: Duration,
    /// Delay between focus start and ambient audio.
    pub ambient_grace: Duration,
    pub fade: FadeTiming,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            countdown_tick: Duration::from_secs(1),
            stopwatch_tick: Duration::from_millis(500),
            ambient_grace: Duration::from_millis(2000),
            fade: FadeTiming::default(),
        }
    }
}

/// The platform adapters the engine drives.
#[derive(Clone)]
pub struct Platform {
    pub ambient: Arc<dyn AmbientSink>,
    pub sounds: Arc<dyn SoundBank>,
    pub haptics: Arc<dyn Haptics>,
    pub dnd: Arc<dyn InterruptionPolicy>,
}

impl Platform {
    /// Adapters that do nothing, for headless runs and tests.
    pub fn noop() -> Self {
        Self {
            ambient: Arc::new(NoopAmbientSink),
            sounds: Arc::new(NoopSoundBank),
            haptics: Arc::new(NoopHaptics),
            dnd: Arc::new(NoopInterruptionPolicy),
        }
    }
}

struct EngineState {
    machine: SessionMachine,
    /// Live countdown or stopwatch task.
    ticker: Option<CancelToken>,
    /// Pending ambient grace delay.
    grace: Option<CancelToken>,
    /// Sensor pump spawned by [`SessionEngine::attach`].
    pump: Option<CancelToken>,
}

struct EngineCore {
    state: parking_lot::Mutex<EngineState>,
    snapshot_tx: watch::Sender<Session>,
    events_tx: broadcast::Sender<Event>,
    audio: AudioFadeController,
    feedback: FeedbackDispatcher,
    stats: StatsAggregator,
    timing: Timing,
}

/// Handle to the running engine. Cloning is cheap; all clones drive the
/// same session.
#[derive(Clone)]
pub struct SessionEngine {
    core: Arc<EngineCore>,
}

impl SessionEngine {
    /// Build an engine around an existing machine. Must be called from
    /// within a tokio runtime; transitions spawn their tick tasks on it.
    pub fn new(machine: SessionMachine, platform: Platform, db: Arc<Database>, timing: Timing) -> Self {
        let (snapshot_tx, _) = watch::channel(machine.session().clone());
        let (events_tx, _) = broadcast::channel(64);
        let audio = AudioFadeController::new(platform.ambient, timing.fade);
        let feedback =
            FeedbackDispatcher::new(platform.haptics, platform.sounds, platform.dnd, db.clone());
        let stats = StatsAggregator::new(db);
        Self {
            core: Arc::new(EngineCore {
                state: parking_lot::Mutex::new(EngineState {
                    machine,
                    ticker: None,
                    grace: None,
                    pump: None,
                }),
                snapshot_tx,
                events_tx,
                audio,
                feedback,
                stats,
                timing,
            }),
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn snapshot(&self) -> Session {
        self.core.snapshot_tx.borrow().clone()
    }

    /// Receiver that always holds the latest session snapshot.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.core.snapshot_tx.subscribe()
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.core.events_tx.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Arm the flip gate.
    pub fn start(&self) {
        apply_on(&self.core, |m| m.request_start(Utc::now()));
    }

    /// Back to idle from an armed, failed, or completed session.
    pub fn reset(&self) {
        apply_on(&self.core, |m| m.request_reset(Utc::now()));
    }

    /// Inject a face-down edge directly, bypassing any attached sensor.
    pub fn flip_down(&self) {
        apply_on(&self.core, |m| m.face_down(Utc::now()));
    }

    /// Inject a face-up edge directly.
    pub fn flip_up(&self) {
        apply_on(&self.core, |m| m.face_up(Utc::now()));
    }

    pub fn select_mode(&self, mode: AppMode) -> bool {
        let mut changed = false;
        apply_on(&self.core, |m| {
            changed = m.select_mode(mode);
            Vec::new()
        });
        changed
    }

    pub fn set_minutes(&self, minutes: u32) -> Result<(), ValidationError> {
        let mut result = Ok(());
        apply_on(&self.core, |m| {
            result = m.set_minutes(minutes);
            Vec::new()
        });
        result
    }

    pub fn select_track(&self, track: AmbientTrack) -> bool {
        let mut changed = false;
        apply_on(&self.core, |m| {
            changed = m.select_track(track);
            Vec::new()
        });
        changed
    }

    pub fn dnd_preference(&self) -> bool {
        self.core.feedback.dnd_preference()
    }

    /// Flip the Do-Not-Disturb preference. Only accepted while idle, so a
    /// filter applied by a running session is always lifted by the same
    /// preference that applied it.
    pub fn set_dnd_preference(&self, enabled: bool) -> bool {
        let state = self.core.state.lock();
        if state.machine.state() != TimerState::Idle {
            return false;
        }
        self.core.feedback.set_dnd_preference(enabled);
        true
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Pump accelerometer samples into the machine. Replaces any previous
    /// pump.
    pub fn attach(&self, mut samples: mpsc::Receiver<AccelSample>) {
        let token = CancelToken::new();
        {
            let mut state = self.core.state.lock();
            if let Some(old) = state.pump.replace(token.clone()) {
                old.cancel();
            }
        }
        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            let mut monitor = OrientationMonitor::new();
            while let Some(sample) = samples.recv().await {
                if token.is_cancelled() {
                    break;
                }
                match monitor.observe(sample) {
                    Some(OrientationEdge::FaceDown) => {
                        apply_on(&core, |m| m.face_down(Utc::now()));
                    }
                    Some(OrientationEdge::FaceUp) => {
                        apply_on(&core, |m| m.face_up(Utc::now()));
                    }
                    None => {}
                }
            }
            debug!("sensor pump stopped");
        });
    }

    /// Catch the machine up after a gap and re-arm the tick task for
    /// whatever phase survives. For runtimes restoring a persisted session.
    pub fn resume(&self) {
        apply_on(&self.core, |m| m.flush_elapsed(Utc::now()));
        let (needs_countdown, needs_stopwatch, accumulated) = {
            let state = self.core.state.lock();
            let session = state.machine.session();
            let idle_ticker = state.ticker.is_none();
            (
                idle_ticker && session.is_counting(),
                idle_ticker && session.is_stopwatch_running(),
                session.clock_secs,
            )
        };
        if needs_countdown {
            arm_countdown(&self.core);
        } else if needs_stopwatch {
            arm_stopwatch(&self.core, accumulated);
        }
    }

    /// Tear the runtime down: cancel every task, silence the ambient
    /// channel without a ramp, and lift the interruption filter.
    pub fn detach(&self) {
        {
            let mut state = self.core.state.lock();
            for token in [
                state.ticker.take(),
                state.grace.take(),
                state.pump.take(),
            ]
            .into_iter()
            .flatten()
            {
                token.cancel();
            }
        }
        self.core.audio.stop_ambient(false);
        self.core.feedback.set_do_not_disturb(false);
    }
}

/// Apply one trigger under the lock, publish the snapshot, then run the
/// effects.
fn apply_on(core: &Arc<EngineCore>, f: impl FnOnce(&mut SessionMachine) -> Vec<Effect>) {
    let (effects, session) = {
        let mut state = core.state.lock();
        let effects = f(&mut state.machine);
        (effects, state.machine.session().clone())
    };
    core.snapshot_tx.send_replace(session);
    for effect in effects {
        run_effect(core, effect);
    }
}

fn run_effect(core: &Arc<EngineCore>, effect: Effect) {
    match effect {
        Effect::Vibrate(pattern) => core.feedback.vibrate(pattern),
        Effect::PlaySound(cue) => core.feedback.play_cue(cue),
        Effect::SetDnd(enabled) => core.feedback.set_do_not_disturb(enabled),
        Effect::ScheduleAmbient(track) => schedule_ambient(core, track),
        Effect::FadeOutAmbient => core.audio.stop_ambient(true),
        Effect::StopAmbient => core.audio.stop_ambient(false),
        Effect::ArmCountdown { .. } => arm_countdown(core),
        Effect::ArmStopwatch { accumulated_secs } => arm_stopwatch(core, accumulated_secs),
        Effect::CancelTimers => cancel_timers(core),
        Effect::RecordStat { seconds } => record_stat(core, seconds),
        Effect::Notify(event) => publish(core, event),
    }
}

fn publish(core: &EngineCore, event: Event) {
    // Send fails only when nobody listens.
    let _ = core.events_tx.send(event);
}

fn record_stat(core: &Arc<EngineCore>, seconds: u64) {
    match core.stats.record(seconds) {
        Ok((key, total_secs)) => publish(
            core,
            Event::StatsUpdated {
                key,
                total_secs,
                at: Utc::now(),
            },
        ),
        Err(e) => warn!(error = %e, "failed to record focus stat"),
    }
}

/// Start ambient audio after the grace delay, unless the session left
/// `Focusing` (or the timers were cancelled) in the meantime.
fn schedule_ambient(core: &Arc<EngineCore>, track: AmbientTrack) {
    let token = CancelToken::new();
    {
        let mut state = core.state.lock();
        if let Some(old) = state.grace.replace(token.clone()) {
            old.cancel();
        }
    }
    let core = Arc::clone(core);
    tokio::spawn(async move {
        tokio::time::sleep(core.timing.ambient_grace).await;
        if token.is_cancelled() {
            return;
        }
        if core.snapshot_tx.borrow().timer_state != TimerState::Focusing {
            return;
        }
        core.audio.start_ambient(track);
    });
}

fn arm_countdown(core: &Arc<EngineCore>) {
    let session = core.snapshot_tx.subscribe();
    let cb_core = Arc::clone(core);
    let token = timer::countdown::spawn(session, core.timing.countdown_tick, move || {
        apply_on(&cb_core, |m| m.countdown_tick(Utc::now()));
    });
    replace_ticker(core, token);
}

fn arm_stopwatch(core: &Arc<EngineCore>, accumulated_secs: u64) {
    let session = core.snapshot_tx.subscribe();
    let cb_core = Arc::clone(core);
    let token = timer::stopwatch::spawn(
        session,
        core.timing.stopwatch_tick,
        accumulated_secs,
        move |elapsed_secs| {
            apply_on(&cb_core, |m| m.stopwatch_tick(Utc::now(), elapsed_secs));
        },
    );
    replace_ticker(core, token);
}

fn replace_ticker(core: &EngineCore, token: CancelToken) {
    let mut state = core.state.lock();
    if let Some(old) = state.ticker.replace(token) {
        old.cancel();
    }
}

fn cancel_timers(core: &EngineCore) {
    let mut state = core.state.lock();
    if let Some(token) = state.ticker.take() {
        token.cancel();
    }
    if let Some(token) = state.grace.take() {
        token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::QuotePicker;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn fast_timing() -> Timing {
        Timing {
            countdown_tick: Duration::from_millis(5),
            stopwatch_tick: Duration::from_millis(5),
            ambient_grace: Duration::from_millis(40),
            fade: FadeTiming {
                fade_in_steps: 3,
                fade_in_interval: Duration::from_millis(5),
                fade_out_steps: 3,
                fade_out_interval: Duration::from_millis(5),
            },
        }
    }

    fn engine_with(platform: Platform, session: Session) -> SessionEngine {
        let db = Arc::new(Database::open_memory().unwrap());
        let machine = SessionMachine::with_picker(session, QuotePicker::new(Some(7)));
        SessionEngine::new(machine, platform, db, fast_timing())
    }

    fn short_timer_session() -> Session {
        Session {
            timer_minutes: 1,
            ..Session::default()
        }
    }

    async fn wait_for<F: Fn(&Event) -> bool>(
        events: &mut broadcast::Receiver<Event>,
        pred: F,
    ) -> Event {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.expect("event stream closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("expected event never arrived")
    }

    #[derive(Default)]
    struct RecordingPlatform {
        ambient_started: Mutex<Vec<String>>,
        ambient_playing: AtomicBool,
        cues: Mutex<Vec<String>>,
        waveforms: Mutex<Vec<Vec<u64>>>,
        dnd: Mutex<Vec<bool>>,
    }

    impl AmbientSink for RecordingPlatform {
        fn play_looping(&self, name: &str) -> bool {
            self.ambient_started.lock().push(name.to_string());
            self.ambient_playing.store(true, Ordering::SeqCst);
            true
        }
        fn set_volume(&self, _volume: f32) {}
        fn stop(&self) {
            self.ambient_playing.store(false, Ordering::SeqCst);
        }
    }
    impl SoundBank for RecordingPlatform {
        fn play_one_shot(&self, name: &str) -> bool {
            self.cues.lock().push(name.to_string());
            true
        }
    }
    impl Haptics for RecordingPlatform {
        fn vibrate(
            &self,
            pattern: &[u64],
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.waveforms.lock().push(pattern.to_vec());
            Ok(())
        }
    }
    impl InterruptionPolicy for RecordingPlatform {
        fn set_priority_only(
            &self,
            enabled: bool,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.dnd.lock().push(enabled);
            Ok(())
        }
    }

    fn recording_platform() -> (Arc<RecordingPlatform>, Platform) {
        let recorder = Arc::new(RecordingPlatform::default());
        let platform = Platform {
            ambient: recorder.clone(),
            sounds: recorder.clone(),
            haptics: recorder.clone(),
            dnd: recorder.clone(),
        };
        (recorder, platform)
    }

    #[tokio::test]
    async fn countdown_session_runs_to_completion() {
        let (recorder, platform) = recording_platform();
        let engine = engine_with(platform, short_timer_session());
        let mut events = engine.subscribe();

        engine.start();
        assert_eq!(engine.snapshot().timer_state, TimerState::ReadyToFlip);
        engine.flip_down();
        assert_eq!(engine.snapshot().timer_state, TimerState::Focusing);

        let done = wait_for(&mut events, |e| matches!(e, Event::SessionCompleted { .. })).await;
        let Event::SessionCompleted { recorded, quote, .. } = done else {
            unreachable!()
        };
        // Sixty 5ms pulses pass well under the stat gate.
        assert!(!recorded);
        assert!(!quote.is_empty());
        assert_eq!(engine.snapshot().timer_state, TimerState::Completed);
        assert_eq!(engine.snapshot().clock_secs, 0);

        // Filter went up at flip and came down at completion.
        assert_eq!(*recorder.dnd.lock(), vec![true, false]);
        assert_eq!(*recorder.cues.lock(), vec!["start", "success"]);
    }

    #[tokio::test]
    async fn face_up_fails_the_session_and_stops_the_clock() {
        let (recorder, platform) = recording_platform();
        let engine = engine_with(platform, short_timer_session());
        let mut events = engine.subscribe();

        engine.start();
        engine.flip_down();
        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.flip_up();

        wait_for(&mut events, |e| matches!(e, Event::FocusFailed { .. })).await;
        assert_eq!(engine.snapshot().timer_state, TimerState::Failed);

        let frozen = engine.snapshot().clock_secs;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.snapshot().clock_secs, frozen);
        assert!(recorder.waveforms.lock().contains(&vec![0, 500]));
        assert_eq!(*recorder.dnd.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn stopwatch_completes_on_flip_up() {
        let (_, platform) = recording_platform();
        let engine = engine_with(platform, Session::default());
        assert!(engine.select_mode(AppMode::Stopwatch));
        let mut events = engine.subscribe();

        engine.start();
        engine.flip_down();
        tokio::time::sleep(Duration::from_millis(40)).await;
        engine.flip_up();

        let done = wait_for(&mut events, |e| matches!(e, Event::SessionCompleted { .. })).await;
        let Event::SessionCompleted { mode, recorded, .. } = done else {
            unreachable!()
        };
        assert_eq!(mode, AppMode::Stopwatch);
        assert!(!recorded);
        assert_eq!(engine.snapshot().timer_state, TimerState::Completed);
    }

    #[tokio::test]
    async fn ambient_grace_is_cancelled_by_an_early_failure() {
        let (recorder, platform) = recording_platform();
        let engine = engine_with(platform, short_timer_session());
        assert!(engine.select_track(AmbientTrack::Rain));

        engine.start();
        engine.flip_down();
        // Fail before the 40ms grace elapses.
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.flip_up();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(recorder.ambient_started.lock().is_empty());
    }

    #[tokio::test]
    async fn ambient_starts_after_the_grace_and_fades_out_on_completion() {
        let (recorder, platform) = recording_platform();
        let engine = engine_with(platform, Session::default());
        assert!(engine.select_mode(AppMode::Stopwatch));
        assert!(engine.select_track(AmbientTrack::Waves));

        engine.start();
        engine.flip_down();
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(*recorder.ambient_started.lock(), vec!["waves"]);
        assert!(recorder.ambient_playing.load(Ordering::SeqCst));

        engine.flip_up();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!recorder.ambient_playing.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn sensor_pump_drives_the_flip_gate() {
        let (_, platform) = recording_platform();
        let engine = engine_with(platform, short_timer_session());
        let (tx, rx) = mpsc::channel(8);
        engine.attach(rx);
        let mut events = engine.subscribe();

        engine.start();
        tx.send(AccelSample::new(0.0, 0.0, -9.6)).await.unwrap();
        wait_for(&mut events, |e| matches!(e, Event::FocusStarted { .. })).await;
        assert_eq!(engine.snapshot().timer_state, TimerState::Focusing);

        tx.send(AccelSample::new(0.1, 0.2, 9.7)).await.unwrap();
        wait_for(&mut events, |e| matches!(e, Event::FocusFailed { .. })).await;
        assert_eq!(engine.snapshot().timer_state, TimerState::Failed);
    }

    #[tokio::test]
    async fn resume_rearms_a_restored_countdown() {
        let (_, platform) = recording_platform();
        let db = Arc::new(Database::open_memory().unwrap());

        // A machine persisted mid-focus, two seconds stale.
        let mut machine = SessionMachine::new(short_timer_session());
        let then = Utc::now() - chrono::Duration::seconds(2);
        machine.request_start(then);
        machine.face_down(then);
        let engine = SessionEngine::new(machine, platform, db, fast_timing());

        engine.resume();
        let after_flush = engine.snapshot().clock_secs;
        assert!(after_flush <= 58);

        // The re-armed ticker keeps draining the clock.
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(engine.snapshot().clock_secs < after_flush);
    }

    #[tokio::test]
    async fn detach_lifts_dnd_and_stops_everything() {
        let (recorder, platform) = recording_platform();
        let engine = engine_with(platform, short_timer_session());
        assert!(engine.select_track(AmbientTrack::Zen));

        engine.start();
        engine.flip_down();
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(recorder.ambient_playing.load(Ordering::SeqCst));

        engine.detach();
        assert!(!recorder.ambient_playing.load(Ordering::SeqCst));
        assert_eq!(recorder.dnd.lock().last(), Some(&false));

        let frozen = engine.snapshot().clock_secs;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.snapshot().clock_secs, frozen);
    }

    #[tokio::test]
    async fn dnd_preference_only_changes_while_idle() {
        let (_, platform) = recording_platform();
        let engine = engine_with(platform, short_timer_session());

        engine.start();
        assert!(!engine.set_dnd_preference(false));
        assert!(engine.dnd_preference());

        engine.reset();
        assert!(engine.set_dnd_preference(false));
        assert!(!engine.dnd_preference());
    }
}
