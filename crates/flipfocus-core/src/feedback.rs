//! Haptic, sound, and Do-Not-Disturb feedback.
//!
//! The dispatcher fans transition feedback out to platform adapters.
//! Feedback is best-effort everywhere: absent hardware, missing assets,
//! and denied permissions degrade to logged no-ops rather than errors.
//!
//! The Do-Not-Disturb preference is persisted in the kv store and honored
//! in both directions. With the preference off the dispatcher never
//! touches the interruption filter, not even to clear it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::storage::Database;

/// Vibration waveforms as `[delay_ms, vibrate_ms, ...]` pairs.
pub const VIBE_ARM: &[u64] = &[0, 20];
pub const VIBE_FLIP: &[u64] = &[0, 50];
pub const VIBE_FAIL: &[u64] = &[0, 500];
pub const VIBE_SUCCESS: &[u64] = &[0, 100, 50, 100];

const DND_PREF_KEY: &str = "dnd_enabled";

/// One-shot sound cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    Start,
    Success,
}

impl SoundCue {
    pub fn asset_name(&self) -> &'static str {
        match self {
            SoundCue::Start => "start",
            SoundCue::Success => "success",
        }
    }
}

/// Vibration hardware. The default body covers platforms without any.
pub trait Haptics: Send + Sync {
    /// Play a waveform of alternating delay/vibrate milliseconds.
    fn vibrate(&self, _pattern: &[u64]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// One-shot sound assets. `play_one_shot` reports a missing asset as
/// `false`, never as an error.
pub trait SoundBank: Send + Sync {
    fn play_one_shot(&self, _name: &str) -> bool {
        false
    }
}

/// OS notification filter. The defaults model a platform where the filter
/// simply does not exist, so toggling it succeeds silently.
pub trait InterruptionPolicy: Send + Sync {
    fn has_access(&self) -> bool {
        true
    }

    /// Switch priority-only interruption filtering on or off.
    fn set_priority_only(
        &self,
        _enabled: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    /// Ask the platform for notification-policy access. Fire and forget;
    /// the answer arrives out of band, if at all.
    fn request_access(&self) {}
}

#[derive(Debug, Default)]
pub struct NoopHaptics;
impl Haptics for NoopHaptics {}

#[derive(Debug, Default)]
pub struct NoopSoundBank;
impl SoundBank for NoopSoundBank {}

#[derive(Debug, Default)]
pub struct NoopInterruptionPolicy;
impl InterruptionPolicy for NoopInterruptionPolicy {}

/// Routes vibration, sound, and DND effects to the platform adapters.
pub struct FeedbackDispatcher {
    haptics: Arc<dyn Haptics>,
    sounds: Arc<dyn SoundBank>,
    policy: Arc<dyn InterruptionPolicy>,
    db: Arc<Database>,
    dnd_preference: AtomicBool,
}

impl FeedbackDispatcher {
    /// Build a dispatcher, loading the persisted DND preference. A missing
    /// key means the user never touched the toggle, which defaults to on.
    pub fn new(
        haptics: Arc<dyn Haptics>,
        sounds: Arc<dyn SoundBank>,
        policy: Arc<dyn InterruptionPolicy>,
        db: Arc<Database>,
    ) -> Self {
        let preference = match db.kv_get(DND_PREF_KEY) {
            Ok(Some(v)) => v == "true",
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "failed to load dnd preference, assuming on");
                true
            }
        };
        Self {
            haptics,
            sounds,
            policy,
            db,
            dnd_preference: AtomicBool::new(preference),
        }
    }

    pub fn dnd_preference(&self) -> bool {
        self.dnd_preference.load(Ordering::Relaxed)
    }

    pub fn set_dnd_preference(&self, enabled: bool) {
        self.dnd_preference.store(enabled, Ordering::Relaxed);
        let value = if enabled { "true" } else { "false" };
        if let Err(e) = self.db.kv_set(DND_PREF_KEY, value) {
            warn!(error = %e, "failed to persist dnd preference");
        }
    }

    pub fn vibrate(&self, pattern: &[u64]) {
        if let Err(e) = self.haptics.vibrate(pattern) {
            debug!(error = %e, "vibration unavailable");
        }
    }

    pub fn play_cue(&self, cue: SoundCue) {
        if !self.sounds.play_one_shot(cue.asset_name()) {
            debug!(cue = cue.asset_name(), "sound asset missing");
        }
    }

    /// Apply or lift priority-only filtering. A no-op when the preference
    /// is off; without policy access, enabling asks for access instead so
    /// a later session can succeed.
    pub fn set_do_not_disturb(&self, enabled: bool) {
        if !self.dnd_preference() {
            return;
        }
        if self.policy.has_access() {
            if let Err(e) = self.policy.set_priority_only(enabled) {
                warn!(enabled, error = %e, "failed to switch interruption filter");
            }
        } else if enabled {
            self.policy.request_access();
        }
    }
}
