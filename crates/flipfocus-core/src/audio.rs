//! Ambient audio channel with ramped start/stop.
//!
//! The controller owns one looping channel over an [`AmbientSink`]
//! adapter. Volume ramps run as cancellable jobs; at most one job is alive
//! at a time, and starting a new ramp cancels the old one first, so two
//! ramps never fight over the channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::session::AmbientTrack;

/// Platform adapter for the looping ambient channel. A missing asset is
/// reported through `play_looping`, not an error; everything else is
/// assumed cheap and infallible.
pub trait AmbientSink: Send + Sync {
    /// Begin looping playback of the named asset. Returns false when the
    /// asset does not exist.
    fn play_looping(&self, name: &str) -> bool;
    fn set_volume(&self, volume: f32);
    fn stop(&self);
}

/// Sink for headless runs: no assets, nothing plays.
#[derive(Debug, Default)]
pub struct NoopAmbientSink;

impl AmbientSink for NoopAmbientSink {
    fn play_looping(&self, _name: &str) -> bool {
        false
    }
    fn set_volume(&self, _volume: f32) {}
    fn stop(&self) {}
}

/// Ramp shapes. Fade-in climbs 0 to 1; fade-out descends from the current
/// volume, wherever an interrupted climb left it.
#[derive(Debug, Clone, Copy)]
pub struct FadeTiming {
    pub fade_in_steps: u32,
    pub fade_in_interval: Duration,
    pub fade_out_steps: u32,
    pub fade_out_interval: Duration,
}

impl Default for FadeTiming {
    fn default() -> Self {
        Self {
            fade_in_steps: 20,
            fade_in_interval: Duration::from_millis(100),
            fade_out_steps: 15,
            fade_out_interval: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Default)]
struct Channel {
    playing: bool,
    volume: f32,
}

/// One ambient channel plus its single live fade job.
pub struct AudioFadeController {
    sink: Arc<dyn AmbientSink>,
    channel: Arc<Mutex<Channel>>,
    job: Mutex<Option<CancelToken>>,
    timing: FadeTiming,
}

impl AudioFadeController {
    pub fn new(sink: Arc<dyn AmbientSink>, timing: FadeTiming) -> Self {
        Self {
            sink,
            channel: Arc::new(Mutex::new(Channel::default())),
            job: Mutex::new(None),
            timing,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.channel.lock().playing
    }

    pub fn volume(&self) -> f32 {
        self.channel.lock().volume
    }

    /// Start the named track muted and ramp it up. Whatever played before
    /// stops cold first; its fade job dies with it.
    pub fn start_ambient(&self, track: AmbientTrack) {
        self.cancel_job();
        let was_playing = {
            let mut ch = self.channel.lock();
            let was = ch.playing;
            ch.playing = false;
            ch.volume = 0.0;
            was
        };
        if was_playing {
            self.sink.stop();
        }

        let Some(name) = track.asset_name() else {
            return;
        };
        if !self.sink.play_looping(name) {
            debug!(track = name, "ambient asset missing, staying silent");
            return;
        }
        self.sink.set_volume(0.0);
        self.channel.lock().playing = true;

        let token = self.replace_job();
        let sink = Arc::clone(&self.sink);
        let channel = Arc::clone(&self.channel);
        let steps = self.timing.fade_in_steps;
        let interval = self.timing.fade_in_interval;
        tokio::spawn(async move {
            for step in 1..=steps {
                tokio::time::sleep(interval).await;
                if token.is_cancelled() {
                    return;
                }
                let volume = step as f32 / steps as f32;
                {
                    let mut ch = channel.lock();
                    if !ch.playing {
                        return;
                    }
                    ch.volume = volume;
                }
                sink.set_volume(volume);
            }
        });
    }

    /// Stop the channel. With `fade`, ramp down from the current volume
    /// first; without, silence it on the spot. A no-op when nothing plays.
    pub fn stop_ambient(&self, fade: bool) {
        if !fade {
            self.cancel_job();
            let was_playing = {
                let mut ch = self.channel.lock();
                let was = ch.playing;
                ch.playing = false;
                ch.volume = 0.0;
                was
            };
            if was_playing {
                self.sink.stop();
            }
            return;
        }

        let from = {
            let ch = self.channel.lock();
            if !ch.playing {
                return;
            }
            ch.volume
        };
        let token = self.replace_job();
        let sink = Arc::clone(&self.sink);
        let channel = Arc::clone(&self.channel);
        let steps = self.timing.fade_out_steps;
        let interval = self.timing.fade_out_interval;
        tokio::spawn(async move {
            for step in 1..=steps {
                tokio::time::sleep(interval).await;
                if token.is_cancelled() {
                    return;
                }
                let volume = from * (steps - step) as f32 / steps as f32;
                {
                    let mut ch = channel.lock();
                    if !ch.playing {
                        return;
                    }
                    ch.volume = volume;
                }
                sink.set_volume(volume);
            }
            {
                let mut ch = channel.lock();
                if !ch.playing {
                    return;
                }
                ch.playing = false;
                ch.volume = 0.0;
            }
            sink.stop();
        });
    }

    fn replace_job(&self) -> CancelToken {
        let token = CancelToken::new();
        if let Some(old) = self.job.lock().replace(token.clone()) {
            old.cancel();
        }
        token
    }

    fn cancel_job(&self) {
        if let Some(old) = self.job.lock().take() {
            old.cancel();
        }
    }
}
