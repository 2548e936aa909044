//! Stopwatch loop.
//!
//! Elapsed time is recomputed from a wall-clock anchor on every pulse,
//! never incremented. The anchor is backdated by whatever elapsed time the
//! session had already accumulated, so a resumed stopwatch continues where
//! it left off even if pulses were delayed or missed entirely.

use std::time::Duration;

use tokio::sync::watch;

use crate::cancel::CancelToken;
use crate::session::Session;

/// Spawn the refresh loop for a running stopwatch session. Each pulse hands
/// the freshly recomputed elapsed seconds to `on_tick`.
pub fn spawn(
    session: watch::Receiver<Session>,
    interval: Duration,
    accumulated_secs: u64,
    on_tick: impl Fn(u64) + Send + 'static,
) -> CancelToken {
    let token = CancelToken::new();
    let loop_token = token.clone();
    tokio::spawn(async move {
        let anchor_ms = now_ms().saturating_sub(accumulated_secs * 1000);
        loop {
            tokio::time::sleep(interval).await;
            if loop_token.is_cancelled() {
                return;
            }
            if !session.borrow().is_stopwatch_running() {
                return;
            }
            on_tick(now_ms().saturating_sub(anchor_ms) / 1000);
        }
    });
    token
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
