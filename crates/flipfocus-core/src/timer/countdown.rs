//! Countdown tick loop.
//!
//! One pulse per interval while a focus or break countdown holds. The loop
//! owns no clock state: the machine decrements the remaining seconds and
//! detects the zero crossing. A fresh loop is spawned on every entry into a
//! counting phase; leaving the phase cancels the token inside the
//! transition, so no pulse lands after the state moved on.

use std::time::Duration;

use tokio::sync::watch;

use crate::cancel::CancelToken;
use crate::session::Session;

/// Spawn the pulse loop. Re-checks the token and the published session
/// before every pulse and exits the moment either says the phase is over.
pub fn spawn(
    session: watch::Receiver<Session>,
    interval: Duration,
    on_tick: impl Fn() + Send + 'static,
) -> CancelToken {
    let token = CancelToken::new();
    let loop_token = token.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if loop_token.is_cancelled() {
                return;
            }
            if !session.borrow().is_counting() {
                return;
            }
            on_tick();
        }
    });
    token
}
