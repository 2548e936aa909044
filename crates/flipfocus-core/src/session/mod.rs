mod machine;
pub mod quotes;

pub use machine::{AmbientTrack, AppMode, Effect, Session, SessionMachine, TimerState};
pub(crate) use machine::MAX_MINUTES;
pub use quotes::{QuotePicker, QUOTES};
