//! # FlipFocus Core Library
//!
//! This library provides the core business logic for the FlipFocus
//! flip-to-focus timer. A focus session is gated on the phone lying
//! face-down: arming the session, detecting the flip, running the
//! countdown or stopwatch, and scoring the outcome all happen here. It
//! implements a CLI-first philosophy where every operation is available
//! via a standalone CLI binary, with platform front-ends being thin
//! layers over the same core library.
//!
//! ## Architecture
//!
//! - **Session Machine**: A pure transition function from triggers to
//!   state plus side-effect descriptions, with all timing injected
//! - **Engine**: Async runtime that owns the machine, drives tick tasks,
//!   and executes effects against platform adapters
//! - **Storage**: SQLite-based kv persistence and TOML-based configuration
//! - **Collaborators**: Traits for audio, haptics, and the notification
//!   filter, so headless builds run against no-ops
//!
//! ## Key Components
//!
//! - [`SessionMachine`]: Core session state machine
//! - [`SessionEngine`]: Async runtime around the machine
//! - [`Database`]: KV persistence for snapshots, stats, and preferences
//! - [`Config`]: Application configuration management

pub mod audio;
pub mod cancel;
pub mod engine;
pub mod error;
pub mod events;
pub mod feedback;
pub mod orientation;
pub mod session;
pub mod stats;
pub mod storage;
pub mod timer;

pub use engine::{Platform, SessionEngine, Timing};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::Event;
pub use orientation::{AccelSample, OrientationEdge, OrientationMonitor};
pub use session::{AmbientTrack, AppMode, Effect, Session, SessionMachine, TimerState};
pub use stats::{DayKey, StatsAggregator};
pub use storage::{Config, Database};
