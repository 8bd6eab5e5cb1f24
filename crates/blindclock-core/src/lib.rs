//! # Blindclock Core Library
//!
//! Core engine for a multi-window poker tournament blind timer. All
//! behavior lives here; the CLI binary (and any GUI shell) is a thin
//! layer over this library.
//!
//! ## Architecture
//!
//! - **Timer Engine**: a tick-driven state machine; the window runtime
//!   invokes `tick()` once per second while running, so the engine
//!   itself never reads the wall clock
//! - **Sync**: leaderless coordination between windows showing the same
//!   game -- claim/heartbeat leases over a broadcast bus, with the
//!   leader's state overwriting every mirror
//! - **Storage**: SQLite-backed crash recovery for timer state plus
//!   TOML configuration
//! - **Connectivity**: HTTP probing and the emergency-pause latch
//! - **Audio**: synthesized alert cues on a dedicated playback thread
//!
//! ## Key Components
//!
//! - [`TimerWindow`] / [`TimerHandle`]: spawn and drive one window
//! - [`TimerEngine`]: the core state machine
//! - [`SyncBus`]: in-process message bus connecting windows per game
//! - [`StateStore`]: validated persistence
//! - [`Config`]: application configuration

pub mod audio;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod runtime;
pub mod schedule;
pub mod storage;
pub mod sync;
pub mod timer;

pub use audio::{Cue, CueEngine};
pub use connectivity::{ConnectivityChange, ConnectivityMonitor, HttpProbe};
pub use error::{ConfigError, CoreError, ScheduleError, StoreError, SyncError};
pub use events::Event;
pub use runtime::{Command, Snapshot, TimerHandle, TimerWindow, WindowOptions};
pub use schedule::{BlindLevel, BlindSchedule, GameId};
pub use storage::{Config, StateStore};
pub use sync::{SyncBus, SyncChannel, SyncMessage, WindowId};
pub use timer::{TimerEngine, TimerPhase, TimerState};
