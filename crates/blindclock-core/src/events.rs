use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::WindowId;

/// Every observable state change in a window produces an Event.
/// Hosts subscribe to them; the CLI prints them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        level_index: usize,
        at: DateTime<Utc>,
    },
    TimerPaused {
        level_index: usize,
        elapsed_in_level: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        at: DateTime<Utc>,
    },
    /// The clock rolled into the next level, either by elapsing or via
    /// an explicit control action.
    LevelAdvanced {
        from_level: usize,
        to_level: usize,
        at: DateTime<Utc>,
    },
    LevelRewound {
        from_level: usize,
        to_level: usize,
        at: DateTime<Utc>,
    },
    /// The final level elapsed; the tournament clock is done.
    TimerFinished {
        total_elapsed: u64,
        at: DateTime<Utc>,
    },
    Seeked {
        level_index: usize,
        elapsed_in_level: u64,
        at: DateTime<Utc>,
    },
    SoundToggled {
        sound_enabled: bool,
        at: DateTime<Utc>,
    },
    /// This window became the authoritative clock for its game.
    LeadershipAcquired {
        window_id: WindowId,
        at: DateTime<Utc>,
    },
    /// This window yielded leadership to another window's claim.
    LeadershipYielded {
        window_id: WindowId,
        at: DateTime<Utc>,
    },
    /// Follower mirror overwritten by a leader broadcast.
    MirrorUpdated {
        level_index: usize,
        elapsed_in_level: u64,
        at: DateTime<Utc>,
    },
    ConnectivityChanged {
        is_online: bool,
        at: DateTime<Utc>,
    },
    /// Forced pause after a disconnect was observed while running.
    EmergencyPaused {
        at: DateTime<Utc>,
    },
    CompanionWindowOpened {
        url: String,
        at: DateTime<Utc>,
    },
    /// The one user-visible failure: the companion window could not be
    /// opened (typically a blocked opener).
    CompanionWindowFailed {
        message: String,
        at: DateTime<Utc>,
    },
    FullScreenToggled {
        full_screen: bool,
        at: DateTime<Utc>,
    },
}
