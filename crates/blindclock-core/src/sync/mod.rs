//! Cross-window synchronization layer.
//!
//! One authoritative timer per game id across N windows, coordinated by
//! a broadcast pub/sub primitive with no server. Leadership is a
//! renewable lease enforced by timing heuristics (claim grace window,
//! heartbeat, timeout), not consensus: a brief double-leader window
//! only duplicates broadcasts of identical derived state.

mod bus;
mod channel;
mod lease;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::GameId;
use crate::timer::TimerState;

pub use bus::SyncBus;
pub use channel::{SyncChannel, SyncUpdate};
pub use lease::{LeaderLease, LeaseRole};

/// A claim is honored only while its timestamp is this fresh.
pub const CLAIM_GRACE_MS: u64 = 1_000;
/// Leader heartbeat cadence.
pub const HEARTBEAT_INTERVAL_MS: u64 = 2_000;
/// Followers re-claim after this long without proof of leader liveness.
pub const LEADER_TIMEOUT_MS: u64 = 5_000;

/// Random identity per window instance, used to drop self-originated
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(Uuid);

impl WindowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Wire message of the sync protocol. `state` travels only on
/// STATE_UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    StateUpdate {
        game_id: GameId,
        window_id: WindowId,
        sent_at_ms: u64,
        state: TimerState,
    },
    MasterClaim {
        game_id: GameId,
        window_id: WindowId,
        sent_at_ms: u64,
    },
    MasterHeartbeat {
        game_id: GameId,
        window_id: WindowId,
        sent_at_ms: u64,
    },
    WindowOpened {
        game_id: GameId,
        window_id: WindowId,
        sent_at_ms: u64,
    },
}

impl SyncMessage {
    pub fn game_id(&self) -> &GameId {
        match self {
            SyncMessage::StateUpdate { game_id, .. }
            | SyncMessage::MasterClaim { game_id, .. }
            | SyncMessage::MasterHeartbeat { game_id, .. }
            | SyncMessage::WindowOpened { game_id, .. } => game_id,
        }
    }

    pub fn window_id(&self) -> WindowId {
        match self {
            SyncMessage::StateUpdate { window_id, .. }
            | SyncMessage::MasterClaim { window_id, .. }
            | SyncMessage::MasterHeartbeat { window_id, .. }
            | SyncMessage::WindowOpened { window_id, .. } => *window_id,
        }
    }

    pub fn sent_at_ms(&self) -> u64 {
        match self {
            SyncMessage::StateUpdate { sent_at_ms, .. }
            | SyncMessage::MasterClaim { sent_at_ms, .. }
            | SyncMessage::MasterHeartbeat { sent_at_ms, .. }
            | SyncMessage::WindowOpened { sent_at_ms, .. } => *sent_at_ms,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_tag_with_screaming_snake_case() {
        let msg = SyncMessage::MasterClaim {
            game_id: GameId::new("g1"),
            window_id: WindowId::new(),
            sent_at_ms: 42,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "MASTER_CLAIM");
        assert_eq!(json["game_id"], "g1");
        assert_eq!(json["sent_at_ms"], 42);
        assert!(json.get("state").is_none());
    }

    #[test]
    fn state_update_carries_state() {
        let msg = SyncMessage::StateUpdate {
            game_id: GameId::new("g1"),
            window_id: WindowId::new(),
            sent_at_ms: 1,
            state: TimerState::default(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "STATE_UPDATE");
        assert_eq!(json["state"]["current_level_index"], 0);

        let back: SyncMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back.sent_at_ms(), 1);
    }
}
