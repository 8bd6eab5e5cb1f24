//! Per-window protocol endpoint.
//!
//! Pure I/O boundary with no business logic: it moves messages between
//! the bus and the lease machine and surfaces [`SyncUpdate`] values for
//! the orchestrator to act on. The engine never sees the bus; the
//! channel never touches timer state beyond forwarding it.
//!
//! All methods take the current time in epoch milliseconds from the
//! caller, so the protocol is fully deterministic under test.

use tokio::sync::broadcast;

use super::{LeaderLease, SyncBus, SyncMessage, WindowId};
use crate::schedule::GameId;
use crate::timer::TimerState;

/// What the orchestrator must act on after a protocol step.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    /// Leader broadcast arrived; overwrite the local mirror.
    StateReceived(TimerState),
    /// The lease expired and this window re-claimed it.
    BecameLeader,
    /// A fresh foreign claim arrived; this window yielded the lease.
    LeadershipYielded,
    /// A companion window opened and wants an immediate snapshot.
    SnapshotRequested,
}

pub struct SyncChannel {
    game_id: GameId,
    window_id: WindowId,
    lease: LeaderLease,
    /// `None` means the bus is unavailable: degraded single-window
    /// mode, always leader, sends are no-ops.
    tx: Option<broadcast::Sender<SyncMessage>>,
}

impl SyncChannel {
    /// Attach to the bus (or degrade without one) and announce this
    /// window: a provisional claim plus a snapshot request.
    pub fn connect(
        bus: Option<&SyncBus>,
        game_id: GameId,
        window_id: WindowId,
        now_ms: u64,
    ) -> (Self, Option<broadcast::Receiver<SyncMessage>>) {
        let (tx, rx) = match bus {
            Some(bus) => {
                let (tx, rx) = bus.attach(&game_id);
                (Some(tx), Some(rx))
            }
            None => {
                tracing::info!(game_id = %game_id, "no sync bus; running single-window");
                (None, None)
            }
        };
        let channel = Self {
            game_id,
            window_id,
            lease: LeaderLease::new_leader(),
            tx,
        };
        channel.send(SyncMessage::MasterClaim {
            game_id: channel.game_id.clone(),
            window_id,
            sent_at_ms: now_ms,
        });
        channel.send(SyncMessage::WindowOpened {
            game_id: channel.game_id.clone(),
            window_id,
            sent_at_ms: now_ms,
        });
        (channel, rx)
    }

    pub fn is_leader(&self) -> bool {
        self.lease.is_leader()
    }

    pub fn window_id(&self) -> WindowId {
        self.window_id
    }

    /// Re-claim leadership explicitly (window focus, lease expiry).
    pub fn announce_claim(&mut self, now_ms: u64) {
        self.lease.claim();
        self.send(SyncMessage::MasterClaim {
            game_id: self.game_id.clone(),
            window_id: self.window_id,
            sent_at_ms: now_ms,
        });
    }

    /// Leader liveness signal; the runtime calls this every 2 s while
    /// leading.
    pub fn heartbeat(&self, now_ms: u64) {
        if !self.is_leader() {
            return;
        }
        self.send(SyncMessage::MasterHeartbeat {
            game_id: self.game_id.clone(),
            window_id: self.window_id,
            sent_at_ms: now_ms,
        });
    }

    /// Broadcast the full state to follower mirrors.
    pub fn broadcast_state(&self, state: &TimerState, now_ms: u64) {
        if !self.is_leader() {
            return;
        }
        self.send(SyncMessage::StateUpdate {
            game_id: self.game_id.clone(),
            window_id: self.window_id,
            sent_at_ms: now_ms,
            state: state.clone(),
        });
    }

    /// Drive the lease watchdog. Returns `BecameLeader` when a
    /// follower's deadline ran out and it re-claimed.
    pub fn check_expiry(&mut self, now_ms: u64) -> Option<SyncUpdate> {
        if self.lease.is_expired(now_ms) {
            tracing::info!(
                game_id = %self.game_id,
                window_id = %self.window_id,
                "leader heartbeat timed out; re-claiming"
            );
            self.announce_claim(now_ms);
            return Some(SyncUpdate::BecameLeader);
        }
        None
    }

    /// Handle one inbound message. Self-originated and foreign-game
    /// messages are dropped.
    pub fn handle(&mut self, msg: &SyncMessage, now_ms: u64) -> Option<SyncUpdate> {
        if msg.window_id() == self.window_id || msg.game_id() != &self.game_id {
            return None;
        }
        match msg {
            SyncMessage::MasterClaim { sent_at_ms, .. } => {
                if self.lease.on_claim(now_ms, *sent_at_ms) {
                    tracing::debug!(window_id = %self.window_id, "yielded leadership to claim");
                    Some(SyncUpdate::LeadershipYielded)
                } else {
                    None
                }
            }
            SyncMessage::MasterHeartbeat { .. } => {
                self.lease.on_leader_signal(now_ms);
                None
            }
            SyncMessage::StateUpdate { state, .. } => {
                if self.is_leader() {
                    // Sole-writer discipline: a leader never overwrites
                    // its canonical state from the wire.
                    return None;
                }
                self.lease.on_leader_signal(now_ms);
                Some(SyncUpdate::StateReceived(state.clone()))
            }
            SyncMessage::WindowOpened { .. } => {
                if self.is_leader() {
                    Some(SyncUpdate::SnapshotRequested)
                } else {
                    None
                }
            }
        }
    }

    fn send(&self, msg: SyncMessage) {
        let Some(tx) = &self.tx else {
            return;
        };
        // A send error just means no other window is listening.
        let _ = tx.send(msg);
    }
}
