//! Leadership as a renewable lease.
//!
//! Pure millisecond arithmetic, no clocks and no I/O: the channel feeds
//! in timestamps, which keeps every transition testable without
//! sleeping.

use super::{CLAIM_GRACE_MS, LEADER_TIMEOUT_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseRole {
    Leader,
    Follower,
}

/// Lease state for one window.
///
/// A leader holds the lease until it yields to a fresh claim. A
/// follower tracks a deadline renewed by every proof of leader
/// liveness (heartbeat or state update); once the deadline passes it
/// may re-claim unilaterally.
#[derive(Debug, Clone)]
pub struct LeaderLease {
    role: LeaseRole,
    /// Follower only: when the current leader's lease runs out.
    deadline_ms: u64,
}

impl LeaderLease {
    /// Start as provisional leader (every window claims on init).
    pub fn new_leader() -> Self {
        Self {
            role: LeaseRole::Leader,
            deadline_ms: 0,
        }
    }

    pub fn role(&self) -> LeaseRole {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == LeaseRole::Leader
    }

    /// Handle a foreign MASTER_CLAIM.
    ///
    /// Returns `true` if this window held the lease and yielded it.
    /// Claims older than the grace window are ignored; a follower just
    /// renews its deadline since the claimant is now the leader.
    pub fn on_claim(&mut self, now_ms: u64, claim_sent_at_ms: u64) -> bool {
        if now_ms.saturating_sub(claim_sent_at_ms) > CLAIM_GRACE_MS {
            return false;
        }
        match self.role {
            LeaseRole::Leader => {
                self.role = LeaseRole::Follower;
                self.deadline_ms = now_ms + LEADER_TIMEOUT_MS;
                true
            }
            LeaseRole::Follower => {
                self.deadline_ms = now_ms + LEADER_TIMEOUT_MS;
                false
            }
        }
    }

    /// Renew the follower deadline on any proof of leader liveness.
    pub fn on_leader_signal(&mut self, now_ms: u64) {
        if self.role == LeaseRole::Follower {
            self.deadline_ms = now_ms + LEADER_TIMEOUT_MS;
        }
    }

    /// Whether a follower's leader lease has run out.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.role == LeaseRole::Follower && now_ms >= self.deadline_ms
    }

    /// Take the lease unilaterally (after expiry, or on window focus).
    pub fn claim(&mut self) {
        self.role = LeaseRole::Leader;
    }
}
