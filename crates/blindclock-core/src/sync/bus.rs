//! In-process broadcast bus, scoped per game id.
//!
//! The Rust rendition of the same-origin broadcast channel: a cloneable
//! registry of `tokio::sync::broadcast` senders keyed by game id. A
//! window that is handed no bus degrades to single-window mode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::SyncMessage;
use crate::schedule::GameId;

/// Bounded per-game fanout. A lagging receiver drops the oldest
/// messages; the next STATE_UPDATE heals its mirror, so skips are
/// harmless.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct SyncBus {
    channels: Arc<Mutex<HashMap<GameId, broadcast::Sender<SyncMessage>>>>,
}

impl SyncBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create the fanout for a game and subscribe to it.
    pub fn attach(
        &self,
        game_id: &GameId,
    ) -> (
        broadcast::Sender<SyncMessage>,
        broadcast::Receiver<SyncMessage>,
    ) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let tx = channels
            .entry(game_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        let rx = tx.subscribe();
        (tx, rx)
    }
}
