//! Durable, validated timer-state storage.
//!
//! One row per game id in a SQLite database. Every read is validated
//! against the schedule the caller supplies; anything corrupt, stale,
//! or out of bounds is discarded whole and replaced by defaults. After
//! `open`, no operation here returns an error: storage failures inside
//! the timer path are logged and swallowed so the clock keeps running.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, ErrorCode};

use super::data_dir;
use crate::error::StoreError;
use crate::schedule::{BlindSchedule, GameId};
use crate::timer::TimerState;

/// Persisted entries older than this are rejected on load.
const MAX_AGE_HOURS: i64 = 24;
/// Entries idle longer than this are removed by the sweep.
const SWEEP_IDLE_DAYS: i64 = 7;

/// SQLite-backed state store, one row per game id.
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open the store at `~/.config/blindclock/blindclock.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir()?;
        Self::open_at(dir.join("blindclock.db"))
    }

    /// Open the store at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        // Several windows may share the file; wait out writer locks.
        self.conn
            .busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS timer_state (
                    game_id  TEXT PRIMARY KEY,
                    payload  TEXT NOT NULL,
                    saved_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_timer_state_saved_at
                    ON timer_state(saved_at);",
            )
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    /// Load and validate the persisted state for a game.
    ///
    /// Any failure -- missing row, unparseable payload, missing fields,
    /// stale record, or bounds violation against `schedule` -- discards
    /// the record and returns defaults.
    pub fn load(&self, game_id: &GameId, schedule: &BlindSchedule) -> TimerState {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT payload, saved_at FROM timer_state WHERE game_id = ?1",
                params![game_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let Some((payload, saved_at)) = row else {
            return TimerState::default();
        };

        match Self::validate(&payload, &saved_at, schedule) {
            Some(state) => state,
            None => {
                tracing::warn!(game_id = %game_id, "discarding invalid persisted timer state");
                self.clear(game_id);
                TimerState::default()
            }
        }
    }

    fn validate(payload: &str, saved_at: &str, schedule: &BlindSchedule) -> Option<TimerState> {
        let saved_at = DateTime::parse_from_rfc3339(saved_at)
            .ok()?
            .with_timezone(&Utc);
        if Utc::now() - saved_at > Duration::hours(MAX_AGE_HOURS) {
            return None;
        }
        // All fields are required; serde rejects records missing any.
        let state: TimerState = serde_json::from_str(payload).ok()?;
        let level = schedule.get(state.current_level_index)?;
        if state.elapsed_in_level > level.duration_secs() {
            return None;
        }
        Some(state)
    }

    /// Persist the state for a game, refreshing its sync timestamp.
    ///
    /// On a full database the other games' entries are evicted (oldest
    /// first) and the write retried once; a second failure is logged
    /// and swallowed.
    pub fn save(&self, game_id: &GameId, state: &mut TimerState) {
        state.last_sync_at = Utc::now();
        let payload = match serde_json::to_string(state) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(game_id = %game_id, error = %e, "failed to serialize timer state");
                return;
            }
        };
        let saved_at = state.last_sync_at.to_rfc3339();

        match self.upsert(game_id, &payload, &saved_at) {
            Ok(()) => {}
            Err(e) if is_full(&e) => {
                tracing::warn!(game_id = %game_id, "state store full; evicting other games");
                self.evict_others(game_id);
                if let Err(e) = self.upsert(game_id, &payload, &saved_at) {
                    tracing::warn!(game_id = %game_id, error = %e, "save failed after eviction");
                }
            }
            Err(e) => {
                tracing::warn!(game_id = %game_id, error = %e, "failed to persist timer state");
            }
        }
    }

    fn upsert(&self, game_id: &GameId, payload: &str, saved_at: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO timer_state (game_id, payload, saved_at)
             VALUES (?1, ?2, ?3)",
            params![game_id.as_str(), payload, saved_at],
        )?;
        Ok(())
    }

    /// Drop other games' entries, oldest first, to make room.
    fn evict_others(&self, keep: &GameId) {
        let victims: Vec<String> = self
            .conn
            .prepare(
                "SELECT game_id FROM timer_state WHERE game_id <> ?1
                 ORDER BY saved_at ASC",
            )
            .and_then(|mut stmt| {
                stmt.query_map(params![keep.as_str()], |row| row.get(0))?
                    .collect()
            })
            .unwrap_or_default();

        for victim in victims {
            if let Err(e) = self.conn.execute(
                "DELETE FROM timer_state WHERE game_id = ?1",
                params![victim],
            ) {
                tracing::warn!(error = %e, "eviction failed");
                break;
            }
        }
    }

    /// Remove the entry for a game.
    pub fn clear(&self, game_id: &GameId) {
        if let Err(e) = self.conn.execute(
            "DELETE FROM timer_state WHERE game_id = ?1",
            params![game_id.as_str()],
        ) {
            tracing::warn!(game_id = %game_id, error = %e, "failed to clear timer state");
        }
    }

    /// Remove entries idle longer than seven days or structurally
    /// corrupt. Invoked hourly by the window runtime. Returns the
    /// number of rows removed.
    pub fn sweep(&self) -> usize {
        let cutoff = (Utc::now() - Duration::days(SWEEP_IDLE_DAYS)).to_rfc3339();
        let mut removed = match self.conn.execute(
            "DELETE FROM timer_state WHERE saved_at < ?1",
            params![cutoff],
        ) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "sweep of idle entries failed");
                0
            }
        };

        removed += self.sweep_corrupt();
        if removed > 0 {
            tracing::info!(removed, "swept stale timer-state entries");
        }
        removed
    }

    fn sweep_corrupt(&self) -> usize {
        let rows: Vec<(String, String)> = self
            .conn
            .prepare("SELECT game_id, payload FROM timer_state")
            .and_then(|mut stmt| {
                stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect()
            })
            .unwrap_or_default();

        let mut removed = 0;
        for (game_id, payload) in rows {
            if serde_json::from_str::<TimerState>(&payload).is_err() {
                if self
                    .conn
                    .execute(
                        "DELETE FROM timer_state WHERE game_id = ?1",
                        params![game_id],
                    )
                    .is_ok()
                {
                    removed += 1;
                }
            }
        }
        removed
    }
}

fn is_full(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::DiskFull
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::BlindLevel;

    fn schedule(levels: usize) -> BlindSchedule {
        BlindSchedule::new(
            (0..levels)
                .map(|i| BlindLevel {
                    level: (i + 1) as u32,
                    small_blind: 25,
                    big_blind: 50,
                    ante: 0,
                    duration_min: 10,
                    is_break: false,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn missing_row_yields_defaults() {
        let store = StateStore::open_memory().unwrap();
        let state = store.load(&GameId::new("g1"), &schedule(3));
        assert!(!state.is_running);
        assert_eq!(state.current_level_index, 0);
        assert!(state.sound_enabled);
    }

    #[test]
    fn save_load_roundtrip() {
        let store = StateStore::open_memory().unwrap();
        let game = GameId::new("g1");
        let mut state = TimerState {
            is_running: true,
            current_level_index: 2,
            elapsed_in_level: 123,
            total_elapsed: 1323,
            ..TimerState::default()
        };
        store.save(&game, &mut state);

        let loaded = store.load(&game, &schedule(3));
        assert_eq!(loaded.current_level_index, 2);
        assert_eq!(loaded.elapsed_in_level, 123);
        assert_eq!(loaded.total_elapsed, 1323);
    }

    #[test]
    fn out_of_bounds_level_index_is_rejected() {
        let store = StateStore::open_memory().unwrap();
        let game = GameId::new("g1");
        let mut state = TimerState {
            current_level_index: 5,
            ..TimerState::default()
        };
        store.save(&game, &mut state);

        // Loaded against only 3 levels: bounds validation rejects it.
        let loaded = store.load(&game, &schedule(3));
        assert_eq!(loaded.current_level_index, 0);
        assert_eq!(loaded.elapsed_in_level, 0);
    }

    #[test]
    fn excessive_elapsed_is_rejected() {
        let store = StateStore::open_memory().unwrap();
        let game = GameId::new("g1");
        let mut state = TimerState {
            elapsed_in_level: 601,
            ..TimerState::default()
        };
        store.save(&game, &mut state);
        let loaded = store.load(&game, &schedule(1));
        assert_eq!(loaded.elapsed_in_level, 0);
    }

    #[test]
    fn stale_record_is_rejected() {
        let store = StateStore::open_memory().unwrap();
        let old = (Utc::now() - Duration::hours(25)).to_rfc3339();
        let payload = serde_json::to_string(&TimerState {
            current_level_index: 1,
            ..TimerState::default()
        })
        .unwrap();
        store.upsert(&GameId::new("g1"), &payload, &old).unwrap();

        let loaded = store.load(&GameId::new("g1"), &schedule(3));
        assert_eq!(loaded.current_level_index, 0);
    }

    #[test]
    fn record_missing_a_field_is_rejected() {
        let store = StateStore::open_memory().unwrap();
        let now = Utc::now().to_rfc3339();
        // No total_elapsed: the whole record is invalid.
        let payload = format!(
            r#"{{"is_running":false,"current_level_index":1,"elapsed_in_level":5,
                "show_alert":false,"sound_enabled":true,"is_online":true,
                "last_sync_at":"{now}"}}"#
        );
        store.upsert(&GameId::new("g1"), &payload, &now).unwrap();

        let loaded = store.load(&GameId::new("g1"), &schedule(3));
        assert_eq!(loaded.current_level_index, 0);
    }

    #[test]
    fn clear_removes_the_entry() {
        let store = StateStore::open_memory().unwrap();
        let game = GameId::new("g1");
        let mut state = TimerState {
            elapsed_in_level: 42,
            ..TimerState::default()
        };
        store.save(&game, &mut state);
        store.clear(&game);
        assert_eq!(store.load(&game, &schedule(1)).elapsed_in_level, 0);
    }

    #[test]
    fn sweep_removes_idle_and_corrupt_entries() {
        let store = StateStore::open_memory().unwrap();
        let idle_at = (Utc::now() - Duration::days(8)).to_rfc3339();
        let fresh_at = Utc::now().to_rfc3339();
        let good = serde_json::to_string(&TimerState::default()).unwrap();

        store.upsert(&GameId::new("idle"), &good, &idle_at).unwrap();
        store
            .upsert(&GameId::new("corrupt"), "{not json", &fresh_at)
            .unwrap();
        store.upsert(&GameId::new("fresh"), &good, &fresh_at).unwrap();

        assert_eq!(store.sweep(), 2);
        let remaining: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM timer_state", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn eviction_spares_the_saving_game() {
        let store = StateStore::open_memory().unwrap();
        let good = serde_json::to_string(&TimerState::default()).unwrap();
        let now = Utc::now().to_rfc3339();
        store.upsert(&GameId::new("a"), &good, &now).unwrap();
        store.upsert(&GameId::new("b"), &good, &now).unwrap();
        store.upsert(&GameId::new("keep"), &good, &now).unwrap();

        store.evict_others(&GameId::new("keep"));
        let remaining: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM timer_state", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
        assert_eq!(
            store.load(&GameId::new("keep"), &schedule(1)).elapsed_in_level,
            0
        );
    }
}
