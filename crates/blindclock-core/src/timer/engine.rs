//! Timer engine implementation.
//!
//! The engine is a tick-driven state machine. It has no internal
//! threads and never reads the wall clock for progress -- the caller
//! (the window runtime) invokes `tick()` once per second while the
//! window is running and leads its game.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> (LevelTransition -> Running)* -> Finished
//! ```
//!
//! Followers never tick; their state is overwritten wholesale through
//! [`TimerEngine::apply_external_update`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::schedule::{BlindLevel, BlindSchedule};

/// Seconds of the new level during which the transition alert shows.
const SHOW_ALERT_SECS: u64 = 3;

/// Persisted timer aggregate.
///
/// The canonical copy lives in the leader window; every other window
/// holds an eventually-consistent mirror. All fields are required on
/// decode: a persisted record missing any of them is discarded whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerState {
    pub is_running: bool,
    pub current_level_index: usize,
    /// Seconds elapsed within the current level.
    pub elapsed_in_level: u64,
    /// Seconds elapsed across the whole tournament clock.
    pub total_elapsed: u64,
    pub show_alert: bool,
    pub sound_enabled: bool,
    pub is_online: bool,
    pub last_sync_at: DateTime<Utc>,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            is_running: false,
            current_level_index: 0,
            elapsed_in_level: 0,
            total_elapsed: 0,
            show_alert: false,
            sound_enabled: true,
            is_online: true,
            last_sync_at: Utc::now(),
        }
    }
}

/// Derived lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    /// Momentary: just rolled into a new level, alert showing.
    LevelTransition,
    Finished,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// One second elapsed inside the current level.
    Progress,
    /// The level elapsed and the clock rolled into the next one.
    Advanced(Event),
    /// The final level elapsed.
    Finished(Event),
}

/// Core timer engine.
///
/// Owns the canonical [`TimerState`] for its window and enforces the
/// level-index/elapsed bounds on every mutation, including foreign
/// state arriving over the sync channel.
#[derive(Debug, Clone)]
pub struct TimerEngine {
    schedule: BlindSchedule,
    state: TimerState,
}

impl TimerEngine {
    /// Create an engine with default state (idle at level 0).
    pub fn new(schedule: BlindSchedule) -> Self {
        Self {
            schedule,
            state: TimerState::default(),
        }
    }

    /// Create an engine from previously persisted state.
    ///
    /// The caller is expected to have validated the state against the
    /// same schedule (the store does); the engine clamps defensively
    /// anyway.
    pub fn with_state(schedule: BlindSchedule, state: TimerState) -> Self {
        let mut engine = Self { schedule, state };
        engine.clamp_state();
        engine
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    /// The runtime stamps `last_sync_at` on persist.
    pub(crate) fn state_mut(&mut self) -> &mut TimerState {
        &mut self.state
    }

    pub fn schedule(&self) -> &BlindSchedule {
        &self.schedule
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn current_level(&self) -> &BlindLevel {
        // Index is maintained in bounds by every mutation path.
        &self.schedule.levels()[self.state.current_level_index]
    }

    pub fn next_level(&self) -> Option<&BlindLevel> {
        self.schedule.get(self.state.current_level_index + 1)
    }

    /// Seconds left in the current level.
    pub fn time_remaining_in_level(&self) -> u64 {
        self.current_level()
            .duration_secs()
            .saturating_sub(self.state.elapsed_in_level)
    }

    /// 0.0 .. 100.0 progress within the current level.
    pub fn progress_percentage(&self) -> f64 {
        let total = self.current_level().duration_secs();
        if total == 0 {
            return 0.0;
        }
        (self.state.elapsed_in_level as f64 / total as f64 * 100.0).min(100.0)
    }

    pub fn phase(&self) -> TimerPhase {
        if self.is_finished() {
            TimerPhase::Finished
        } else if !self.state.is_running {
            TimerPhase::Idle
        } else if self.state.show_alert {
            TimerPhase::LevelTransition
        } else {
            TimerPhase::Running
        }
    }

    fn is_finished(&self) -> bool {
        !self.state.is_running
            && self.state.current_level_index == self.schedule.last_index()
            && self.state.elapsed_in_level == self.current_level().duration_secs()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin (or resume) ticking. Idempotent: a redundant call returns
    /// `None` and must not produce a broadcast.
    pub fn start(&mut self) -> Option<Event> {
        if self.state.is_running || self.is_finished() {
            return None;
        }
        self.state.is_running = true;
        Some(Event::TimerStarted {
            level_index: self.state.current_level_index,
            at: Utc::now(),
        })
    }

    /// Stop ticking. Idempotent.
    pub fn pause(&mut self) -> Option<Event> {
        if !self.state.is_running {
            return None;
        }
        self.state.is_running = false;
        Some(Event::TimerPaused {
            level_index: self.state.current_level_index,
            elapsed_in_level: self.state.elapsed_in_level,
            at: Utc::now(),
        })
    }

    /// Zero all counters and stop.
    pub fn reset(&mut self) -> Option<Event> {
        let sound = self.state.sound_enabled;
        let online = self.state.is_online;
        self.state = TimerState {
            sound_enabled: sound,
            is_online: online,
            ..TimerState::default()
        };
        Some(Event::TimerReset { at: Utc::now() })
    }

    /// Jump to the next level, clamped at the last one.
    pub fn next_level_jump(&mut self) -> Option<Event> {
        let from = self.state.current_level_index;
        if from >= self.schedule.last_index() {
            return None;
        }
        self.enter_level(from + 1);
        Some(Event::LevelAdvanced {
            from_level: from,
            to_level: self.state.current_level_index,
            at: Utc::now(),
        })
    }

    /// Jump to the previous level, clamped at the first one.
    pub fn previous_level_jump(&mut self) -> Option<Event> {
        let from = self.state.current_level_index;
        if from == 0 {
            return None;
        }
        self.state.current_level_index = from - 1;
        self.state.elapsed_in_level = 0;
        self.state.show_alert = false;
        Some(Event::LevelRewound {
            from_level: from,
            to_level: self.state.current_level_index,
            at: Utc::now(),
        })
    }

    /// Position the clock within the current level by percentage.
    ///
    /// `0.0` is the start of the level; `100.0` its end. The input is
    /// clamped to that range.
    pub fn seek(&mut self, percentage: f64) -> Option<Event> {
        let pct = percentage.clamp(0.0, 100.0);
        let cap = self.current_level().duration_secs();
        let target = ((pct / 100.0) * cap as f64).round() as u64;
        self.state.elapsed_in_level = target.min(cap);
        Some(Event::Seeked {
            level_index: self.state.current_level_index,
            elapsed_in_level: self.state.elapsed_in_level,
            at: Utc::now(),
        })
    }

    pub fn toggle_sound(&mut self) -> Option<Event> {
        self.state.sound_enabled = !self.state.sound_enabled;
        Some(Event::SoundToggled {
            sound_enabled: self.state.sound_enabled,
            at: Utc::now(),
        })
    }

    /// Mirror connectivity into state. Returns an event only on change.
    pub fn set_online(&mut self, online: bool) -> Option<Event> {
        if self.state.is_online == online {
            return None;
        }
        self.state.is_online = online;
        Some(Event::ConnectivityChanged {
            is_online: online,
            at: Utc::now(),
        })
    }

    /// Sole entry point for the sync boundary: overwrite this mirror
    /// with leader-broadcast state, clamped into schedule bounds so a
    /// foreign broadcast can never break the invariants.
    pub fn apply_external_update(&mut self, state: TimerState) -> Event {
        self.state = state;
        self.clamp_state();
        Event::MirrorUpdated {
            level_index: self.state.current_level_index,
            elapsed_in_level: self.state.elapsed_in_level,
            at: Utc::now(),
        }
    }

    /// Advance the clock by one second. Call only while running.
    pub fn tick(&mut self) -> Option<Tick> {
        if !self.state.is_running {
            return None;
        }
        self.state.elapsed_in_level += 1;
        self.state.total_elapsed += 1;

        // Transition-alert latch clears after a few seconds of the new level.
        if self.state.show_alert && self.state.elapsed_in_level >= SHOW_ALERT_SECS {
            self.state.show_alert = false;
        }

        let cap = self.current_level().duration_secs();
        if self.state.elapsed_in_level < cap {
            return Some(Tick::Progress);
        }
        // elapsed_in_level can never exceed cap: we got here the moment
        // it reached the bound.
        self.state.elapsed_in_level = cap;

        let from = self.state.current_level_index;
        if from < self.schedule.last_index() {
            self.enter_level(from + 1);
            Some(Tick::Advanced(Event::LevelAdvanced {
                from_level: from,
                to_level: self.state.current_level_index,
                at: Utc::now(),
            }))
        } else {
            self.state.is_running = false;
            Some(Tick::Finished(Event::TimerFinished {
                total_elapsed: self.state.total_elapsed,
                at: Utc::now(),
            }))
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn enter_level(&mut self, index: usize) {
        self.state.current_level_index = index.min(self.schedule.last_index());
        self.state.elapsed_in_level = 0;
        self.state.show_alert = true;
    }

    fn clamp_state(&mut self) {
        if self.state.current_level_index > self.schedule.last_index() {
            self.state.current_level_index = self.schedule.last_index();
        }
        let cap = self.current_level().duration_secs();
        if self.state.elapsed_in_level > cap {
            self.state.elapsed_in_level = cap;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::BlindLevel;

    fn schedule(durations_min: &[u64]) -> BlindSchedule {
        let levels = durations_min
            .iter()
            .enumerate()
            .map(|(i, &d)| BlindLevel {
                level: (i + 1) as u32,
                small_blind: 25 * (i as u64 + 1),
                big_blind: 50 * (i as u64 + 1),
                ante: 0,
                duration_min: d,
                is_break: false,
            })
            .collect();
        BlindSchedule::new(levels).unwrap()
    }

    #[test]
    fn start_pause_toggle() {
        let mut engine = TimerEngine::new(schedule(&[20]));
        assert_eq!(engine.phase(), TimerPhase::Idle);

        assert!(engine.start().is_some());
        assert!(engine.is_running());

        assert!(engine.pause().is_some());
        assert!(!engine.is_running());
    }

    #[test]
    fn pause_is_idempotent() {
        let mut engine = TimerEngine::new(schedule(&[20]));
        engine.start();
        assert!(engine.pause().is_some());
        assert!(engine.pause().is_none());
        assert!(!engine.is_running());
    }

    #[test]
    fn start_is_idempotent() {
        let mut engine = TimerEngine::new(schedule(&[20]));
        assert!(engine.start().is_some());
        assert!(engine.start().is_none());
    }

    #[test]
    fn fifteen_minute_level_transitions_exactly_at_900() {
        let mut engine = TimerEngine::new(schedule(&[15, 15]));
        engine.start();
        for _ in 0..899 {
            assert!(matches!(engine.tick(), Some(Tick::Progress)));
        }
        assert_eq!(engine.state().current_level_index, 0);
        assert_eq!(engine.state().elapsed_in_level, 899);

        assert!(matches!(engine.tick(), Some(Tick::Advanced(_))));
        assert_eq!(engine.state().current_level_index, 1);
        assert_eq!(engine.state().elapsed_in_level, 0);
    }

    #[test]
    fn two_one_minute_levels_advance_with_alert() {
        let mut engine = TimerEngine::new(schedule(&[1, 1]));
        engine.start();
        for _ in 0..60 {
            engine.tick();
        }
        assert_eq!(engine.state().current_level_index, 1);
        assert_eq!(engine.state().elapsed_in_level, 0);
        assert!(engine.state().show_alert);
        assert!(engine.is_running());
        assert_eq!(engine.phase(), TimerPhase::LevelTransition);
    }

    #[test]
    fn single_level_finishes() {
        let mut engine = TimerEngine::new(schedule(&[1]));
        engine.start();
        let mut finished = false;
        for _ in 0..60 {
            if let Some(Tick::Finished(_)) = engine.tick() {
                finished = true;
            }
        }
        assert!(finished);
        assert!(!engine.is_running());
        assert_eq!(engine.state().current_level_index, 0);
        assert_eq!(engine.phase(), TimerPhase::Finished);
        // Finished clocks do not restart without a reset.
        assert!(engine.start().is_none());
    }

    #[test]
    fn seek_half_of_ten_minutes() {
        let mut engine = TimerEngine::new(schedule(&[10]));
        engine.seek(50.0);
        assert_eq!(engine.state().elapsed_in_level, 300);
    }

    #[test]
    fn seek_clamps_percentage() {
        let mut engine = TimerEngine::new(schedule(&[10]));
        engine.seek(250.0);
        assert_eq!(engine.state().elapsed_in_level, 600);
        engine.seek(-10.0);
        assert_eq!(engine.state().elapsed_in_level, 0);
    }

    #[test]
    fn level_jumps_clamp_at_bounds() {
        let mut engine = TimerEngine::new(schedule(&[1, 1]));
        assert!(engine.previous_level_jump().is_none());
        assert!(engine.next_level_jump().is_some());
        assert!(engine.next_level_jump().is_none());
        assert_eq!(engine.state().current_level_index, 1);
        assert!(engine.previous_level_jump().is_some());
        assert_eq!(engine.state().current_level_index, 0);
        assert_eq!(engine.state().elapsed_in_level, 0);
    }

    #[test]
    fn reset_keeps_sound_preference() {
        let mut engine = TimerEngine::new(schedule(&[1]));
        engine.toggle_sound();
        engine.start();
        engine.tick();
        engine.reset();
        assert!(!engine.state().is_running);
        assert_eq!(engine.state().elapsed_in_level, 0);
        assert_eq!(engine.state().total_elapsed, 0);
        assert!(!engine.state().show_alert);
        assert!(!engine.state().sound_enabled);
    }

    #[test]
    fn external_update_is_clamped_into_bounds() {
        let mut engine = TimerEngine::new(schedule(&[2, 2]));
        let foreign = TimerState {
            current_level_index: 9,
            elapsed_in_level: 10_000,
            ..TimerState::default()
        };
        engine.apply_external_update(foreign);
        assert_eq!(engine.state().current_level_index, 1);
        assert_eq!(engine.state().elapsed_in_level, 120);
    }

    #[test]
    fn show_alert_clears_after_three_seconds() {
        let mut engine = TimerEngine::new(schedule(&[1, 5]));
        engine.start();
        for _ in 0..60 {
            engine.tick();
        }
        assert!(engine.state().show_alert);
        engine.tick();
        engine.tick();
        assert!(engine.state().show_alert);
        engine.tick();
        assert!(!engine.state().show_alert);
    }
}
