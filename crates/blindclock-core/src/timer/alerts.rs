//! Derived alert flags and exactly-once cue scheduling.
//!
//! The flags are pure functions of timer state; the evaluator wraps
//! them with last-played markers so every discrete audio event fires
//! exactly once per occurrence and re-arms only when its precondition
//! lapses.

use crate::audio::Cue;
use crate::schedule::BlindSchedule;
use crate::timer::engine::TimerState;

/// Seconds remaining at which the one-minute warning fires.
const MINUTE_ALERT_REMAINING: u64 = 60;
/// Final-countdown window: remaining seconds in (0, 4].
const FINAL_COUNTDOWN_MAX: u64 = 4;
/// New-blind alert shows for the first seconds of a non-break level.
const NEW_BLIND_WINDOW_SECS: u64 = 3;

/// Pure alert flags derived from state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertFlags {
    /// Exactly one minute remaining while running.
    pub is_alert_time: bool,
    /// Remaining seconds in (0, 4] while running.
    pub is_final_countdown: bool,
    /// Just entered a non-break level, under 3 s elapsed, running.
    pub is_new_blind_alert: bool,
}

pub fn evaluate(state: &TimerState, schedule: &BlindSchedule) -> AlertFlags {
    let Some(level) = schedule.get(state.current_level_index) else {
        return AlertFlags::default();
    };
    if !state.is_running {
        return AlertFlags::default();
    }
    let remaining = level.duration_secs().saturating_sub(state.elapsed_in_level);
    AlertFlags {
        is_alert_time: remaining == MINUTE_ALERT_REMAINING,
        is_final_countdown: remaining > 0 && remaining <= FINAL_COUNTDOWN_MAX,
        is_new_blind_alert: !level.is_break && state.elapsed_in_level < NEW_BLIND_WINDOW_SECS,
    }
}

/// Tracks which discrete cues already fired for the current occurrence.
#[derive(Debug, Default)]
pub struct AlertEvaluator {
    minute_alert_armed_for: Option<usize>,
    last_countdown_second: Option<(usize, u64)>,
}

impl AlertEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the current state and return the cues due right now.
    ///
    /// Level-complete cues are not scheduled here; the engine emits
    /// them on level transitions.
    pub fn cues_for(&mut self, state: &TimerState, schedule: &BlindSchedule) -> Vec<Cue> {
        let flags = evaluate(state, schedule);
        let mut cues = Vec::new();
        let level = state.current_level_index;

        if flags.is_alert_time {
            if self.minute_alert_armed_for != Some(level) {
                self.minute_alert_armed_for = Some(level);
                cues.push(Cue::MinuteAlert);
            }
        } else if self.minute_alert_armed_for == Some(level) && !flags.is_alert_time {
            // Precondition lapsed; re-arm for the next occurrence.
            let remaining = schedule
                .get(level)
                .map(|l| l.duration_secs().saturating_sub(state.elapsed_in_level))
                .unwrap_or(0);
            if remaining > MINUTE_ALERT_REMAINING {
                self.minute_alert_armed_for = None;
            }
        }

        if flags.is_final_countdown {
            let remaining = schedule
                .get(level)
                .map(|l| l.duration_secs().saturating_sub(state.elapsed_in_level))
                .unwrap_or(0);
            if self.last_countdown_second != Some((level, remaining)) {
                self.last_countdown_second = Some((level, remaining));
                cues.push(Cue::CountdownTick);
            }
        } else {
            self.last_countdown_second = None;
        }

        cues
    }
}
