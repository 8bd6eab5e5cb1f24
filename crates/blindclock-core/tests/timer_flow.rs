//! Integration tests driving the timer engine through whole-tournament
//! flows, plus a property check that no command sequence can break the
//! level-index/elapsed bounds.

use blindclock_core::{BlindLevel, BlindSchedule, TimerEngine, TimerPhase, TimerState};
use proptest::prelude::*;

fn schedule(durations_min: &[u64]) -> BlindSchedule {
    let levels = durations_min
        .iter()
        .enumerate()
        .map(|(i, &d)| BlindLevel {
            level: (i + 1) as u32,
            small_blind: 100 * (i as u64 + 1),
            big_blind: 200 * (i as u64 + 1),
            ante: 0,
            duration_min: d,
            is_break: false,
        })
        .collect();
    BlindSchedule::new(levels).unwrap()
}

#[test]
fn full_tournament_runs_to_completion() {
    // Three 1-minute levels plus a 1-minute break structure.
    let mut levels: Vec<BlindLevel> = schedule(&[1, 1, 1]).levels().to_vec();
    levels.insert(
        2,
        BlindLevel {
            level: 3,
            small_blind: 0,
            big_blind: 0,
            ante: 0,
            duration_min: 1,
            is_break: true,
        },
    );
    let schedule = BlindSchedule::new(levels).unwrap();
    let total_secs = schedule.total_duration_min() * 60;

    let mut engine = TimerEngine::new(schedule);
    engine.start().unwrap();

    for _ in 0..total_secs {
        engine.tick();
    }

    assert_eq!(engine.phase(), TimerPhase::Finished);
    assert_eq!(engine.state().total_elapsed, total_secs);
    assert!(!engine.state().is_running);
    // A finished clock stays finished until reset.
    assert!(engine.start().is_none());
    engine.reset().unwrap();
    assert_eq!(engine.phase(), TimerPhase::Idle);
    assert!(engine.start().is_some());
}

#[test]
fn pause_and_resume_preserve_position() {
    let mut engine = TimerEngine::new(schedule(&[15, 20]));
    engine.start();
    for _ in 0..100 {
        engine.tick();
    }
    engine.pause();
    let frozen = engine.state().clone();

    // Ticks while paused do nothing: progress is tick-driven, never
    // wall-clock-driven.
    for _ in 0..50 {
        assert!(engine.tick().is_none());
    }
    assert_eq!(engine.state().elapsed_in_level, frozen.elapsed_in_level);
    assert_eq!(engine.state().total_elapsed, frozen.total_elapsed);

    engine.start();
    engine.tick();
    assert_eq!(
        engine.state().elapsed_in_level,
        frozen.elapsed_in_level + 1
    );
}

#[test]
fn seek_to_end_then_tick_advances_cleanly() {
    let mut engine = TimerEngine::new(schedule(&[10, 10]));
    engine.start();
    engine.seek(100.0);
    assert_eq!(engine.state().elapsed_in_level, 600);

    // The next tick rolls into level 2 instead of overshooting.
    engine.tick();
    assert_eq!(engine.state().current_level_index, 1);
    assert_eq!(engine.state().elapsed_in_level, 0);
}

#[test]
fn manual_level_jumps_reset_elapsed() {
    let mut engine = TimerEngine::new(schedule(&[15, 15, 15]));
    engine.start();
    for _ in 0..200 {
        engine.tick();
    }
    engine.next_level_jump().unwrap();
    assert_eq!(engine.state().current_level_index, 1);
    assert_eq!(engine.state().elapsed_in_level, 0);

    engine.previous_level_jump().unwrap();
    assert_eq!(engine.state().current_level_index, 0);
    assert_eq!(engine.state().elapsed_in_level, 0);
}

#[derive(Debug, Clone)]
enum Op {
    Start,
    Pause,
    Reset,
    Next,
    Previous,
    Seek(f64),
    Tick(u16),
    External(usize, u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Start),
        Just(Op::Pause),
        Just(Op::Reset),
        Just(Op::Next),
        Just(Op::Previous),
        (-50.0..250.0f64).prop_map(Op::Seek),
        (0u16..200).prop_map(Op::Tick),
        (0usize..20, 0u64..100_000).prop_map(|(i, e)| Op::External(i, e)),
    ]
}

proptest! {
    /// No sequence of commands, ticks, or foreign state updates may
    /// ever leave the level index or elapsed counter out of bounds.
    #[test]
    fn engine_invariants_hold_under_any_command_sequence(
        durations in prop::collection::vec(1u64..5, 1..6),
        ops in prop::collection::vec(op_strategy(), 0..60),
    ) {
        let schedule = schedule(&durations);
        let mut engine = TimerEngine::new(schedule.clone());

        for op in ops {
            match op {
                Op::Start => { engine.start(); }
                Op::Pause => { engine.pause(); }
                Op::Reset => { engine.reset(); }
                Op::Next => { engine.next_level_jump(); }
                Op::Previous => { engine.previous_level_jump(); }
                Op::Seek(pct) => { engine.seek(pct); }
                Op::Tick(n) => {
                    for _ in 0..n {
                        engine.tick();
                    }
                }
                Op::External(index, elapsed) => {
                    engine.apply_external_update(TimerState {
                        current_level_index: index,
                        elapsed_in_level: elapsed,
                        ..TimerState::default()
                    });
                }
            }

            let state = engine.state();
            prop_assert!(state.current_level_index < schedule.len());
            let cap = schedule
                .get(state.current_level_index)
                .unwrap()
                .duration_secs();
            prop_assert!(state.elapsed_in_level <= cap);
        }
    }
}
