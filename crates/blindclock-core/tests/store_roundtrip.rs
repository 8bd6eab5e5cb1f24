//! Integration tests for crash recovery: a window saves through the
//! runtime, dies, and a fresh window picks the clock back up from the
//! same database file.

use std::time::Duration;

use blindclock_core::{
    BlindLevel, BlindSchedule, Config, GameId, StateStore, TimerState, TimerWindow, WindowOptions,
};
use tokio::time::sleep;

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

fn test_config() -> Config {
    let mut config = Config::default();
    config.connectivity.probe_interval_secs = 0;
    config
}

#[tokio::test(start_paused = true)]
async fn state_survives_a_window_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("blindclock.db");
    let game_id = GameId::new("friday-game");

    let first = TimerWindow::spawn(
        WindowOptions {
            game_id: game_id.clone(),
            schedule: schedule(&[15, 15]),
            bus: None,
            config: test_config(),
        },
        StateStore::open_at(&db_path).unwrap(),
    );
    sleep(Duration::from_millis(50)).await;

    first.start();
    sleep(Duration::from_secs(90)).await;
    first.pause();
    sleep(Duration::from_millis(50)).await;

    let before = first.snapshot();
    assert_eq!(before.elapsed_in_level, 90);

    first.shutdown();
    sleep(Duration::from_millis(50)).await;

    // The "crashed" window is gone; a new one opens the same file.
    let second = TimerWindow::spawn(
        WindowOptions {
            game_id,
            schedule: schedule(&[15, 15]),
            bus: None,
            config: test_config(),
        },
        StateStore::open_at(&db_path).unwrap(),
    );
    sleep(Duration::from_millis(50)).await;

    let after = second.snapshot();
    assert_eq!(after.elapsed_in_level, before.elapsed_in_level);
    assert_eq!(after.total_elapsed, before.total_elapsed);
    assert_eq!(after.current_level_index, before.current_level_index);
    assert!(!after.is_running);
}

#[tokio::test(start_paused = true)]
async fn recovery_with_a_shrunk_schedule_discards_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("blindclock.db");
    let game_id = GameId::new("g1");

    let store = StateStore::open_at(&db_path).unwrap();
    let mut state = TimerState {
        current_level_index: 3,
        elapsed_in_level: 120,
        total_elapsed: 2_000,
        ..TimerState::default()
    };
    store.save(&game_id, &mut state);
    drop(store);

    // The organizer edited the structure down to two levels; the saved
    // index no longer exists, so recovery starts clean.
    let handle = TimerWindow::spawn(
        WindowOptions {
            game_id,
            schedule: schedule(&[15, 15]),
            bus: None,
            config: test_config(),
        },
        StateStore::open_at(&db_path).unwrap(),
    );
    sleep(Duration::from_millis(50)).await;

    let snap = handle.snapshot();
    assert_eq!(snap.current_level_index, 0);
    assert_eq!(snap.elapsed_in_level, 0);
    assert_eq!(snap.total_elapsed, 0);
}

#[test]
fn games_persist_independently() {
    let store = StateStore::open_memory().unwrap();
    let schedule = schedule(&[15, 15, 15]);

    let mut a = TimerState {
        current_level_index: 2,
        elapsed_in_level: 30,
        ..TimerState::default()
    };
    let mut b = TimerState {
        current_level_index: 1,
        elapsed_in_level: 400,
        ..TimerState::default()
    };
    store.save(&GameId::new("a"), &mut a);
    store.save(&GameId::new("b"), &mut b);

    assert_eq!(
        store.load(&GameId::new("a"), &schedule).current_level_index,
        2
    );
    assert_eq!(
        store.load(&GameId::new("b"), &schedule).elapsed_in_level,
        400
    );

    store.clear(&GameId::new("a"));
    assert_eq!(
        store.load(&GameId::new("a"), &schedule).current_level_index,
        0
    );
    assert_eq!(
        store.load(&GameId::new("b"), &schedule).elapsed_in_level,
        400
    );
}
