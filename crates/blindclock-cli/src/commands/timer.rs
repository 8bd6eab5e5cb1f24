use std::path::PathBuf;

use blindclock_core::{
    BlindSchedule, Config, Event, GameId, StateStore, TimerEngine, TimerWindow, WindowOptions,
};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Run the timer window until interrupted, printing events as JSON lines
    Run {
        /// Game identifier
        #[arg(long, default_value = "default")]
        game: String,
        /// Blind schedule TOML file (built-in structure if omitted)
        #[arg(long)]
        schedule: Option<PathBuf>,
        /// Start the clock immediately
        #[arg(long)]
        start: bool,
    },
    /// Print current timer state as JSON
    Status {
        #[arg(long, default_value = "default")]
        game: String,
        #[arg(long)]
        schedule: Option<PathBuf>,
    },
    /// Start (or resume) the clock
    Start {
        #[arg(long, default_value = "default")]
        game: String,
        #[arg(long)]
        schedule: Option<PathBuf>,
    },
    /// Pause the clock
    Pause {
        #[arg(long, default_value = "default")]
        game: String,
        #[arg(long)]
        schedule: Option<PathBuf>,
    },
    /// Reset to level 1, clearing persisted state
    Reset {
        #[arg(long, default_value = "default")]
        game: String,
    },
    /// Jump to the next level
    Next {
        #[arg(long, default_value = "default")]
        game: String,
        #[arg(long)]
        schedule: Option<PathBuf>,
    },
    /// Jump back to the previous level
    Prev {
        #[arg(long, default_value = "default")]
        game: String,
        #[arg(long)]
        schedule: Option<PathBuf>,
    },
    /// Position within the current level by percentage (0-100)
    Seek {
        percentage: f64,
        #[arg(long, default_value = "default")]
        game: String,
        #[arg(long)]
        schedule: Option<PathBuf>,
    },
    /// Toggle audio cues
    Sound {
        #[arg(long, default_value = "default")]
        game: String,
        #[arg(long)]
        schedule: Option<PathBuf>,
    },
    /// Open the spectator display in the default browser
    Open {
        #[arg(long, default_value = "default")]
        game: String,
    },
    /// Clear the persisted state for a game
    Clear {
        #[arg(long, default_value = "default")]
        game: String,
    },
    /// Remove idle and corrupt persisted entries
    Sweep,
}

fn load_schedule(path: Option<&PathBuf>) -> Result<BlindSchedule, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            Ok(BlindSchedule::from_toml_str(&content)?)
        }
        None => Ok(BlindSchedule::standard()),
    }
}

/// Load-mutate-save against the persisted state, printing the resulting
/// event (or the unchanged state when the mutation was a no-op).
fn with_engine(
    game: &str,
    schedule: Option<&PathBuf>,
    mutate: impl FnOnce(&mut TimerEngine) -> Option<Event>,
) -> Result<(), Box<dyn std::error::Error>> {
    let game_id = GameId::new(game);
    let schedule = load_schedule(schedule)?;
    let store = StateStore::open()?;
    let state = store.load(&game_id, &schedule);
    let mut engine = TimerEngine::with_state(schedule, state);

    match mutate(&mut engine) {
        Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
        None => println!("{}", serde_json::to_string_pretty(engine.state())?),
    }

    let mut state = engine.state().clone();
    store.save(&game_id, &mut state);
    Ok(())
}

fn print_status(game: &str, schedule: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let game_id = GameId::new(game);
    let schedule = load_schedule(schedule)?;
    let store = StateStore::open()?;
    let state = store.load(&game_id, &schedule);
    let engine = TimerEngine::with_state(schedule, state);

    let status = serde_json::json!({
        "game_id": game,
        "phase": engine.phase(),
        "state": engine.state(),
        "current_level": engine.current_level(),
        "next_level": engine.next_level(),
        "time_remaining_in_level": engine.time_remaining_in_level(),
        "progress_percentage": engine.progress_percentage(),
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn run_window(
    game: String,
    schedule: BlindSchedule,
    start: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = StateStore::open()?;
    let config = Config::load_or_default();
    let handle = TimerWindow::spawn(
        WindowOptions {
            game_id: GameId::new(game),
            schedule,
            bus: None,
            config,
        },
        store,
    );
    let mut events = handle.subscribe_events();
    if start {
        handle.start();
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.shutdown();
                break;
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        TimerAction::Run {
            game,
            schedule,
            start,
        } => {
            let schedule = load_schedule(schedule.as_ref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_window(game, schedule, start))?;
        }
        TimerAction::Status { game, schedule } => print_status(&game, schedule.as_ref())?,
        TimerAction::Start { game, schedule } => {
            with_engine(&game, schedule.as_ref(), |engine| engine.start())?;
        }
        TimerAction::Pause { game, schedule } => {
            with_engine(&game, schedule.as_ref(), |engine| engine.pause())?;
        }
        TimerAction::Reset { game } => {
            let store = StateStore::open()?;
            store.clear(&GameId::new(&game));
            println!("{{\"type\": \"timer_reset\"}}");
        }
        TimerAction::Next { game, schedule } => {
            with_engine(&game, schedule.as_ref(), |engine| engine.next_level_jump())?;
        }
        TimerAction::Prev { game, schedule } => {
            with_engine(&game, schedule.as_ref(), |engine| {
                engine.previous_level_jump()
            })?;
        }
        TimerAction::Seek {
            percentage,
            game,
            schedule,
        } => {
            with_engine(&game, schedule.as_ref(), |engine| engine.seek(percentage))?;
        }
        TimerAction::Sound { game, schedule } => {
            with_engine(&game, schedule.as_ref(), |engine| engine.toggle_sound())?;
        }
        TimerAction::Open { game } => {
            let config = Config::load_or_default();
            let url = format!(
                "{}/timer/{}",
                config.companion.base_url.trim_end_matches('/'),
                game
            );
            open::that(&url)?;
            println!("opened {url}");
        }
        TimerAction::Clear { game } => {
            let store = StateStore::open()?;
            store.clear(&GameId::new(&game));
            println!("cleared state for game '{game}'");
        }
        TimerAction::Sweep => {
            let store = StateStore::open()?;
            let removed = store.sweep();
            println!("swept {removed} entries");
        }
    }
    Ok(())
}
