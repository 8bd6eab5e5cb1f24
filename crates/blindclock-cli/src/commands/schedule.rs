use std::path::PathBuf;

use blindclock_core::BlindSchedule;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Print a schedule as JSON (built-in structure if no file given)
    Show {
        /// Blind schedule TOML file
        path: Option<PathBuf>,
    },
    /// Validate a schedule file
    Check {
        /// Blind schedule TOML file
        path: PathBuf,
    },
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ScheduleAction::Show { path } => {
            let schedule = match path {
                Some(path) => BlindSchedule::from_toml_str(&std::fs::read_to_string(path)?)?,
                None => BlindSchedule::standard(),
            };
            println!("{}", serde_json::to_string_pretty(schedule.levels())?);
        }
        ScheduleAction::Check { path } => {
            let schedule = BlindSchedule::from_toml_str(&std::fs::read_to_string(&path)?)?;
            println!(
                "ok: {} levels, {} minutes total",
                schedule.len(),
                schedule.total_duration_min()
            );
        }
    }
    Ok(())
}
