mod config;
mod state_store;

pub use config::{AudioConfig, CompanionConfig, Config, ConnectivityConfig};
pub use state_store::StateStore;

use std::path::PathBuf;

/// Returns `~/.config/blindclock[-dev]/` based on BLINDCLOCK_ENV.
///
/// Set BLINDCLOCK_ENV=dev to use a development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("BLINDCLOCK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("blindclock-dev")
    } else {
        base_dir.join("blindclock")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
