mod config;
pub mod database;

pub use config::{AudioConfig, Config, DurationsConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::Result;

/// Returns `~/.config/flipfocus[-dev]/` based on FLIPFOCUS_ENV.
///
/// Set FLIPFOCUS_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FLIPFOCUS_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("flipfocus-dev")
    } else {
        base_dir.join("flipfocus")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
