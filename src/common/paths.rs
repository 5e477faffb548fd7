use anyhow::{Context, Result};
use std::path::PathBuf;

/// Get the eden config directory (`~/.config/eden`). Does not create it.
pub fn eden_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("eden"))
}

/// Path of the main config file
pub fn config_file_path() -> Result<PathBuf> {
    Ok(eden_config_dir()?.join("config.toml"))
}
