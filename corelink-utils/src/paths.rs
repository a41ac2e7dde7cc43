//! Path utilities for corelink
//!
//! Handles XDG Base Directory specification compliance for config,
//! state, cache, and log directories.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const APP_NAME: &str = "corelink";

/// Get project directories
fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/corelink` or `~/.config/corelink`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(fallback_config_dir)
}

/// Get the main configuration file path
///
/// Location: `$XDG_CONFIG_HOME/corelink/config.toml`
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the state directory (persistent state)
///
/// Location: `$XDG_STATE_HOME/corelink` or `~/.local/state/corelink`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(fallback_state_dir)
}

/// Get the data directory
///
/// Location: `$XDG_DATA_HOME/corelink` or `~/.local/share/corelink`
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(fallback_data_dir)
}

/// Get the cache directory (temporary data, safe to delete)
///
/// Location: `$XDG_CACHE_HOME/corelink` or `~/.cache/corelink`
pub fn cache_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.cache_dir().to_path_buf())
        .unwrap_or_else(fallback_cache_dir)
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/corelink/log` or `~/.local/state/corelink/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &PathBuf) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensure all required directories exist
pub fn ensure_all_dirs() -> std::io::Result<()> {
    ensure_dir(&config_dir())?;
    ensure_dir(&state_dir())?;
    ensure_dir(&data_dir())?;
    ensure_dir(&cache_dir())?;
    ensure_dir(&log_dir())?;
    Ok(())
}

// Fallback implementations when ProjectDirs is unavailable

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn fallback_config_dir() -> PathBuf {
    home_dir().join(".config").join(APP_NAME)
}

fn fallback_state_dir() -> PathBuf {
    home_dir().join(".local").join("state").join(APP_NAME)
}

fn fallback_data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join(APP_NAME)
}

fn fallback_cache_dir() -> PathBuf {
    home_dir().join(".cache").join(APP_NAME)
}
