//! Platform directories for config, data, and logs.

use crate::error::ApiError;
use directories::ProjectDirs;
use std::path::PathBuf;

pub fn project_dirs() -> Result<ProjectDirs, ApiError> {
    ProjectDirs::from("", "", "diskmuster").ok_or_else(|| {
        ApiError::ConfigError("Could not determine platform directories (HOME not set)".to_string())
    })
}

/// Global config file: `<config dir>/diskmuster/config.toml`
pub fn global_config_file() -> Option<PathBuf> {
    project_dirs()
        .ok()
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Default data directory for the repository and run lock
pub fn data_dir() -> Result<PathBuf, ApiError> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}
