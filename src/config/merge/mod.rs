//! Merge policy: defaults first, every later source overrides.

pub mod service;

use crate::config::MusterConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with the serialized built-in defaults.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&MusterConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
