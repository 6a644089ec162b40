//! MergeService: orchestrates sources, applies merge policy, deserializes to MusterConfig.

use super::builder_with_defaults;
use crate::config::sources::{environment, global_file, root_file};
use crate::config::MusterConfig;
use config::{ConfigError, File};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config for a corpus root.
    /// Precedence: defaults (lowest) -> global file -> root file -> environment (highest).
    pub fn load(root: &Path) -> Result<MusterConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = root_file::add_to_builder(builder, root)?;
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<MusterConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = builder.add_source(File::from(path.to_path_buf()));
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }
}
