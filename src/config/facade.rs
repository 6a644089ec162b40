//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::MusterConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a corpus root from files and environment.
    pub fn load(root: &Path) -> Result<MusterConfig, ConfigError> {
        MergeService::load(root)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<MusterConfig, ConfigError> {
        MergeService::load_from_file(path)
    }

    /// Create default configuration.
    pub fn default() -> MusterConfig {
        MusterConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sources::root_file::ROOT_CONFIG_FILE;

    #[test]
    fn test_root_file_overrides_defaults() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(
            root.path().join(ROOT_CONFIG_FILE),
            "[scan]\nmarker_file = \".disk\"\nhashing_workers = 2\n\n[archive]\nrate_limit_ms = 50\n",
        )
        .unwrap();

        let config = ConfigLoader::load(root.path()).unwrap();
        assert_eq!(config.scan.marker_file, ".disk");
        assert_eq!(config.scan.hashing_workers, 2);
        assert_eq!(config.archive.rate_limit_ms, 50);
        assert_eq!(config.archive.max_retries, 3);
        assert_eq!(config.scan.photo_extensions.len(), 5);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[storage]\ndata_dir = \"/srv/muster\"\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(
            config.storage.data_dir.as_deref(),
            Some(Path::new("/srv/muster"))
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.scan.marker_file, ".muster");
    }

    #[test]
    fn test_missing_root_file_yields_defaults() {
        let root = tempfile::tempdir().unwrap();
        let config = ConfigLoader::load(root.path()).unwrap();
        assert_eq!(config.scan.flux_extensions, vec!["a2r", "flux"]);
        assert_eq!(config.scan.seed.languages, vec!["English"]);
    }
}
