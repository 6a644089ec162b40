//! Configuration
//!
//! `MusterConfig` is assembled by `ConfigLoader` from built-in defaults, the
//! global config file, the corpus root's `.muster.toml`, and `MUSTER__*`
//! environment variables, in that order of precedence.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

pub use facade::ConfigLoader;

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MusterConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the repository and run lock live
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory; None means the platform data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ApiError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::data_dir(),
        }
    }

    /// Sled database directory
    pub fn store_path(&self) -> Result<PathBuf, ApiError> {
        Ok(self.resolve_data_dir()?.join("store"))
    }
}

fn default_marker_file() -> String {
    ".muster".to_string()
}

fn default_container_extensions() -> Vec<String> {
    vec!["zip".to_string()]
}

fn default_flux_extensions() -> Vec<String> {
    vec!["a2r".to_string(), "flux".to_string()]
}

fn default_parsed_flux_extensions() -> Vec<String> {
    vec!["a2r".to_string()]
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Archive metadata given to every new record until someone edits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSeed {
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Used when no flux image names a language
    #[serde(default)]
    pub languages: Vec<String>,
}

impl Default for MetadataSeed {
    fn default() -> Self {
        Self {
            collections: strings(&["open_source_software"]),
            subjects: strings(&["Victor 9000", "ACT Sirius 1"]),
            languages: strings(&["English"]),
        }
    }
}

fn default_photo_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "bmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_disk_image_extensions() -> Vec<String> {
    vec!["img".to_string()]
}

/// Folder discovery and classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// File whose presence marks a folder as a disk folder
    #[serde(default = "default_marker_file")]
    pub marker_file: String,

    /// Treat every direct subfolder of the root as a disk, ignoring markers
    #[serde(default)]
    pub all_subfolders: bool,

    #[serde(default = "default_container_extensions")]
    pub container_extensions: Vec<String>,

    /// Flux captures of any format kept with the disk
    #[serde(default = "default_flux_extensions")]
    pub flux_extensions: Vec<String>,

    /// Flux formats the A2R parser reads, both loose and inside the container
    #[serde(default = "default_parsed_flux_extensions")]
    pub parsed_flux_extensions: Vec<String>,

    #[serde(default = "default_photo_extensions")]
    pub photo_extensions: Vec<String>,

    #[serde(default = "default_disk_image_extensions")]
    pub disk_image_extensions: Vec<String>,

    /// Hashing threads; 0 means one per available core
    #[serde(default)]
    pub hashing_workers: usize,

    #[serde(default)]
    pub seed: MetadataSeed,
}

impl ScanConfig {
    /// Whether `ext` (without the dot, any case) names a parseable flux format.
    pub fn parses_flux(&self, ext: &str) -> bool {
        self.parsed_flux_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext.trim_start_matches('.')))
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            marker_file: default_marker_file(),
            all_subfolders: false,
            container_extensions: default_container_extensions(),
            flux_extensions: default_flux_extensions(),
            parsed_flux_extensions: default_parsed_flux_extensions(),
            photo_extensions: default_photo_extensions(),
            disk_image_extensions: default_disk_image_extensions(),
            hashing_workers: 0,
            seed: MetadataSeed::default(),
        }
    }
}

fn default_metadata_endpoint() -> String {
    "https://archive.org".to_string()
}

fn default_upload_endpoint() -> String {
    "https://s3.us.archive.org".to_string()
}

fn default_network_workers() -> usize {
    4
}

fn default_rate_limit_ms() -> u64 {
    500
}

fn default_max_retries() -> usize {
    3
}

fn default_base_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Remote archive client settings. Credentials are opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_metadata_endpoint")]
    pub metadata_endpoint: String,

    #[serde(default = "default_upload_endpoint")]
    pub upload_endpoint: String,

    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    /// Concurrent remote operations
    #[serde(default = "default_network_workers")]
    pub network_workers: usize,

    /// Minimum delay between remote requests
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            metadata_endpoint: default_metadata_endpoint(),
            upload_endpoint: default_upload_endpoint(),
            access_key: None,
            secret_key: None,
            network_workers: default_network_workers(),
            rate_limit_ms: default_rate_limit_ms(),
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MusterConfig::default();
        assert_eq!(config.scan.marker_file, ".muster");
        assert_eq!(config.scan.flux_extensions, vec!["a2r", "flux"]);
        assert!(config.scan.parses_flux(".A2R"));
        assert!(!config.scan.parses_flux("flux"));
        assert_eq!(config.scan.seed.collections, vec!["open_source_software"]);
        assert_eq!(config.archive.max_retries, 3);
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn test_explicit_data_dir_is_used() {
        let storage = StorageConfig {
            data_dir: Some(PathBuf::from("/srv/muster")),
        };
        assert_eq!(
            storage.store_path().unwrap(),
            PathBuf::from("/srv/muster/store")
        );
    }
}
