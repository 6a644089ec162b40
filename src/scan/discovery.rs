//! Disk folder discovery

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Decides which folders under the root represent disks.
///
/// A matching folder is not searched further, so disk folders never nest.
pub trait DiscoveryPredicate: Send + Sync {
    fn is_disk_folder(&self, folder: &Path) -> bool;

    /// Short description for logs and audit inputs.
    fn describe(&self) -> String;
}

/// Matches folders containing a marker file.
#[derive(Debug, Clone)]
pub struct MarkerFilePredicate {
    marker: String,
}

impl MarkerFilePredicate {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Default for MarkerFilePredicate {
    fn default() -> Self {
        Self::new(".muster")
    }
}

impl DiscoveryPredicate for MarkerFilePredicate {
    fn is_disk_folder(&self, folder: &Path) -> bool {
        folder.join(&self.marker).is_file()
    }

    fn describe(&self) -> String {
        format!("marker:{}", self.marker)
    }
}

/// Every direct subfolder of the root is a disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllSubfolders;

impl DiscoveryPredicate for AllSubfolders {
    fn is_disk_folder(&self, _folder: &Path) -> bool {
        true
    }

    fn describe(&self) -> String {
        "all-subfolders".to_string()
    }
}

pub(crate) fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Walk `root` and return the selected disk folders in name order.
///
/// Hidden folders are skipped. Unreadable subtrees are logged and skipped.
pub fn discover_disk_folders(root: &Path, predicate: &dyn DiscoveryPredicate) -> Vec<PathBuf> {
    let mut folders = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name()));

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path during discovery");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if predicate.is_disk_folder(entry.path()) {
            folders.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    folders
}
