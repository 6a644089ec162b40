//! Filesystem Mustering
//!
//! Walks a root of disk folders, picks the disk folders through an injected
//! `DiscoveryPredicate`, and turns each into a `DiskRecord`: one ZIP container
//! (indexed into a content manifest), any flux images (parsed, loose or inside
//! the container), photos, raw sector images, and a description file whose
//! text seeds the archive metadata. Unchanged containers are detected by
//! fingerprint and never re-indexed.

pub mod describe;
pub mod discovery;
pub mod scanner;

pub use discovery::{discover_disk_folders, AllSubfolders, DiscoveryPredicate, MarkerFilePredicate};
pub use scanner::{DiskChange, DiskScanResult, FilesystemScanner, ScanReport};

use crate::config::ScanConfig;

/// Predicate selected by the scan settings.
pub fn predicate_for(settings: &ScanConfig) -> Box<dyn DiscoveryPredicate> {
    if settings.all_subfolders {
        Box::new(AllSubfolders)
    } else {
        Box::new(MarkerFilePredicate::new(settings.marker_file.clone()))
    }
}
