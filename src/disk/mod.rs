//! Disk Records
//!
//! One `DiskRecord` per physical disk folder. Every pipeline component reads
//! and writes disks through this model; persistence sits behind
//! `store::DiskRepository`.

use crate::content::{ContainerFingerprint, ContentManifest};
use crate::flux::FluxImage;
use crate::types::{ContentHash, DiskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Reconciliation state against the remote archive item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SyncStatus {
    #[default]
    NeverChecked,
    /// Transient; never persisted past the end of a run
    Checking,
    InSync,
    OutOfSync,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::NeverChecked => "never_checked",
            SyncStatus::Checking => "checking",
            SyncStatus::InSync => "in_sync",
            SyncStatus::OutOfSync => "out_of_sync",
            SyncStatus::Error => "error",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SyncStatus::Checking)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata published with the archive item (title lives on the record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub description: String,
    pub mediatype: String,
    /// ISO date (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`), empty when unknown
    pub date: String,
    pub creators: Vec<String>,
    pub subjects: Vec<String>,
    pub collections: Vec<String>,
    pub languages: Vec<String>,
}

impl Default for ArchiveMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            mediatype: "software".to_string(),
            date: String::new(),
            creators: Vec::new(),
            subjects: Vec::new(),
            collections: Vec::new(),
            languages: Vec::new(),
        }
    }
}

/// A flux image file in the disk folder plus its cached parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FluxImageRef {
    pub path: PathBuf,
    pub fingerprint: ContainerFingerprint,
    /// Parsed image, absent when parsing failed
    pub image: Option<FluxImage>,
    pub error: Option<String>,
}

/// A flux image stored as an entry of the disk's ZIP container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedFluxRef {
    /// Entry path inside the container
    pub entry: String,
    pub image: Option<FluxImage>,
    pub error: Option<String>,
}

/// One physical disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskRecord {
    pub id: DiskId,
    pub title: String,
    /// Folder the disk was last seen in
    pub folder: PathBuf,
    pub upload_ready: bool,
    pub needs_work: bool,
    /// Problems found by the last scan of this disk
    pub work_notes: Vec<String>,
    pub sync_status: SyncStatus,
    /// Outcome of the last sync operation (differences, remote errors, changes)
    pub sync_notes: Vec<String>,
    pub last_sync_check: Option<DateTime<Utc>>,
    pub last_archive_sync: Option<DateTime<Utc>>,
    /// Last check found no remote item; the first push creates it
    pub remote_missing: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub manifest: ContentManifest,
    pub flux_images: Vec<FluxImageRef>,
    /// Flux images found inside the container, rebuilt with the manifest
    pub embedded_flux: Vec<EmbeddedFluxRef>,
    pub photos: Vec<PathBuf>,
    pub disk_images: Vec<PathBuf>,
    pub has_disk_image: bool,
    pub description_file: Option<PathBuf>,
    pub metadata: ArchiveMetadata,
    /// Set whenever the hash set changes; cleared by duplicate detection
    pub needs_duplicate_check: bool,
}

impl DiskRecord {
    pub fn new(id: DiskId, title: impl Into<String>, folder: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            folder,
            upload_ready: false,
            needs_work: false,
            work_notes: Vec::new(),
            sync_status: SyncStatus::NeverChecked,
            sync_notes: Vec::new(),
            last_sync_check: None,
            last_archive_sync: None,
            remote_missing: false,
            created_at: now,
            modified_at: now,
            manifest: ContentManifest::default(),
            flux_images: Vec::new(),
            embedded_flux: Vec::new(),
            photos: Vec::new(),
            disk_images: Vec::new(),
            has_disk_image: false,
            description_file: None,
            metadata: ArchiveMetadata::default(),
            needs_duplicate_check: false,
        }
    }

    /// Content-hash set derived from the current manifest.
    pub fn hash_set(&self) -> BTreeSet<ContentHash> {
        self.manifest.hash_set()
    }

    pub fn has_flux_image(&self) -> bool {
        !self.flux_images.is_empty() || !self.embedded_flux.is_empty()
    }

    /// Whether an archive item is known to exist for this disk.
    pub fn is_uploaded(&self) -> bool {
        self.last_archive_sync.is_some()
            || matches!(self.sync_status, SyncStatus::InSync | SyncStatus::OutOfSync)
    }

    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    /// Record a per-disk problem found while scanning.
    pub fn flag_needs_work(&mut self, note: impl Into<String>) {
        self.needs_work = true;
        self.work_notes.push(note.into());
    }

    pub fn clear_work_notes(&mut self) {
        self.needs_work = false;
        self.work_notes.clear();
    }

    /// First parsed flux image, used for titles of new records. Loose files
    /// come before images inside the container.
    pub fn first_flux_image(&self) -> Option<&FluxImage> {
        self.flux_images
            .iter()
            .find_map(|f| f.image.as_ref())
            .or_else(|| self.embedded_flux.iter().find_map(|f| f.image.as_ref()))
    }

    /// Every parsed flux image, loose files first.
    pub fn flux_image_iter(&self) -> impl Iterator<Item = &FluxImage> {
        self.flux_images
            .iter()
            .filter_map(|f| f.image.as_ref())
            .chain(self.embedded_flux.iter().filter_map(|f| f.image.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = DiskRecord::new(
            DiskId::new("victor-utilities"),
            "Victor Utilities",
            PathBuf::from("/muster/Victor Utilities"),
        );
        assert_eq!(record.sync_status, SyncStatus::NeverChecked);
        assert!(!record.upload_ready);
        assert!(record.hash_set().is_empty());
        assert_eq!(record.metadata.mediatype, "software");
    }

    #[test]
    fn test_flag_and_clear_work() {
        let mut record = DiskRecord::new(DiskId::new("a"), "A", PathBuf::from("/a"));
        record.flag_needs_work("Missing container");
        record.flag_needs_work("Bad flux image");
        assert!(record.needs_work);
        assert_eq!(record.work_notes.len(), 2);
        record.clear_work_notes();
        assert!(!record.needs_work);
        assert!(record.work_notes.is_empty());
    }

    #[test]
    fn test_record_survives_bincode() {
        let mut record = DiskRecord::new(DiskId::new("b"), "B", PathBuf::from("/b"));
        record.sync_status = SyncStatus::OutOfSync;
        record.metadata.creators = vec!["Victor".to_string()];
        let bytes = bincode::serialize(&record).unwrap();
        let decoded: DiskRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_uploaded_means_remote_item_known() {
        let mut record = DiskRecord::new(DiskId::new("c"), "C", PathBuf::from("/c"));
        assert!(!record.is_uploaded());
        record.sync_status = SyncStatus::Error;
        assert!(!record.is_uploaded());
        record.sync_status = SyncStatus::OutOfSync;
        assert!(record.is_uploaded());
        record.sync_status = SyncStatus::Error;
        record.last_archive_sync = Some(Utc::now());
        assert!(record.is_uploaded());
    }

    #[test]
    fn test_only_checking_is_transient() {
        assert!(SyncStatus::Checking.is_transient());
        assert!(!SyncStatus::OutOfSync.is_transient());
        assert_eq!(SyncStatus::InSync.to_string(), "in_sync");
    }
}
