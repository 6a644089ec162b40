//! FilesystemScanner: folder to DiskRecord

use super::describe::seed_metadata;
use super::discovery::{discover_disk_folders, is_hidden, DiscoveryPredicate};
use crate::audit::RunCounts;
use crate::concurrency::{CancellationFlag, HashingPool};
use crate::config::ScanConfig;
use crate::content::{parse_embedded_flux, ContainerFingerprint, ContentEntry, ZipContentIndexer};
use crate::disk::{DiskRecord, EmbeddedFluxRef, FluxImageRef};
use crate::error::ApiError;
use crate::flux::parse_flux_file;
use crate::store::DiskRepository;
use crate::types::DiskId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Description files, in priority order. `*` matches any extension.
const DESCRIPTION_FILES: &[&str] = &["DISKID", "README.TXT", "README.DOC", "READ.ME", "Notes.*"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskChange {
    Created,
    Updated,
    Unchanged,
}

/// Result of scanning one disk folder.
#[derive(Debug, Clone)]
pub struct DiskScanResult {
    pub id: DiskId,
    pub folder: PathBuf,
    pub change: DiskChange,
    /// Container was re-indexed during this scan
    pub reindexed: bool,
    /// Per-disk problems recorded against the record
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub disks: Vec<DiskScanResult>,
    pub counts: RunCounts,
    /// Cancelled before every discovered folder was processed
    pub interrupted: bool,
    pub discovered: usize,
}

type ProgressHook = Box<dyn Fn(&DiskScanResult) + Send + Sync>;

/// Files of one disk folder, sorted by path.
#[derive(Debug, Default)]
struct FolderListing {
    containers: Vec<PathBuf>,
    flux: Vec<PathBuf>,
    photos: Vec<PathBuf>,
    disk_images: Vec<PathBuf>,
    all: Vec<PathBuf>,
}

pub struct FilesystemScanner {
    root: PathBuf,
    predicate: Box<dyn DiscoveryPredicate>,
    settings: ScanConfig,
    indexer: ZipContentIndexer,
    on_disk: Option<ProgressHook>,
}

impl FilesystemScanner {
    /// Fails with `RootNotFound` before anything is touched if `root` is not a directory.
    pub fn new(
        root: &Path,
        predicate: Box<dyn DiscoveryPredicate>,
        settings: ScanConfig,
        pool: HashingPool,
    ) -> Result<Self, ApiError> {
        if !root.is_dir() {
            return Err(ApiError::RootNotFound(root.to_path_buf()));
        }
        let root = dunce::canonicalize(root)?;
        Ok(Self {
            root,
            predicate,
            settings,
            indexer: ZipContentIndexer::new(pool),
            on_disk: None,
        })
    }

    /// Called after each disk is processed and saved.
    pub fn with_progress(mut self, hook: impl Fn(&DiskScanResult) + Send + Sync + 'static) -> Self {
        self.on_disk = Some(Box::new(hook));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn predicate(&self) -> &dyn DiscoveryPredicate {
        self.predicate.as_ref()
    }

    pub fn discover(&self) -> Vec<PathBuf> {
        discover_disk_folders(&self.root, self.predicate.as_ref())
    }

    /// Scan every discovered disk folder, saving records that changed.
    ///
    /// Cancellation is honoured between disks only; a disk that has started
    /// is always finished and saved.
    pub fn scan(
        &self,
        repository: &dyn DiskRepository,
        cancel: &CancellationFlag,
    ) -> Result<ScanReport, ApiError> {
        let folders = self.discover();
        let mut existing: HashMap<DiskId, DiskRecord> = repository
            .load_all()?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        let mut claimed: HashMap<DiskId, PathBuf> = HashMap::new();
        let mut report = ScanReport {
            discovered: folders.len(),
            ..Default::default()
        };

        info!(root = %self.root.display(), disks = folders.len(), "Scanning");

        for folder in folders {
            if cancel.is_cancelled() {
                warn!(
                    remaining = report.discovered - report.disks.len(),
                    "Scan interrupted"
                );
                report.interrupted = true;
                break;
            }

            let id = disk_id_for(&folder);
            if let Some(first) = claimed.get(&id) {
                let note = format!(
                    "Identifier {} already taken by {}; folder skipped",
                    id,
                    first.display()
                );
                warn!(disk = %id, folder = %folder.display(), "{}", note);
                report.counts.scanned += 1;
                report.counts.errored += 1;
                report.disks.push(DiskScanResult {
                    id,
                    folder,
                    change: DiskChange::Unchanged,
                    reindexed: false,
                    errors: vec![note],
                });
                continue;
            }
            claimed.insert(id.clone(), folder.clone());

            let previous = existing.remove(&id);
            let (record, result) = self.scan_folder(&folder, previous.as_ref());
            if result.change != DiskChange::Unchanged {
                repository.save(&record)?;
            }

            report.counts.scanned += 1;
            match result.change {
                DiskChange::Created => report.counts.created += 1,
                DiskChange::Updated => report.counts.updated += 1,
                DiskChange::Unchanged => {}
            }
            if !result.errors.is_empty() {
                report.counts.errored += 1;
            }
            if let Some(hook) = &self.on_disk {
                hook(&result);
            }
            report.disks.push(result);
        }

        repository.flush()?;
        info!(
            scanned = report.counts.scanned,
            created = report.counts.created,
            updated = report.counts.updated,
            errored = report.counts.errored,
            interrupted = report.interrupted,
            "Scan complete"
        );
        Ok(report)
    }

    /// Build the record for one folder from its previous state.
    ///
    /// Never fails: per-disk problems are written into the record's work notes.
    pub fn scan_folder(
        &self,
        folder: &Path,
        previous: Option<&DiskRecord>,
    ) -> (DiskRecord, DiskScanResult) {
        let id = disk_id_for(folder);
        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut record = match previous {
            Some(prev) => prev.clone(),
            None => DiskRecord::new(id.clone(), folder_name.clone(), folder.to_path_buf()),
        };
        record.folder = folder.to_path_buf();
        record.clear_work_notes();

        let listing = self.list_folder(folder);
        let reindexed = self.update_container(&mut record, &listing);
        self.update_flux_images(&mut record, &listing);
        let embedded_errors: Vec<String> = record
            .embedded_flux
            .iter()
            .filter_map(|f| f.error.as_ref().map(|e| format!("{}: {}", f.entry, e)))
            .collect();
        for note in embedded_errors {
            record.flag_needs_work(note);
        }

        record.photos = listing.photos.clone();
        record.disk_images = listing.disk_images.clone();
        record.has_disk_image = !record.disk_images.is_empty();
        record.description_file = find_description_file(&listing.all);
        if let Some(problem) = seed_metadata(&mut record, &self.settings.seed) {
            record_failure_note(&mut record, problem);
        }

        if previous.is_none() {
            let flux_title = record
                .first_flux_image()
                .and_then(|i| i.meta_chunk().title().map(str::to_string));
            if let Some(title) = flux_title {
                record.title = title;
            }
        }

        let change = match previous {
            None => DiskChange::Created,
            Some(prev) if *prev == record => DiskChange::Unchanged,
            Some(_) => DiskChange::Updated,
        };
        if change == DiskChange::Updated {
            record.touch();
        }

        debug!(
            disk = %id,
            change = ?change,
            entries = record.manifest.len(),
            flux = record.flux_images.len(),
            issues = record.work_notes.len(),
            "Scanned disk folder"
        );

        let result = DiskScanResult {
            id,
            folder: folder.to_path_buf(),
            change,
            reindexed,
            errors: record.work_notes.clone(),
        };
        (record, result)
    }

    /// Re-index the container if it changed. Returns whether it was re-indexed.
    ///
    /// A container that can no longer be read takes its manifest with it.
    fn update_container(&self, record: &mut DiskRecord, listing: &FolderListing) -> bool {
        let container = match listing.containers.as_slice() {
            [] => {
                forget_container(record);
                record_failure(
                    record,
                    ApiError::MissingContainer {
                        folder: record.folder.clone(),
                    },
                );
                return false;
            }
            [one] => one,
            many => {
                forget_container(record);
                record_failure(
                    record,
                    ApiError::AmbiguousContainer {
                        folder: record.folder.clone(),
                        count: many.len(),
                    },
                );
                return false;
            }
        };

        let fingerprint = match ContainerFingerprint::of(container) {
            Ok(fp) => fp,
            Err(e) => {
                forget_container(record);
                record_failure(record, ApiError::Io(e));
                return false;
            }
        };

        if record.manifest.is_current(container, fingerprint) {
            return false;
        }
        // Same file moved along with its folder: keep the entries.
        let moved = record.manifest.fingerprint() == Some(fingerprint)
            && record.manifest.container().and_then(Path::file_name) == container.file_name();
        if moved {
            record.manifest.relocate(container.clone());
            for embedded in record.embedded_flux.iter_mut() {
                if let Some(image) = embedded.image.as_mut() {
                    image.path = container.clone();
                }
            }
            return false;
        }

        match self.indexer.index(container) {
            Ok(entries) => {
                info!(
                    disk = %record.id,
                    container = %container.display(),
                    entries = entries.len(),
                    "Indexed container"
                );
                record.embedded_flux = self.parse_embedded(container, &entries);
                record
                    .manifest
                    .replace(container.clone(), fingerprint, entries);
                record.needs_duplicate_check = true;
                true
            }
            Err(e) => {
                forget_container(record);
                record_failure(record, e);
                false
            }
        }
    }

    /// Parse every flux image stored inside a freshly indexed container.
    fn parse_embedded(&self, container: &Path, entries: &[ContentEntry]) -> Vec<EmbeddedFluxRef> {
        entries
            .iter()
            .filter(|e| e.suffix().map(|s| self.settings.parses_flux(&s)).unwrap_or(false))
            .map(|e| match parse_embedded_flux(container, &e.path) {
                Ok(image) => EmbeddedFluxRef {
                    entry: e.path.clone(),
                    image: Some(image),
                    error: None,
                },
                Err(err) => {
                    warn!(container = %container.display(), entry = %e.path, error = %err, "Embedded flux image rejected");
                    EmbeddedFluxRef {
                        entry: e.path.clone(),
                        image: None,
                        error: Some(err.to_string()),
                    }
                }
            })
            .collect()
    }

    /// Parse new or changed flux images; reuse cached parses for the rest.
    ///
    /// Formats the parser does not read are listed without an image.
    fn update_flux_images(&self, record: &mut DiskRecord, listing: &FolderListing) {
        let cached: HashMap<PathBuf, FluxImageRef> = record
            .flux_images
            .drain(..)
            .map(|f| (f.path.clone(), f))
            .collect();

        let mut images = Vec::with_capacity(listing.flux.len());
        for path in &listing.flux {
            let fingerprint = match ContainerFingerprint::of(path) {
                Ok(fp) => fp,
                Err(e) => {
                    record.flag_needs_work(format!("{}: {}", path.display(), e));
                    continue;
                }
            };

            let parseable = extension_of(path)
                .map(|e| self.settings.parses_flux(&e))
                .unwrap_or(false);
            let image_ref = match cached.get(path) {
                Some(prev) if prev.fingerprint == fingerprint => prev.clone(),
                _ if !parseable => FluxImageRef {
                    path: path.clone(),
                    fingerprint,
                    image: None,
                    error: None,
                },
                _ => match parse_flux_file(path) {
                    Ok(image) => FluxImageRef {
                        path: path.clone(),
                        fingerprint,
                        image: Some(image),
                        error: None,
                    },
                    Err(e) => {
                        warn!(disk = %record.id, path = %path.display(), error = %e, "Flux image rejected");
                        FluxImageRef {
                            path: path.clone(),
                            fingerprint,
                            image: None,
                            error: Some(e.to_string()),
                        }
                    }
                },
            };
            if let Some(error) = &image_ref.error {
                record.flag_needs_work(format!("{}: {}", path.display(), error));
            }
            images.push(image_ref);
        }
        record.flux_images = images;
    }

    /// Every non-hidden file under `folder`, classified by extension.
    fn list_folder(&self, folder: &Path) -> FolderListing {
        let mut listing = FolderListing::default();
        let walker = WalkDir::new(folder)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(folder = %folder.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            let ext = extension_of(&path);
            let matches = |list: &[String]| {
                ext.as_deref()
                    .map(|e| list.iter().any(|l| l.eq_ignore_ascii_case(e)))
                    .unwrap_or(false)
            };

            if matches(&self.settings.container_extensions) {
                listing.containers.push(path.clone());
            } else if matches(&self.settings.flux_extensions) {
                listing.flux.push(path.clone());
            } else if matches(&self.settings.photo_extensions) {
                listing.photos.push(path.clone());
            } else if matches(&self.settings.disk_image_extensions) {
                listing.disk_images.push(path.clone());
            }
            listing.all.push(path);
        }
        listing
    }
}

fn disk_id_for(folder: &Path) -> DiskId {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    DiskId::from_folder_name(&name)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn record_failure(record: &mut DiskRecord, error: ApiError) {
    record_failure_note(record, error.to_string());
}

fn record_failure_note(record: &mut DiskRecord, note: String) {
    warn!(disk = %record.id, problem = %note, "Disk needs work");
    record.flag_needs_work(note);
}

/// Drop the manifest of a container that is gone or unreadable so its
/// hashes stop taking part in duplicate detection.
fn forget_container(record: &mut DiskRecord) {
    if record.manifest.container().is_none() && record.manifest.is_empty() {
        return;
    }
    record.manifest.clear();
    record.embedded_flux.clear();
    record.needs_duplicate_check = true;
}

fn find_description_file(files: &[PathBuf]) -> Option<PathBuf> {
    for pattern in DESCRIPTION_FILES {
        let found = files.iter().find(|path| {
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy(),
                None => return false,
            };
            match pattern.strip_suffix('*') {
                Some(prefix) => name.starts_with(prefix),
                None => name.as_ref() == *pattern,
            }
        });
        if let Some(path) = found {
            return Some(path.clone());
        }
    }
    None
}
