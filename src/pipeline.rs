//! Pipeline runs
//!
//! `PipelineContext` carries everything a run needs: the repository, the
//! remote archive client, the run lock, the cancellation flag and the hashing
//! pool. Each run appends exactly one audit entry, including runs that abort.

use crate::audit::{AuditEntry, AuditRecorder};
use crate::concurrency::{CancellationFlag, HashingPool, RunLock};
use crate::config::MusterConfig;
use crate::disk::{DiskRecord, SyncStatus};
use crate::duplicates::{DetectionReport, DuplicateDetector};
use crate::error::ApiError;
use crate::scan::{predicate_for, FilesystemScanner, ScanReport};
use crate::store::{DiskRepository, SledDiskRepository};
use crate::sync::{
    recover_transient, ArchiveClient, ArchiveSyncEngine, InternetArchiveClient, SyncItem,
    SyncMode,
};
use crate::types::DiskId;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A finished run: its report plus the audit entry that was appended.
#[derive(Debug)]
pub struct PipelineRun<T> {
    pub report: T,
    pub audit: AuditEntry,
}

/// Which disks a sync run visits when no identifier is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncFilter {
    #[default]
    All,
    /// Disks whose last check found differences
    OutOfSyncOnly,
    /// Disks with a known archive item
    UploadedOnly,
}

impl SyncFilter {
    pub fn admits(&self, record: &DiskRecord) -> bool {
        match self {
            SyncFilter::All => true,
            SyncFilter::OutOfSyncOnly => record.sync_status == SyncStatus::OutOfSync,
            SyncFilter::UploadedOnly => record.is_uploaded(),
        }
    }
}

/// What `run_sync` should do.
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub mode: SyncMode,
    pub dry_run: bool,
    /// Restrict the run to one disk; takes precedence over `filter`
    pub identifier: Option<DiskId>,
    pub filter: SyncFilter,
}

/// What `run_find_duplicates` should do.
#[derive(Debug, Clone, Default)]
pub struct DuplicateRequest {
    pub dry_run: bool,
    /// Drop stored relations before detecting
    pub clear: bool,
    /// Reconcile only relations involving this disk
    pub identifier: Option<DiskId>,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub items: Vec<SyncItem>,
    pub interrupted: bool,
    pub dry_run: bool,
}

pub struct PipelineContext {
    repository: Arc<dyn DiskRepository>,
    client: Arc<dyn ArchiveClient>,
    lock: RunLock,
    cancel: CancellationFlag,
    pool: HashingPool,
    config: MusterConfig,
    /// Noted in the first audit entry of this context
    lock_note: Mutex<Option<String>>,
}

impl PipelineContext {
    /// Take the run lock in the data directory, then open the sled store.
    ///
    /// Fails with `ConcurrentRunDetected` before the store is opened if another
    /// run holds the lock.
    pub fn open(config: MusterConfig, cancel: CancellationFlag) -> Result<Self, ApiError> {
        let lock = RunLock::acquire(&config.storage.resolve_data_dir()?)?;
        Self::open_locked(config, cancel, lock)
    }

    /// Like `open`, but moves any existing run lock aside first.
    pub fn open_force_unlock(config: MusterConfig, cancel: CancellationFlag) -> Result<Self, ApiError> {
        let lock = RunLock::acquire_forced(&config.storage.resolve_data_dir()?)?;
        Self::open_locked(config, cancel, lock)
    }

    fn open_locked(config: MusterConfig, cancel: CancellationFlag, lock: RunLock) -> Result<Self, ApiError> {
        let repository = Arc::new(SledDiskRepository::open(&config.storage.store_path()?)?);
        let client = Arc::new(InternetArchiveClient::from_config(&config.archive)?);
        Self::with_parts(config, repository, client, lock, cancel)
    }

    /// Assemble a context from already-built parts.
    pub fn with_parts(
        config: MusterConfig,
        repository: Arc<dyn DiskRepository>,
        client: Arc<dyn ArchiveClient>,
        lock: RunLock,
        cancel: CancellationFlag,
    ) -> Result<Self, ApiError> {
        let pool = HashingPool::new(config.scan.hashing_workers)?;
        let lock_note = Mutex::new(lock.replaced().map(|r| r.describe()));
        Ok(Self {
            repository,
            client,
            lock,
            cancel,
            pool,
            config,
            lock_note,
        })
    }

    pub fn repository(&self) -> &dyn DiskRepository {
        self.repository.as_ref()
    }

    pub fn config(&self) -> &MusterConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    pub fn run_token(&self) -> &str {
        self.lock.token()
    }

    fn recorder(&self, command: &str) -> AuditRecorder {
        let mut audit = AuditRecorder::start(self.lock.token(), command);
        if let Some(note) = self.lock_note.lock().take() {
            audit.note(note);
        }
        audit
    }

    /// Append the audit entry for a run, whatever its result.
    fn seal<T>(
        &self,
        audit: AuditRecorder,
        result: Result<T, ApiError>,
    ) -> Result<PipelineRun<T>, ApiError> {
        match result {
            Ok(report) => {
                let entry = audit.finish();
                self.repository.append_audit(&entry)?;
                info!(run = %entry.run_id, command = %entry.command, outcome = %entry.outcome, "Run finished");
                Ok(PipelineRun {
                    report,
                    audit: entry,
                })
            }
            Err(e) => {
                let entry = audit.fail(&e);
                if let Err(audit_err) = self.repository.append_audit(&entry) {
                    warn!(error = %audit_err, "Failed to record aborted run");
                }
                Err(e)
            }
        }
    }

    /// Reset sync states a previous run left in `Checking`.
    fn recover_stale(&self, audit: &mut AuditRecorder) -> Result<usize, ApiError> {
        let mut recovered = 0;
        for mut record in self.repository.load_all()? {
            if recover_transient(&mut record) {
                self.repository.save(&record)?;
                recovered += 1;
            }
        }
        if recovered > 0 {
            audit.note(format!("Recovered {} disk(s) left in checking", recovered));
        }
        Ok(recovered)
    }

    pub fn run_scan(&self, root: &Path) -> Result<PipelineRun<ScanReport>, ApiError> {
        let mut audit = self.recorder("scan");
        audit.input("root", root.display());
        let result = self.scan_inner(root, &mut audit);
        self.seal(audit, result)
    }

    fn scan_inner(&self, root: &Path, audit: &mut AuditRecorder) -> Result<ScanReport, ApiError> {
        let scanner = FilesystemScanner::new(
            root,
            predicate_for(&self.config.scan),
            self.config.scan.clone(),
            self.pool.clone(),
        )?;
        audit.input("predicate", scanner.predicate().describe());
        self.recover_stale(audit)?;

        let report = scanner.scan(self.repository.as_ref(), &self.cancel)?;
        audit.counts_mut().absorb(&report.counts);
        for disk in report.disks.iter().filter(|d| !d.errors.is_empty()) {
            audit.note(format!("{}: {}", disk.id, disk.errors.join("; ")));
        }
        if report.interrupted {
            audit.mark_interrupted();
        }
        Ok(report)
    }

    pub fn run_find_duplicates(
        &self,
        request: &DuplicateRequest,
    ) -> Result<PipelineRun<DetectionReport>, ApiError> {
        let mut audit = self.recorder("find-duplicates");
        audit.input("dry_run", request.dry_run);
        audit.input("clear", request.clear);
        if let Some(id) = &request.identifier {
            audit.input("identifier", id);
        }
        let result = self.find_duplicates_inner(request, &mut audit);
        self.seal(audit, result)
    }

    fn find_duplicates_inner(
        &self,
        request: &DuplicateRequest,
        audit: &mut AuditRecorder,
    ) -> Result<DetectionReport, ApiError> {
        self.recover_stale(audit)?;
        let records = self.repository.load_all()?;
        if let Some(id) = &request.identifier {
            if !records.iter().any(|r| r.id == *id) {
                return Err(ApiError::DiskNotFound(id.to_string()));
            }
        }
        let report = DuplicateDetector::new()
            .with_dry_run(request.dry_run)
            .with_clear(request.clear)
            .with_focus(request.identifier.clone())
            .run(&records, self.repository.as_ref())?;
        self.repository.flush()?;

        if report.cleared > 0 {
            let verb = if request.dry_run { "Would clear" } else { "Cleared" };
            audit.note(format!("{} {} stored relation(s)", verb, report.cleared));
        }
        let counts = audit.counts_mut();
        counts.scanned = records.len();
        counts.duplicates_found = report.total();
        Ok(report)
    }

    pub async fn run_sync(&self, request: &SyncRequest) -> Result<PipelineRun<SyncReport>, ApiError> {
        let mut audit = self.recorder("sync-check");
        audit.input("mode", format!("{:?}", request.mode));
        audit.input("dry_run", request.dry_run);
        if let Some(id) = &request.identifier {
            audit.input("identifier", id);
        } else if request.filter != SyncFilter::All {
            audit.input("filter", format!("{:?}", request.filter));
        }
        let result = self.sync_inner(request, &mut audit).await;
        self.seal(audit, result)
    }

    async fn sync_inner(
        &self,
        request: &SyncRequest,
        audit: &mut AuditRecorder,
    ) -> Result<SyncReport, ApiError> {
        self.recover_stale(audit)?;
        let records = match &request.identifier {
            Some(id) => vec![self
                .repository
                .load(id)?
                .ok_or_else(|| ApiError::DiskNotFound(id.to_string()))?],
            None => self
                .repository
                .load_all()?
                .into_iter()
                .filter(|r| request.filter.admits(r))
                .collect(),
        };

        let engine = ArchiveSyncEngine::from_config(self.client.clone(), &self.config.archive)
            .with_dry_run(request.dry_run);
        let items = engine.run_batch(records, request.mode, &self.cancel).await;

        let mut report = SyncReport {
            dry_run: request.dry_run,
            ..Default::default()
        };
        for item in &items {
            if item.skipped {
                report.interrupted = true;
                continue;
            }
            if !request.dry_run {
                self.repository.save(&item.record)?;
            }
            let counts = audit.counts_mut();
            counts.scanned += 1;
            if item.changed() {
                counts.sync_changed += 1;
            }
            if item.errored() {
                counts.errored += 1;
                let reason = match &item.error {
                    Some(e) => e.to_string(),
                    None => item.record.sync_notes.join("; "),
                };
                audit.note(format!("{}: {}", item.record.id, reason));
            }
        }
        self.repository.flush()?;

        if report.interrupted {
            audit.mark_interrupted();
        }
        report.items = items;
        Ok(report)
    }

    /// Mark a disk ready (or not) for upload.
    pub fn set_upload_ready(&self, id: &DiskId, ready: bool) -> Result<PipelineRun<DiskRecord>, ApiError> {
        let mut audit = self.recorder("ready");
        audit.input("identifier", id);
        audit.input("ready", ready);
        let result = self.set_upload_ready_inner(id, ready, &mut audit);
        self.seal(audit, result)
    }

    fn set_upload_ready_inner(
        &self,
        id: &DiskId,
        ready: bool,
        audit: &mut AuditRecorder,
    ) -> Result<DiskRecord, ApiError> {
        let mut record = self
            .repository
            .load(id)?
            .ok_or_else(|| ApiError::DiskNotFound(id.to_string()))?;
        audit.counts_mut().scanned = 1;
        if record.upload_ready != ready {
            record.upload_ready = ready;
            record.touch();
            self.repository.save(&record)?;
            self.repository.flush()?;
            audit.counts_mut().updated = 1;
        }
        Ok(record)
    }

    /// The most recent `limit` audit entries, oldest first.
    pub fn audit_log(&self, limit: Option<usize>) -> Result<Vec<AuditEntry>, ApiError> {
        let mut entries = self.repository.load_audit()?;
        if let Some(limit) = limit {
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
        }
        Ok(entries)
    }
}
