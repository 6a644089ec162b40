//! Archive sync state machine
//!
//! `check` observes the remote item and never mutates it. `pull` and `push`
//! are only valid once a check has found the disk out of sync. `Checking` is
//! only ever held across an in-flight remote call.

use crate::concurrency::CancellationFlag;
use crate::config::ArchiveConfig;
use crate::disk::{DiskRecord, SyncStatus};
use crate::error::ApiError;
use crate::sync::client::{ArchiveClient, ContentProvider, FolderContent, UploadReceipt};
use crate::sync::limiter::RemoteRateLimiter;
use crate::sync::metadata::RemoteMetadata;
use crate::sync::retry::RetryPolicy;
use crate::types::DiskId;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Check,
    Pull,
    Push,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Check => "check",
            SyncOperation::Pull => "pull",
            SyncOperation::Push => "push",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a batch does after checking each disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    CheckOnly,
    /// Archive is the source of truth for out-of-sync disks
    Pull,
    /// Local record is the source of truth for upload-ready disks
    Push,
}

/// The transition one operation made, or would make under dry-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub id: DiskId,
    pub operation: SyncOperation,
    pub from: SyncStatus,
    pub to: SyncStatus,
    pub notes: Vec<String>,
    pub dry_run: bool,
}

impl SyncOutcome {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// One disk's result within a batch.
#[derive(Debug)]
pub struct SyncItem {
    pub record: DiskRecord,
    pub outcomes: Vec<SyncOutcome>,
    pub error: Option<ApiError>,
    /// Not started because the run was cancelled
    pub skipped: bool,
}

impl SyncItem {
    pub fn changed(&self) -> bool {
        self.outcomes.iter().any(SyncOutcome::changed)
    }

    pub fn errored(&self) -> bool {
        self.error.is_some() || self.record.sync_status == SyncStatus::Error
    }
}

/// Reset a `Checking` status left behind by an interrupted run.
pub fn recover_transient(record: &mut DiskRecord) -> bool {
    if !record.sync_status.is_transient() {
        return false;
    }
    warn!(disk = %record.id, "Recovering sync status left in checking");
    record.sync_status = SyncStatus::NeverChecked;
    record
        .sync_notes
        .push("Previous sync was interrupted; check again".to_string());
    true
}

fn invalid(operation: &'static str, from: SyncStatus) -> ApiError {
    ApiError::InvalidTransition {
        operation,
        from: from.to_string(),
    }
}

pub struct ArchiveSyncEngine {
    client: Arc<dyn ArchiveClient>,
    limiter: RemoteRateLimiter,
    retry: RetryPolicy,
    dry_run: bool,
}

impl ArchiveSyncEngine {
    pub fn new(client: Arc<dyn ArchiveClient>, limiter: RemoteRateLimiter, retry: RetryPolicy) -> Self {
        Self {
            client,
            limiter,
            retry,
            dry_run: false,
        }
    }

    pub fn from_config(client: Arc<dyn ArchiveClient>, config: &ArchiveConfig) -> Self {
        Self::new(
            client,
            RemoteRateLimiter::new(config.network_workers, config.rate_limit_ms),
            RetryPolicy::from_config(config),
        )
    }

    /// Suppress remote mutation and local changes for pull and push.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn fetch(&self, identifier: &str) -> Result<RemoteMetadata, ApiError> {
        let client = &self.client;
        let limiter = &self.limiter;
        self.retry
            .run("fetch_metadata", move || async move {
                let _permit = limiter.acquire().await?;
                client.fetch_metadata(identifier).await
            })
            .await
    }

    async fn exists(&self, identifier: &str) -> Result<bool, ApiError> {
        let client = &self.client;
        let limiter = &self.limiter;
        self.retry
            .run("exists", move || async move {
                let _permit = limiter.acquire().await?;
                client.exists(identifier).await
            })
            .await
    }

    async fn upload(
        &self,
        identifier: &str,
        content: &dyn ContentProvider,
        metadata: &RemoteMetadata,
    ) -> Result<UploadReceipt, ApiError> {
        let client = &self.client;
        let limiter = &self.limiter;
        self.retry
            .run("upload", move || async move {
                let _permit = limiter.acquire().await?;
                client.upload(identifier, content, metadata).await
            })
            .await
    }

    fn outcome(
        &self,
        record: &DiskRecord,
        operation: SyncOperation,
        from: SyncStatus,
        to: SyncStatus,
        notes: Vec<String>,
        dry_run: bool,
    ) -> SyncOutcome {
        SyncOutcome {
            id: record.id.clone(),
            operation,
            from,
            to,
            notes,
            dry_run,
        }
    }

    fn settle(record: &mut DiskRecord, to: SyncStatus, notes: Vec<String>) {
        record.sync_status = to;
        record.sync_notes = notes;
        record.last_sync_check = Some(Utc::now());
        record.touch();
    }

    /// Compare local metadata with the remote item.
    ///
    /// Remote failures are recorded as the `Error` state rather than returned;
    /// only a disk already being checked is rejected.
    pub async fn check(&self, record: &mut DiskRecord) -> Result<SyncOutcome, ApiError> {
        let from = record.sync_status;
        if from == SyncStatus::Checking {
            return Err(invalid("check", from));
        }

        record.sync_status = SyncStatus::Checking;
        let local = RemoteMetadata::from_record(record);
        let fetched = self.fetch(record.id.as_str()).await;
        record.remote_missing = matches!(fetched, Err(ApiError::RemoteNotFound(_)));

        let (to, notes) = match fetched {
            Ok(remote) => {
                let diffs = local.differences(&remote);
                if diffs.is_empty() {
                    (SyncStatus::InSync, Vec::new())
                } else {
                    (SyncStatus::OutOfSync, diffs)
                }
            }
            Err(ApiError::RemoteNotFound(_)) => (
                SyncStatus::Error,
                vec!["Item not found in remote archive".to_string()],
            ),
            Err(e) => (SyncStatus::Error, vec![format!("Check failed: {}", e)]),
        };

        Self::settle(record, to, notes.clone());
        debug!(disk = %record.id, from = %from, to = %to, "Checked sync status");
        Ok(self.outcome(record, SyncOperation::Check, from, to, notes, false))
    }

    /// Copy remote metadata into the local record.
    pub async fn pull(&self, record: &mut DiskRecord) -> Result<SyncOutcome, ApiError> {
        let from = record.sync_status;
        if from != SyncStatus::OutOfSync {
            return Err(invalid("pull", from));
        }

        let remote = match self.fetch(record.id.as_str()).await {
            Ok(remote) => remote,
            Err(e) => {
                if !self.dry_run {
                    let note = match &e {
                        ApiError::RemoteNotFound(_) => "Item not found in remote archive".to_string(),
                        other => format!("Pull failed: {}", other),
                    };
                    record.remote_missing = matches!(e, ApiError::RemoteNotFound(_));
                    Self::settle(record, SyncStatus::Error, vec![note]);
                }
                warn!(disk = %record.id, error = %e, "Pull failed");
                return Err(e);
            }
        };

        if self.dry_run {
            let mut preview = record.clone();
            let changes = remote.apply_to(&mut preview);
            return Ok(self.outcome(
                record,
                SyncOperation::Pull,
                from,
                SyncStatus::InSync,
                changes,
                true,
            ));
        }

        let changes = remote.apply_to(record);
        Self::settle(record, SyncStatus::InSync, changes.clone());
        record.last_archive_sync = Some(Utc::now());
        info!(disk = %record.id, changes = changes.len(), "Pulled metadata from archive");
        Ok(self.outcome(
            record,
            SyncOperation::Pull,
            from,
            SyncStatus::InSync,
            changes,
            false,
        ))
    }

    /// Upload the container, photos and metadata, then confirm by re-fetching.
    ///
    /// Valid from `OutOfSync`, or from `Error` when the last check found no
    /// remote item yet. The record only reaches `InSync` once the remote
    /// metadata matches.
    pub async fn push(&self, record: &mut DiskRecord) -> Result<SyncOutcome, ApiError> {
        if !record.upload_ready {
            return Err(ApiError::NotUploadReady(record.id.to_string()));
        }
        let from = record.sync_status;
        let creating = from == SyncStatus::Error && record.remote_missing;
        if from != SyncStatus::OutOfSync && !creating {
            return Err(invalid("push", from));
        }

        let metadata = RemoteMetadata::from_record(record);
        let content = FolderContent::from_record(record);

        if self.dry_run {
            let files = content.files();
            let target = match self.exists(record.id.as_str()).await {
                Ok(true) => "Would update the existing item".to_string(),
                Ok(false) => "Would create the item".to_string(),
                Err(e) => format!("Item state unknown: {}", e),
            };
            let mut notes = vec![target, format!("Would upload {} file(s)", files.len())];
            notes.extend(files.iter().map(|f| format!("  {}", f.name)));
            notes.push(format!("Title: {}", metadata.title));
            return Ok(self.outcome(
                record,
                SyncOperation::Push,
                from,
                SyncStatus::InSync,
                notes,
                true,
            ));
        }

        record.sync_status = SyncStatus::Checking;
        let receipt = match self.upload(record.id.as_str(), &content, &metadata).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(disk = %record.id, error = %e, "Upload failed");
                Self::settle(
                    record,
                    SyncStatus::Error,
                    vec![format!("Upload failed: {}", e)],
                );
                return Err(e);
            }
        };

        let (to, notes) = match self.fetch(record.id.as_str()).await {
            Ok(remote) => {
                let diffs = metadata.differences(&remote);
                if diffs.is_empty() {
                    (
                        SyncStatus::InSync,
                        vec![format!(
                            "Uploaded {} file(s), {} bytes",
                            receipt.files.len(),
                            receipt.bytes
                        )],
                    )
                } else {
                    (SyncStatus::OutOfSync, diffs)
                }
            }
            Err(e) => (
                SyncStatus::OutOfSync,
                vec![format!("Upload not yet confirmed: {}", e)],
            ),
        };

        record.remote_missing = false;
        Self::settle(record, to, notes.clone());
        if to == SyncStatus::InSync {
            record.last_archive_sync = Some(Utc::now());
        }
        info!(disk = %record.id, to = %to, "Pushed disk to archive");
        Ok(self.outcome(record, SyncOperation::Push, from, to, notes, false))
    }

    async fn sync_one(
        &self,
        mut record: DiskRecord,
        mode: SyncMode,
        cancel: &CancellationFlag,
    ) -> SyncItem {
        if cancel.is_cancelled() {
            return SyncItem {
                record,
                outcomes: Vec::new(),
                error: None,
                skipped: true,
            };
        }

        let mut outcomes = Vec::new();
        let mut error = None;

        match self.check(&mut record).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error = Some(e),
        }

        if error.is_none() {
            let follow_up = match mode {
                SyncMode::Pull if record.sync_status == SyncStatus::OutOfSync => {
                    Some(self.pull(&mut record).await)
                }
                SyncMode::Push
                    if record.upload_ready
                        && (record.sync_status == SyncStatus::OutOfSync
                            || (record.sync_status == SyncStatus::Error
                                && record.remote_missing)) =>
                {
                    Some(self.push(&mut record).await)
                }
                _ => None,
            };
            match follow_up {
                Some(Ok(outcome)) => outcomes.push(outcome),
                Some(Err(e)) => error = Some(e),
                None => {}
            }
        }

        SyncItem {
            record,
            outcomes,
            error,
            skipped: false,
        }
    }

    /// Check every record, then pull or push as `mode` asks, with at most
    /// `network_workers` disks in flight. Results come back in id order.
    pub async fn run_batch(
        &self,
        records: Vec<DiskRecord>,
        mode: SyncMode,
        cancel: &CancellationFlag,
    ) -> Vec<SyncItem> {
        let workers = self.limiter.workers();
        let mut items: Vec<SyncItem> = stream::iter(records)
            .map(|record| self.sync_one(record, mode, cancel))
            .buffer_unordered(workers)
            .collect()
            .await;
        items.sort_by(|a, b| a.record.id.cmp(&b.record.id));
        items
    }
}
