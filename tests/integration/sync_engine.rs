use crate::integration::support::{disk_folder, memory_context, FakeArchive};
use diskmuster::audit::AuditOutcome;
use diskmuster::concurrency::CancellationFlag;
use diskmuster::disk::SyncStatus;
use diskmuster::pipeline::SyncRequest;
use diskmuster::store::{DiskRepository, MemoryRepository};
use diskmuster::sync::{RemoteMetadata, SyncMode};
use diskmuster::types::DiskId;
use diskmuster::ApiError;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn checking_a_missing_item_ends_in_error_and_exits_partial() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    disk_folder(corpus.path(), "Lost Disk", &[("A", b"a")]);

    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(
        data.path(),
        repository.clone(),
        Arc::new(FakeArchive::default()),
        CancellationFlag::new(),
    );
    ctx.run_scan(corpus.path()).unwrap();

    let run = ctx.run_sync(&SyncRequest::default()).await.unwrap();
    assert_eq!(run.audit.outcome, AuditOutcome::Partial);
    assert_eq!(run.audit.counts.errored, 1);

    let record = repository.load(&DiskId::new("lost-disk")).unwrap().unwrap();
    assert_eq!(record.sync_status, SyncStatus::Error);
    assert_eq!(record.sync_notes, vec!["Item not found in remote archive"]);
}

#[tokio::test]
async fn pull_brings_an_out_of_sync_disk_in_sync() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    disk_folder(corpus.path(), "Victor BASIC", &[("BASIC.EXE", b"basic")]);

    let archive = Arc::new(FakeArchive::default());
    archive.items.lock().insert(
        "victor-basic".to_string(),
        RemoteMetadata {
            title: "Victor BASIC 1.1".into(),
            mediatype: "software".into(),
            creators: vec!["Microsoft".into()],
            subjects: vec!["Victor 9000".into(), "ACT Sirius 1".into()],
            collections: vec!["open_source_software".into()],
            ..Default::default()
        },
    );
    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(data.path(), repository.clone(), archive, CancellationFlag::new());
    ctx.run_scan(corpus.path()).unwrap();

    let request = SyncRequest {
        mode: SyncMode::Pull,
        ..Default::default()
    };
    let run = ctx.run_sync(&request).await.unwrap();
    assert_eq!(run.audit.outcome, AuditOutcome::Success);
    assert_eq!(run.audit.counts.sync_changed, 1);

    let record = repository.load(&DiskId::new("victor-basic")).unwrap().unwrap();
    assert_eq!(record.sync_status, SyncStatus::InSync);
    assert_eq!(record.title, "Victor BASIC 1.1");
    assert_eq!(record.metadata.creators, vec!["Microsoft"]);

    let recheck = ctx.run_sync(&SyncRequest::default()).await.unwrap();
    assert_eq!(recheck.audit.counts.sync_changed, 0);
}

#[tokio::test]
async fn push_uploads_ready_disks_and_confirms() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let folder = disk_folder(corpus.path(), "Ready Disk", &[("A", b"a")]);
    std::fs::write(folder.join("label.jpg"), b"jpeg").unwrap();
    disk_folder(corpus.path(), "Not Ready", &[("B", b"b")]);

    let archive = Arc::new(FakeArchive::default());
    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(data.path(), repository.clone(), archive.clone(), CancellationFlag::new());
    ctx.run_scan(corpus.path()).unwrap();
    ctx.set_upload_ready(&DiskId::new("ready-disk"), true).unwrap();

    let preview = ctx
        .run_sync(&SyncRequest {
            mode: SyncMode::Push,
            dry_run: true,
            identifier: Some(DiskId::new("ready-disk")),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(preview.report.items[0].outcomes.iter().any(|o| o.dry_run));
    assert!(archive.uploaded.lock().is_empty());
    let untouched = repository.load(&DiskId::new("ready-disk")).unwrap().unwrap();
    assert_eq!(untouched.sync_status, SyncStatus::NeverChecked);

    let request = SyncRequest {
        mode: SyncMode::Push,
        ..Default::default()
    };
    ctx.run_sync(&request).await.unwrap();

    let uploaded = archive.uploaded.lock().clone();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].0, "ready-disk");
    assert_eq!(uploaded[0].1, vec!["disk.zip", "label.jpg"]);

    let ready = repository.load(&DiskId::new("ready-disk")).unwrap().unwrap();
    assert_eq!(ready.sync_status, SyncStatus::InSync);
    assert!(ready.last_archive_sync.is_some());
    let idle = repository.load(&DiskId::new("not-ready")).unwrap().unwrap();
    assert_eq!(idle.sync_status, SyncStatus::Error);
}

#[tokio::test]
async fn an_unknown_identifier_fails_the_run() {
    let data = TempDir::new().unwrap();
    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(
        data.path(),
        repository.clone(),
        Arc::new(FakeArchive::default()),
        CancellationFlag::new(),
    );

    let request = SyncRequest {
        identifier: Some(DiskId::new("nope")),
        ..Default::default()
    };
    let result = ctx.run_sync(&request).await;
    assert!(matches!(result, Err(ApiError::DiskNotFound(_))));
    assert_eq!(
        repository.load_audit().unwrap()[0].outcome,
        AuditOutcome::Failed
    );
}
