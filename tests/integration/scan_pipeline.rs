use crate::integration::support::{disk_folder, memory_context, test_config, write_zip, FakeArchive};
use diskmuster::audit::{AuditOutcome, AuditRecorder};
use diskmuster::concurrency::{CancellationFlag, HashingPool, RunLock};
use diskmuster::pipeline::PipelineContext;
use diskmuster::scan::{AllSubfolders, FilesystemScanner};
use diskmuster::store::{DiskRepository, MemoryRepository};
use diskmuster::types::DiskId;
use diskmuster::ApiError;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn rescanning_an_unchanged_corpus_changes_nothing() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    disk_folder(corpus.path(), "Victor Utilities", &[("UTIL.COM", b"util"), ("README", b"hi")]);
    disk_folder(corpus.path(), "Victor BASIC", &[("BASIC.EXE", b"basic")]);

    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(
        data.path(),
        repository.clone(),
        Arc::new(FakeArchive::default()),
        CancellationFlag::new(),
    );

    let first = ctx.run_scan(corpus.path()).unwrap();
    assert_eq!(first.audit.counts.created, 2);
    assert_eq!(first.audit.outcome, AuditOutcome::Success);
    let before = repository.load_all().unwrap();

    let second = ctx.run_scan(corpus.path()).unwrap();
    assert_eq!(second.audit.counts.scanned, 2);
    assert_eq!(second.audit.counts.created, 0);
    assert_eq!(second.audit.counts.updated, 0);
    assert!(second.report.disks.iter().all(|d| !d.reindexed));
    assert_eq!(repository.load_all().unwrap(), before);

    let utilities = repository
        .load(&DiskId::new("victor-utilities"))
        .unwrap()
        .unwrap();
    let paths: Vec<_> = utilities
        .manifest
        .entries()
        .iter()
        .map(|e| e.path.as_str())
        .collect();
    assert_eq!(paths, vec!["UTIL.COM", "README"]);
    assert_eq!(repository.load_audit().unwrap().len(), 2);
}

#[test]
fn a_bad_disk_is_recorded_and_the_scan_continues() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let bad = disk_folder(corpus.path(), "Two Zips", &[("A", b"a")]);
    write_zip(&bad.join("second.zip"), &[("B", b"b")]);
    let broken = corpus.path().join("Broken");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("disk.zip"), b"this is not a zip file").unwrap();
    disk_folder(corpus.path(), "Good", &[("G", b"g")]);

    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(
        data.path(),
        repository.clone(),
        Arc::new(FakeArchive::default()),
        CancellationFlag::new(),
    );

    let run = ctx.run_scan(corpus.path()).unwrap();
    assert_eq!(run.audit.counts.scanned, 3);
    assert_eq!(run.audit.counts.errored, 2);
    assert_eq!(run.audit.outcome, AuditOutcome::Partial);

    let two = repository.load(&DiskId::new("two-zips")).unwrap().unwrap();
    assert!(two.needs_work);
    assert!(two.manifest.is_empty());
    let broken = repository.load(&DiskId::new("broken")).unwrap().unwrap();
    assert!(broken.needs_work);
    assert!(broken.work_notes[0].contains("Container corrupt"));
    let good = repository.load(&DiskId::new("good")).unwrap().unwrap();
    assert!(!good.needs_work);
    assert_eq!(good.manifest.len(), 1);
}

#[test]
fn a_pre_cancelled_scan_is_partial_and_touches_nothing() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    disk_folder(corpus.path(), "One", &[("A", b"a")]);

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(data.path(), repository.clone(), Arc::new(FakeArchive::default()), cancel);

    let run = ctx.run_scan(corpus.path()).unwrap();
    assert!(run.report.interrupted);
    assert_eq!(run.audit.outcome, AuditOutcome::Partial);
    assert!(repository.load_all().unwrap().is_empty());
}

#[test]
fn interrupting_mid_corpus_keeps_saved_disks_whole() {
    let corpus = TempDir::new().unwrap();
    for name in ["Alpha", "Bravo", "Charlie"] {
        disk_folder(corpus.path(), name, &[("ONE", name.as_bytes()), ("TWO", b"shared")]);
    }

    let repository = MemoryRepository::new();
    let cancel = CancellationFlag::new();
    let trip = cancel.clone();
    let scanner = FilesystemScanner::new(
        corpus.path(),
        Box::new(AllSubfolders),
        test_config(corpus.path()).scan,
        HashingPool::new(2).unwrap(),
    )
    .unwrap()
    .with_progress(move |_| trip.cancel());

    let report = scanner.scan(&repository, &cancel).unwrap();
    assert!(report.interrupted);
    assert_eq!(report.disks.len(), 1);

    let saved = repository.load_all().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id.as_str(), "alpha");
    assert_eq!(saved[0].manifest.len(), 2);

    let mut audit = AuditRecorder::start("run", "scan");
    audit.counts_mut().absorb(&report.counts);
    if report.interrupted {
        audit.mark_interrupted();
    }
    assert_eq!(audit.finish().outcome, AuditOutcome::Partial);
}

#[test]
fn a_second_run_is_rejected_before_opening_the_store() {
    let data = TempDir::new().unwrap();
    let _held = RunLock::acquire(data.path()).unwrap();

    let result = PipelineContext::open(test_config(data.path()), CancellationFlag::new());
    assert!(matches!(result, Err(ApiError::ConcurrentRunDetected(_))));
    assert!(!data.path().join("store").exists());
}

#[test]
fn sled_store_survives_between_runs() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    disk_folder(corpus.path(), "Persisted", &[("P", b"p")]);

    {
        let ctx = PipelineContext::open(test_config(data.path()), CancellationFlag::new()).unwrap();
        ctx.run_scan(corpus.path()).unwrap();
    }

    let ctx = PipelineContext::open(test_config(data.path()), CancellationFlag::new()).unwrap();
    let record = ctx
        .repository()
        .load(&DiskId::new("persisted"))
        .unwrap()
        .unwrap();
    assert_eq!(record.manifest.len(), 1);
    let rescan = ctx.run_scan(corpus.path()).unwrap();
    assert_eq!(rescan.audit.counts.created, 0);
    assert_eq!(ctx.audit_log(None).unwrap().len(), 2);
}
