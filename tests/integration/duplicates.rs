use crate::integration::support::{disk_folder, memory_context, write_zip, FakeArchive};
use diskmuster::concurrency::CancellationFlag;
use diskmuster::duplicates::RelationKind;
use diskmuster::pipeline::DuplicateRequest;
use diskmuster::store::{DiskRepository, MemoryRepository};
use diskmuster::types::DiskId;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn identical_content_under_different_paths_is_one_exact_relation() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    disk_folder(
        corpus.path(),
        "Wordstar Master",
        &[("WS.COM", b"h1"), ("WSMSGS.OVR", b"h2"), ("INSTALL.COM", b"h3")],
    );
    disk_folder(
        corpus.path(),
        "Wordstar Backup",
        &[("BACKUP/INSTALL.COM", b"h3"), ("BACKUP/WS.COM", b"h1"), ("BACKUP/MSGS.OVR", b"h2")],
    );

    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(
        data.path(),
        repository.clone(),
        Arc::new(FakeArchive::default()),
        CancellationFlag::new(),
    );
    ctx.run_scan(corpus.path()).unwrap();

    let run = ctx.run_find_duplicates(&DuplicateRequest::default()).unwrap();
    assert_eq!(run.report.exact, 1);
    assert_eq!(run.report.partial, 0);
    assert_eq!(run.audit.counts.duplicates_found, 1);

    let relations = repository.load_relations().unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].kind, RelationKind::Exact);
    assert!(repository
        .load_all()
        .unwrap()
        .iter()
        .all(|r| !r.needs_duplicate_check));

    // Reentrant: nothing new on a second pass.
    let again = ctx.run_find_duplicates(&DuplicateRequest::default()).unwrap();
    assert!(again.report.added.is_empty());
    assert_eq!(again.report.unchanged, 1);
    assert_eq!(repository.load_relations().unwrap().len(), 1);
}

#[test]
fn a_subset_disk_is_the_first_side_of_a_partial_relation() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    disk_folder(corpus.path(), "Small", &[("A", b"h1"), ("B", b"h2")]);
    disk_folder(corpus.path(), "Large", &[("A", b"h1"), ("B", b"h2"), ("C", b"h3")]);
    disk_folder(corpus.path(), "Other", &[("Z", b"unrelated")]);

    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(
        data.path(),
        repository.clone(),
        Arc::new(FakeArchive::default()),
        CancellationFlag::new(),
    );
    ctx.run_scan(corpus.path()).unwrap();
    ctx.run_find_duplicates(&DuplicateRequest::default()).unwrap();

    let relations = repository.load_relations().unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].kind, RelationKind::Partial);
    assert_eq!(relations[0].first, DiskId::new("small"));
    assert_eq!(relations[0].second, DiskId::new("large"));
}

#[test]
fn changed_content_removes_a_stale_relation() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    disk_folder(corpus.path(), "Left", &[("A", b"h1")]);
    let right = disk_folder(corpus.path(), "Right", &[("A", b"h1")]);

    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(
        data.path(),
        repository.clone(),
        Arc::new(FakeArchive::default()),
        CancellationFlag::new(),
    );
    ctx.run_scan(corpus.path()).unwrap();
    ctx.run_find_duplicates(&DuplicateRequest::default()).unwrap();
    assert_eq!(repository.load_relations().unwrap().len(), 1);

    // Different size, so the fingerprint changes regardless of mtime resolution.
    write_zip(&right.join("disk.zip"), &[("A", b"a completely different file")]);
    let rescan = ctx.run_scan(corpus.path()).unwrap();
    assert_eq!(rescan.audit.counts.updated, 1);

    let preview = ctx
        .run_find_duplicates(&DuplicateRequest {
            dry_run: true,
            ..Default::default()
        }).unwrap();
    assert_eq!(preview.report.removed.len(), 1);
    assert_eq!(repository.load_relations().unwrap().len(), 1);

    let run = ctx.run_find_duplicates(&DuplicateRequest::default()).unwrap();
    assert_eq!(run.report.removed.len(), 1);
    assert!(repository.load_relations().unwrap().is_empty());
}

#[test]
fn a_disk_whose_container_disappears_loses_its_relations() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    disk_folder(corpus.path(), "Original", &[("A", b"h1"), ("B", b"h2")]);
    let copy = disk_folder(corpus.path(), "Copy", &[("A", b"h1"), ("B", b"h2")]);

    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(
        data.path(),
        repository.clone(),
        Arc::new(FakeArchive::default()),
        CancellationFlag::new(),
    );
    ctx.run_scan(corpus.path()).unwrap();
    ctx.run_find_duplicates(&DuplicateRequest::default()).unwrap();
    assert_eq!(repository.load_relations().unwrap().len(), 1);

    std::fs::remove_file(copy.join("disk.zip")).unwrap();
    ctx.run_scan(corpus.path()).unwrap();
    let stale = repository.load(&DiskId::new("copy")).unwrap().unwrap();
    assert!(stale.needs_work);
    assert!(stale.hash_set().is_empty());
    assert!(stale.needs_duplicate_check);

    let run = ctx.run_find_duplicates(&DuplicateRequest::default()).unwrap();
    assert_eq!(run.report.removed.len(), 1);
    assert_eq!(run.report.participants, 1);
    assert!(repository.load_relations().unwrap().is_empty());
}

#[test]
fn clearing_for_one_identifier_leaves_other_relations_alone() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    disk_folder(corpus.path(), "Alpha", &[("A", b"h1")]);
    disk_folder(corpus.path(), "Alpha Copy", &[("A", b"h1")]);
    disk_folder(corpus.path(), "Beta", &[("B", b"h9")]);
    disk_folder(corpus.path(), "Beta Copy", &[("B", b"h9")]);

    let repository = Arc::new(MemoryRepository::new());
    let ctx = memory_context(
        data.path(),
        repository.clone(),
        Arc::new(FakeArchive::default()),
        CancellationFlag::new(),
    );
    ctx.run_scan(corpus.path()).unwrap();
    ctx.run_find_duplicates(&DuplicateRequest::default()).unwrap();
    let before = repository.load_relations().unwrap();
    assert_eq!(before.len(), 2);

    let run = ctx
        .run_find_duplicates(&DuplicateRequest {
            clear: true,
            identifier: Some(DiskId::new("alpha")),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(run.report.cleared, 1);
    assert_eq!(run.report.added.len(), 1);
    assert!(run.audit.notes.iter().any(|n| n.contains("Cleared 1 stored relation")));

    let after = repository.load_relations().unwrap();
    assert_eq!(after.len(), 2);
    let beta = after
        .iter()
        .find(|r| r.involves(&DiskId::new("beta")))
        .unwrap();
    assert!(before.contains(beta));
}
