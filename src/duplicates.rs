//! Duplicate Detection
//!
//! Compares content-hash sets across the corpus. Exact duplicates are bucketed
//! by a fingerprint of the sorted set; partial duplicates are found through an
//! inverted hash index so only records sharing a hash are ever compared.
//! Relations are rebuilt from scratch on every run and reconciled against the
//! stored ones by unordered pair key.

use crate::content::manifest::set_fingerprint;
use crate::disk::DiskRecord;
use crate::error::ApiError;
use crate::store::DiskRepository;
use crate::types::{ContentHash, DiskId, Hash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationKind {
    /// Equal hash sets
    Exact,
    /// `first`'s hash set is a proper subset of `second`'s
    Partial,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Exact => f.write_str("exact"),
            RelationKind::Partial => f.write_str("partial"),
        }
    }
}

/// Order-independent identity of a pair of disks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    low: DiskId,
    high: DiskId,
}

impl PairKey {
    /// `None` for a self-pair.
    pub fn new(a: &DiskId, b: &DiskId) -> Option<Self> {
        match a.cmp(b) {
            std::cmp::Ordering::Less => Some(Self {
                low: a.clone(),
                high: b.clone(),
            }),
            std::cmp::Ordering::Greater => Some(Self {
                low: b.clone(),
                high: a.clone(),
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> &DiskId {
        &self.low
    }

    pub fn high(&self) -> &DiskId {
        &self.high
    }

    pub fn contains(&self, id: &DiskId) -> bool {
        &self.low == id || &self.high == id
    }

    /// Storage key: `low NUL high`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.low.as_str().len() + self.high.as_str().len() + 1);
        key.extend_from_slice(self.low.as_str().as_bytes());
        key.push(0);
        key.extend_from_slice(self.high.as_str().as_bytes());
        key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRelation {
    /// Subset side for partial relations, lower id for exact ones
    pub first: DiskId,
    pub second: DiskId,
    pub kind: RelationKind,
    pub detected_at: DateTime<Utc>,
}

impl DuplicateRelation {
    pub fn key(&self) -> PairKey {
        // first != second is guaranteed at construction
        PairKey::new(&self.first, &self.second).unwrap_or_else(|| PairKey {
            low: self.first.clone(),
            high: self.second.clone(),
        })
    }

    pub fn involves(&self, id: &DiskId) -> bool {
        self.first == *id || self.second == *id
    }

    /// Same pair, same kind, same orientation.
    fn same_relation(&self, other: &DuplicateRelation) -> bool {
        self.first == other.first && self.second == other.second && self.kind == other.kind
    }
}

/// Relation found in one detection pass, before timestamps are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    first: DiskId,
    second: DiskId,
    kind: RelationKind,
}

/// Outcome of reconciling detected relations with stored ones.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionReport {
    /// Records with a non-empty hash set
    pub participants: usize,
    pub exact: usize,
    pub partial: usize,
    /// Relations that did not exist before
    pub added: Vec<DuplicateRelation>,
    /// Relations whose kind or orientation changed
    pub changed: Vec<DuplicateRelation>,
    /// Stored relations that no longer hold
    pub removed: Vec<PairKey>,
    pub unchanged: usize,
    /// Stored relations dropped up front by a clearing run
    pub cleared: usize,
    /// Only relations involving this disk were reconciled
    pub focus: Option<DiskId>,
    pub dry_run: bool,
}

impl DetectionReport {
    pub fn total(&self) -> usize {
        self.exact + self.partial
    }
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    dry_run: bool,
    clear: bool,
    focus: Option<DiskId>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the diff without writing relations or clearing record flags.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Drop every stored relation in scope before reconciling.
    pub fn with_clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    /// Limit reconciliation to relations involving one disk. The disk is
    /// still compared against the whole corpus.
    pub fn with_focus(mut self, focus: Option<DiskId>) -> Self {
        self.focus = focus;
        self
    }

    fn in_scope(&self, key: &PairKey) -> bool {
        self.focus.as_ref().map(|id| key.contains(id)).unwrap_or(true)
    }

    /// Detect relations over `records` and reconcile the repository with them.
    pub fn run(
        &self,
        records: &[DiskRecord],
        repository: &dyn DiskRepository,
    ) -> Result<DetectionReport, ApiError> {
        let candidates: Vec<Candidate> = detect(records)
            .into_iter()
            .filter(|c| {
                self.focus
                    .as_ref()
                    .map(|id| c.first == *id || c.second == *id)
                    .unwrap_or(true)
            })
            .collect();
        let mut stored: BTreeMap<PairKey, DuplicateRelation> = repository
            .load_relations()?
            .into_iter()
            .map(|r| (r.key(), r))
            .filter(|(key, _)| self.in_scope(key))
            .collect();

        let now = Utc::now();
        let mut report = DetectionReport {
            participants: records.iter().filter(|r| !r.manifest.is_empty()).count(),
            focus: self.focus.clone(),
            dry_run: self.dry_run,
            ..Default::default()
        };

        if self.clear {
            report.cleared = stored.len();
            if !self.dry_run {
                for key in stored.keys() {
                    repository.remove_relation(key)?;
                }
            }
            info!(cleared = report.cleared, dry_run = self.dry_run, "Cleared duplicate relations");
            stored.clear();
        }
        let mut live = BTreeSet::new();

        for candidate in candidates {
            match candidate.kind {
                RelationKind::Exact => report.exact += 1,
                RelationKind::Partial => report.partial += 1,
            }
            let relation = DuplicateRelation {
                first: candidate.first,
                second: candidate.second,
                kind: candidate.kind,
                detected_at: now,
            };
            let key = relation.key();
            match stored.get(&key) {
                Some(existing) if existing.same_relation(&relation) => report.unchanged += 1,
                Some(_) => {
                    if !self.dry_run {
                        repository.save_relation(&relation)?;
                    }
                    report.changed.push(relation);
                }
                None => {
                    if !self.dry_run {
                        repository.save_relation(&relation)?;
                    }
                    report.added.push(relation);
                }
            }
            live.insert(key);
        }

        for key in stored.keys().filter(|k| !live.contains(*k)) {
            if !self.dry_run {
                repository.remove_relation(key)?;
            }
            report.removed.push(key.clone());
        }

        if !self.dry_run {
            let flagged = records.iter().filter(|r| {
                r.needs_duplicate_check
                    && self.focus.as_ref().map(|id| r.id == *id).unwrap_or(true)
            });
            for record in flagged {
                let mut cleared = record.clone();
                cleared.needs_duplicate_check = false;
                repository.save(&cleared)?;
            }
        }

        info!(
            participants = report.participants,
            exact = report.exact,
            partial = report.partial,
            added = report.added.len(),
            changed = report.changed.len(),
            removed = report.removed.len(),
            cleared = report.cleared,
            dry_run = self.dry_run,
            "Duplicate detection complete"
        );
        Ok(report)
    }
}

/// Find every exact and partial relation among `records`.
fn detect(records: &[DiskRecord]) -> Vec<Candidate> {
    let sets: Vec<(&DiskId, BTreeSet<ContentHash>)> = records
        .iter()
        .map(|r| (&r.id, r.hash_set()))
        .filter(|(_, set)| !set.is_empty())
        .collect();

    let mut out = Vec::new();

    // Exact: records sharing a set fingerprint, confirmed by set equality.
    let mut buckets: HashMap<Hash, Vec<usize>> = HashMap::new();
    for (idx, (_, set)) in sets.iter().enumerate() {
        buckets.entry(set_fingerprint(set)).or_default().push(idx);
    }
    for members in buckets.values().filter(|m| m.len() > 1) {
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                let (id_a, set_a) = &sets[a];
                let (id_b, set_b) = &sets[b];
                if set_a != set_b {
                    continue;
                }
                if let Some(key) = PairKey::new(id_a, id_b) {
                    out.push(Candidate {
                        first: key.low,
                        second: key.high,
                        kind: RelationKind::Exact,
                    });
                }
            }
        }
    }

    // Partial: a proper subset must contain every hash of the smaller set, so
    // the posting list of its rarest hash bounds the supersets to check.
    let mut postings: HashMap<ContentHash, Vec<usize>> = HashMap::new();
    for (idx, (_, set)) in sets.iter().enumerate() {
        for hash in set {
            postings.entry(*hash).or_default().push(idx);
        }
    }
    for (idx, (id, set)) in sets.iter().enumerate() {
        let rarest = set
            .iter()
            .filter_map(|h| postings.get(h))
            .min_by_key(|list| list.len());
        let Some(candidates) = rarest else { continue };
        for &other in candidates {
            if other == idx {
                continue;
            }
            let (other_id, other_set) = &sets[other];
            if set.len() < other_set.len() && set.is_subset(other_set) && id != other_id {
                out.push(Candidate {
                    first: (*id).clone(),
                    second: (*other_id).clone(),
                    kind: RelationKind::Partial,
                });
            }
        }
    }

    debug!(
        participants = sets.len(),
        buckets = buckets.len(),
        relations = out.len(),
        "Detected relations"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentEntry;
    use crate::content::ContainerFingerprint;
    use crate::store::memory::MemoryRepository;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn h(n: u8) -> ContentHash {
        ContentHash([n; 16])
    }

    fn record(id: &str, hashes: &[u8]) -> DiskRecord {
        let mut record = DiskRecord::new(DiskId::new(id), id, PathBuf::from(id));
        let entries = hashes
            .iter()
            .enumerate()
            .map(|(i, n)| ContentEntry {
                path: format!("{}/FILE{}.TXT", id, i),
                size: 1,
                hash: h(*n),
                position: i as u32,
            })
            .collect();
        record.manifest.replace(
            PathBuf::from(format!("{}/{}.zip", id, id)),
            ContainerFingerprint {
                size: 1,
                modified_nanos: 1,
            },
            entries,
        );
        record
    }

    #[test]
    fn test_exact_duplicates_produce_one_relation() {
        let repo = MemoryRepository::new();
        let records = vec![record("a", &[1, 2, 3]), record("b", &[3, 2, 1])];
        let report = DuplicateDetector::new().run(&records, &repo).unwrap();
        assert_eq!(report.exact, 1);
        assert_eq!(report.partial, 0);

        let relations = repo.load_relations().unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].kind, RelationKind::Exact);
    }

    #[test]
    fn test_partial_relation_orients_subset_first() {
        let repo = MemoryRepository::new();
        let records = vec![record("big", &[1, 2, 3]), record("small", &[1, 2])];
        DuplicateDetector::new().run(&records, &repo).unwrap();

        let relations = repo.load_relations().unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].kind, RelationKind::Partial);
        assert_eq!(relations[0].first.as_str(), "small");
        assert_eq!(relations[0].second.as_str(), "big");
    }

    #[test]
    fn test_empty_sets_never_participate() {
        let repo = MemoryRepository::new();
        let records = vec![record("a", &[]), record("b", &[]), record("c", &[1])];
        let report = DuplicateDetector::new().run(&records, &repo).unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(report.participants, 1);
    }

    #[test]
    fn test_rerun_is_idempotent_and_keeps_timestamp() {
        let repo = MemoryRepository::new();
        let records = vec![record("a", &[1, 2]), record("b", &[1, 2])];
        DuplicateDetector::new().run(&records, &repo).unwrap();
        let first = repo.load_relations().unwrap();

        let report = DuplicateDetector::new().run(&records, &repo).unwrap();
        assert_eq!(report.unchanged, 1);
        assert!(report.added.is_empty());
        assert_eq!(repo.load_relations().unwrap(), first);
    }

    #[test]
    fn test_stale_relation_removed_after_change() {
        let repo = MemoryRepository::new();
        let mut records = vec![record("a", &[1, 2]), record("b", &[1, 2])];
        DuplicateDetector::new().run(&records, &repo).unwrap();

        records[1] = record("b", &[7, 8]);
        let report = DuplicateDetector::new().run(&records, &repo).unwrap();
        assert_eq!(report.removed.len(), 1);
        assert!(repo.load_relations().unwrap().is_empty());
    }

    #[test]
    fn test_kind_change_is_reported() {
        let repo = MemoryRepository::new();
        let mut records = vec![record("a", &[1, 2]), record("b", &[1, 2])];
        DuplicateDetector::new().run(&records, &repo).unwrap();

        records[1] = record("b", &[1, 2, 3]);
        let report = DuplicateDetector::new().run(&records, &repo).unwrap();
        assert_eq!(report.changed.len(), 1);
        let relations = repo.load_relations().unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].kind, RelationKind::Partial);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let repo = MemoryRepository::new();
        let mut a = record("a", &[1]);
        a.needs_duplicate_check = true;
        repo.save(&a).unwrap();
        let records = vec![a, record("b", &[1])];
        let report = DuplicateDetector::new()
            .with_dry_run(true)
            .run(&records, &repo)
            .unwrap();
        assert_eq!(report.added.len(), 1);
        assert!(repo.load_relations().unwrap().is_empty());
        assert!(repo.load_all().unwrap()[0].needs_duplicate_check);
    }

    #[test]
    fn test_detection_clears_recheck_flag() {
        let repo = MemoryRepository::new();
        let mut a = record("a", &[1]);
        a.needs_duplicate_check = true;
        DuplicateDetector::new().run(&[a], &repo).unwrap();
        assert!(!repo.load_all().unwrap()[0].needs_duplicate_check);
    }

    #[test]
    fn test_focus_limits_reconciliation_to_one_disk() {
        let repo = MemoryRepository::new();
        let mut records = vec![
            record("a", &[1, 2]),
            record("b", &[1, 2]),
            record("c", &[5]),
            record("d", &[5]),
        ];
        DuplicateDetector::new().run(&records, &repo).unwrap();
        assert_eq!(repo.load_relations().unwrap().len(), 2);

        records[1] = record("b", &[9]);
        records[3] = record("d", &[6]);
        for r in records.iter_mut() {
            r.needs_duplicate_check = true;
            repo.save(r).unwrap();
        }
        let report = DuplicateDetector::new()
            .with_focus(Some(DiskId::new("a")))
            .run(&records, &repo)
            .unwrap();
        assert_eq!(report.removed.len(), 1);
        assert!(report.removed[0].contains(&DiskId::new("a")));

        let relations = repo.load_relations().unwrap();
        assert_eq!(relations.len(), 1);
        assert!(relations[0].involves(&DiskId::new("c")));
        let flagged: Vec<String> = repo
            .load_all()
            .unwrap()
            .into_iter()
            .filter(|r| r.needs_duplicate_check)
            .map(|r| r.id.as_str().to_string())
            .collect();
        assert_eq!(flagged, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_clear_rebuilds_relations_from_scratch() {
        let repo = MemoryRepository::new();
        let records = vec![record("a", &[1]), record("b", &[1]), record("c", &[1, 2])];
        DuplicateDetector::new().run(&records, &repo).unwrap();
        let before = repo.load_relations().unwrap();
        assert_eq!(before.len(), 3);

        let preview = DuplicateDetector::new()
            .with_clear(true)
            .with_dry_run(true)
            .run(&records, &repo)
            .unwrap();
        assert_eq!(preview.cleared, 3);
        assert_eq!(repo.load_relations().unwrap(), before);

        let report = DuplicateDetector::new()
            .with_clear(true)
            .run(&records[..2], &repo)
            .unwrap();
        assert_eq!(report.cleared, 3);
        assert_eq!(report.added.len(), 1);
        assert!(report.removed.is_empty());
        assert_eq!(repo.load_relations().unwrap().len(), 1);
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        let a = DiskId::new("a");
        let b = DiskId::new("b");
        assert_eq!(PairKey::new(&a, &b), PairKey::new(&b, &a));
        assert!(PairKey::new(&a, &a).is_none());
    }

    proptest! {
        #[test]
        fn prop_relations_are_symmetric_and_unique(
            sets in proptest::collection::vec(proptest::collection::btree_set(0u8..6, 0..5), 2..8)
        ) {
            let records: Vec<DiskRecord> = sets
                .iter()
                .enumerate()
                .map(|(i, set)| {
                    let hashes: Vec<u8> = set.iter().copied().collect();
                    record(&format!("disk{}", i), &hashes)
                })
                .collect();

            let forward = detect(&records);
            let mut reversed_records = records.clone();
            reversed_records.reverse();
            let backward = detect(&reversed_records);

            let keys = |c: &[Candidate]| -> BTreeSet<(PairKey, RelationKind)> {
                c.iter()
                    .filter_map(|c| PairKey::new(&c.first, &c.second).map(|k| (k, c.kind)))
                    .collect()
            };
            prop_assert_eq!(keys(&forward), keys(&backward));

            let unique: BTreeSet<PairKey> = forward
                .iter()
                .filter_map(|c| PairKey::new(&c.first, &c.second))
                .collect();
            prop_assert_eq!(unique.len(), forward.len());

            for candidate in &forward {
                prop_assert!(candidate.first != candidate.second);
                let a = records.iter().find(|r| r.id == candidate.first).unwrap().hash_set();
                let b = records.iter().find(|r| r.id == candidate.second).unwrap().hash_set();
                match candidate.kind {
                    RelationKind::Exact => prop_assert_eq!(a, b),
                    RelationKind::Partial => {
                        prop_assert!(a.len() < b.len());
                        prop_assert!(a.is_subset(&b));
                    }
                }
            }
        }
    }
}
