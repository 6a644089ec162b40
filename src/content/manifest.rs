//! Content manifest owned by a disk record

use crate::types::{ContentHash, Hash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// One file inside a disk's ZIP container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    /// Path relative to the container root, as stored in the central directory
    pub path: String,
    /// Uncompressed size in bytes
    pub size: u64,
    pub hash: ContentHash,
    /// Index of the entry in the container's central directory
    pub position: u32,
}

impl ContentEntry {
    /// Lowercased file extension including the dot (`.a2r`), if any.
    pub fn suffix(&self) -> Option<String> {
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        name.rfind('.')
            .filter(|&idx| idx > 0)
            .map(|idx| name[idx..].to_lowercase())
    }
}

/// Cheap change detector for a container: byte size plus modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFingerprint {
    pub size: u64,
    pub modified_nanos: u128,
}

impl ContainerFingerprint {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let modified_nanos = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(Self {
            size: meta.len(),
            modified_nanos,
        })
    }
}

/// Ordered set of content entries for one container version.
///
/// Only the scanner replaces a manifest, and always wholesale; other
/// components get read-only access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentManifest {
    container: Option<PathBuf>,
    fingerprint: Option<ContainerFingerprint>,
    entries: Vec<ContentEntry>,
}

impl ContentManifest {
    pub fn entries(&self) -> &[ContentEntry] {
        &self.entries
    }

    pub fn container(&self) -> Option<&Path> {
        self.container.as_deref()
    }

    pub fn fingerprint(&self) -> Option<ContainerFingerprint> {
        self.fingerprint
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Unordered set of content hashes, ignoring paths and positions.
    pub fn hash_set(&self) -> BTreeSet<ContentHash> {
        self.entries.iter().map(|e| e.hash).collect()
    }

    /// Whether this manifest was built from the container as it is now.
    pub fn is_current(&self, container: &Path, fingerprint: ContainerFingerprint) -> bool {
        self.container.as_deref() == Some(container) && self.fingerprint == Some(fingerprint)
    }

    /// Replace the whole manifest with a freshly indexed container version.
    pub(crate) fn replace(
        &mut self,
        container: PathBuf,
        fingerprint: ContainerFingerprint,
        entries: Vec<ContentEntry>,
    ) {
        self.container = Some(container);
        self.fingerprint = Some(fingerprint);
        self.entries = entries;
    }

    /// Forget the container entirely.
    pub(crate) fn clear(&mut self) {
        self.container = None;
        self.fingerprint = None;
        self.entries.clear();
    }

    /// Remember the container's new location without touching its entries.
    pub(crate) fn relocate(&mut self, container: PathBuf) {
        self.container = Some(container);
    }
}

/// Summary fingerprint of a hash set: blake3 over the sorted digests.
///
/// Equal sets produce equal fingerprints, so exact duplicates share a bucket.
pub fn set_fingerprint(hashes: &BTreeSet<ContentHash>) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for hash in hashes {
        hasher.update(hash.as_bytes());
    }
    *hasher.finalize().as_bytes()
}
