//! Sled-backed repository
//!
//! Three trees: `disks` keyed by identifier, `relations` keyed by
//! `PairKey::to_bytes`, and `audit` keyed by big-endian ids from
//! `Db::generate_id` so iteration order is append order. Values are bincode.

use super::DiskRepository;
use crate::audit::AuditEntry;
use crate::disk::DiskRecord;
use crate::duplicates::{DuplicateRelation, PairKey};
use crate::error::StorageError;
use crate::types::DiskId;
use serde::de::DeserializeOwned;
use sled::Tree;
use std::path::Path;

pub struct SledDiskRepository {
    db: sled::Db,
    disks: Tree,
    relations: Tree,
    audit: Tree,
}

impl SledDiskRepository {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            disks: db.open_tree("disks")?,
            relations: db.open_tree("relations")?,
            audit: db.open_tree("audit")?,
            db,
        })
    }
}

fn decode_all<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<T>, StorageError> {
    tree.iter()
        .map(|item| -> Result<T, StorageError> {
            let (_, value) = item?;
            Ok(bincode::deserialize(&value)?)
        })
        .collect()
}

impl DiskRepository for SledDiskRepository {
    fn load_all(&self) -> Result<Vec<DiskRecord>, StorageError> {
        decode_all(&self.disks)
    }

    fn load(&self, id: &DiskId) -> Result<Option<DiskRecord>, StorageError> {
        match self.disks.get(id.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn save(&self, record: &DiskRecord) -> Result<(), StorageError> {
        let value = bincode::serialize(record)?;
        self.disks.insert(record.id.as_str().as_bytes(), value)?;
        Ok(())
    }

    fn load_relations(&self) -> Result<Vec<DuplicateRelation>, StorageError> {
        decode_all(&self.relations)
    }

    fn save_relation(&self, relation: &DuplicateRelation) -> Result<(), StorageError> {
        let value = bincode::serialize(relation)?;
        self.relations.insert(relation.key().to_bytes(), value)?;
        Ok(())
    }

    fn remove_relation(&self, key: &PairKey) -> Result<(), StorageError> {
        self.relations.remove(key.to_bytes())?;
        Ok(())
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        let id = self.db.generate_id()?;
        let value = bincode::serialize(entry)?;
        self.audit.insert(id.to_be_bytes(), value)?;
        self.audit.flush()?;
        Ok(())
    }

    fn load_audit(&self) -> Result<Vec<AuditEntry>, StorageError> {
        decode_all(&self.audit)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
