//! In-memory repository

use super::DiskRepository;
use crate::audit::AuditEntry;
use crate::disk::DiskRecord;
use crate::duplicates::{DuplicateRelation, PairKey};
use crate::error::StorageError;
use crate::types::DiskId;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    disks: RwLock<BTreeMap<DiskId, DiskRecord>>,
    relations: RwLock<BTreeMap<PairKey, DuplicateRelation>>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiskRepository for MemoryRepository {
    fn load_all(&self) -> Result<Vec<DiskRecord>, StorageError> {
        Ok(self.disks.read().values().cloned().collect())
    }

    fn load(&self, id: &DiskId) -> Result<Option<DiskRecord>, StorageError> {
        Ok(self.disks.read().get(id).cloned())
    }

    fn save(&self, record: &DiskRecord) -> Result<(), StorageError> {
        self.disks.write().insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn load_relations(&self) -> Result<Vec<DuplicateRelation>, StorageError> {
        Ok(self.relations.read().values().cloned().collect())
    }

    fn save_relation(&self, relation: &DuplicateRelation) -> Result<(), StorageError> {
        self.relations
            .write()
            .insert(relation.key(), relation.clone());
        Ok(())
    }

    fn remove_relation(&self, key: &PairKey) -> Result<(), StorageError> {
        self.relations.write().remove(key);
        Ok(())
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        self.audit.write().push(entry.clone());
        Ok(())
    }

    fn load_audit(&self) -> Result<Vec<AuditEntry>, StorageError> {
        Ok(self.audit.read().clone())
    }
}
