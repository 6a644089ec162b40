//! Disk Repository
//!
//! The narrow persistence interface every pipeline component goes through.
//! Records, duplicate relations, and audit entries are the only things stored.

pub mod memory;
pub mod persistence;

use crate::audit::AuditEntry;
use crate::disk::DiskRecord;
use crate::duplicates::{DuplicateRelation, PairKey};
use crate::error::StorageError;
use crate::types::DiskId;

pub use memory::MemoryRepository;
pub use persistence::SledDiskRepository;

/// Repository interface
pub trait DiskRepository: Send + Sync {
    /// All records, ordered by identifier.
    fn load_all(&self) -> Result<Vec<DiskRecord>, StorageError>;

    fn load(&self, id: &DiskId) -> Result<Option<DiskRecord>, StorageError> {
        Ok(self.load_all()?.into_iter().find(|r| &r.id == id))
    }

    /// Insert or replace the record with the same identifier.
    fn save(&self, record: &DiskRecord) -> Result<(), StorageError>;

    fn load_relations(&self) -> Result<Vec<DuplicateRelation>, StorageError>;

    /// Upsert by unordered pair key.
    fn save_relation(&self, relation: &DuplicateRelation) -> Result<(), StorageError>;

    fn remove_relation(&self, key: &PairKey) -> Result<(), StorageError>;

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), StorageError>;

    /// Audit entries in append order.
    fn load_audit(&self) -> Result<Vec<AuditEntry>, StorageError>;

    /// Make every write so far durable.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
