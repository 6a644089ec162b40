//! Diskmuster: Floppy Disk Ingestion and Archive Reconciliation
//!
//! Turns mustered disk folders into disk records: ZIP containers become
//! ordered content manifests, flux images are parsed for metadata, duplicate
//! disks are found by content-hash set, and each disk's state is reconciled
//! against a remote archive item. Every run is recorded in an append-only
//! audit log.

pub mod audit;
pub mod concurrency;
pub mod config;
pub mod content;
pub mod disk;
pub mod duplicates;
pub mod error;
pub mod flux;
pub mod logging;
pub mod pipeline;
pub mod scan;
pub mod store;
pub mod sync;
pub mod tooling;
pub mod types;

pub use error::ApiError;
