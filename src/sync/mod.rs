//! Archive Synchronization
//!
//! Reconciles each disk against its remote archive item. The engine talks to
//! the archive only through the `ArchiveClient` capability; network calls go
//! through a rate limiter separate from the hashing pool and are retried with
//! exponential backoff on transient failures.

pub mod client;
pub mod engine;
pub mod ia;
pub mod limiter;
pub mod metadata;
pub mod retry;

pub use client::{ArchiveClient, ContentProvider, FolderContent, UploadFile, UploadReceipt};
pub use engine::{
    recover_transient, ArchiveSyncEngine, SyncItem, SyncMode, SyncOperation, SyncOutcome,
};
pub use ia::InternetArchiveClient;
pub use limiter::RemoteRateLimiter;
pub use metadata::RemoteMetadata;
pub use retry::RetryPolicy;
