//! Remote archive capability
//!
//! The sync engine only sees `ArchiveClient`; the concrete HTTP client lives in
//! `sync::ia` and tests plug in an in-memory fake.

use crate::disk::DiskRecord;
use crate::error::ApiError;
use crate::sync::metadata::RemoteMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncRead;

/// One file to be uploaded into an archive item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// File name inside the item
    pub name: String,
    pub path: PathBuf,
}

/// An open upload body. Clients read it to the end exactly once.
pub struct ContentStream {
    /// Exact number of bytes `reader` yields
    pub len: u64,
    pub reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
}

/// Supplies the files of an upload as byte streams.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    fn files(&self) -> Vec<UploadFile>;

    /// Open `file` for reading. Called once per upload attempt.
    async fn open(&self, file: &UploadFile) -> Result<ContentStream, ApiError>;
}

/// Uploads a disk's ZIP container and photos straight from its folder.
#[derive(Debug, Clone)]
pub struct FolderContent {
    files: Vec<UploadFile>,
}

impl FolderContent {
    pub fn from_record(record: &DiskRecord) -> Self {
        let files = record
            .manifest
            .container()
            .into_iter()
            .map(|p| p.to_path_buf())
            .chain(record.photos.iter().cloned())
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some(UploadFile { name, path })
            })
            .collect();
        Self { files }
    }
}

#[async_trait]
impl ContentProvider for FolderContent {
    fn files(&self) -> Vec<UploadFile> {
        self.files.clone()
    }

    async fn open(&self, file: &UploadFile) -> Result<ContentStream, ApiError> {
        let handle = tokio::fs::File::open(&file.path).await?;
        let len = handle.metadata().await?.len();
        Ok(ContentStream {
            len,
            reader: Box::new(handle),
        })
    }
}

/// Acknowledgement of an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub identifier: String,
    pub files: Vec<String>,
    pub bytes: u64,
}

/// Client-side view of the remote archive.
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Whether an item exists under `identifier`.
    async fn exists(&self, identifier: &str) -> Result<bool, ApiError> {
        match self.fetch_metadata(identifier).await {
            Ok(_) => Ok(true),
            Err(ApiError::RemoteNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Metadata of the item, `RemoteNotFound` when there is none.
    async fn fetch_metadata(&self, identifier: &str) -> Result<RemoteMetadata, ApiError>;

    /// Upload content and metadata, creating the item when absent.
    async fn upload(
        &self,
        identifier: &str,
        content: &dyn ContentProvider,
        metadata: &RemoteMetadata,
    ) -> Result<UploadReceipt, ApiError>;
}
