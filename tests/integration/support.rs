use async_trait::async_trait;
use diskmuster::concurrency::{CancellationFlag, RunLock};
use diskmuster::config::MusterConfig;
use diskmuster::pipeline::PipelineContext;
use diskmuster::store::MemoryRepository;
use diskmuster::sync::{ArchiveClient, ContentProvider, RemoteMetadata, UploadReceipt};
use diskmuster::ApiError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::FileOptions;
use zip::ZipWriter;

pub fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    for (name, bytes) in files {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// Create `<root>/<name>/disk.zip` holding `files`.
pub fn disk_folder(root: &Path, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let folder = root.join(name);
    fs::create_dir_all(&folder).unwrap();
    write_zip(&folder.join("disk.zip"), files);
    folder
}

pub fn test_config(data: &Path) -> MusterConfig {
    let mut config = MusterConfig::default();
    config.storage.data_dir = Some(data.to_path_buf());
    config.scan.all_subfolders = true;
    config.scan.hashing_workers = 2;
    config.archive.rate_limit_ms = 0;
    config.archive.max_retries = 1;
    config.archive.base_retry_delay_ms = 1;
    config.archive.max_retry_delay_ms = 2;
    config
}

pub fn memory_context(
    data: &Path,
    repository: Arc<MemoryRepository>,
    client: Arc<dyn ArchiveClient>,
    cancel: CancellationFlag,
) -> PipelineContext {
    let lock = RunLock::acquire(data).unwrap();
    PipelineContext::with_parts(test_config(data), repository, client, lock, cancel).unwrap()
}

/// In-memory remote archive.
#[derive(Default)]
pub struct FakeArchive {
    pub items: Mutex<HashMap<String, RemoteMetadata>>,
    pub uploaded: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait]
impl ArchiveClient for FakeArchive {
    async fn fetch_metadata(&self, identifier: &str) -> Result<RemoteMetadata, ApiError> {
        self.items
            .lock()
            .get(identifier)
            .cloned()
            .ok_or_else(|| ApiError::RemoteNotFound(identifier.to_string()))
    }

    async fn upload(
        &self,
        identifier: &str,
        content: &dyn ContentProvider,
        metadata: &RemoteMetadata,
    ) -> Result<UploadReceipt, ApiError> {
        let mut bytes = 0;
        let mut names = Vec::new();
        for file in content.files() {
            let mut stream = content.open(&file).await?;
            bytes += tokio::io::copy(&mut stream.reader, &mut tokio::io::sink()).await?;
            names.push(file.name);
        }
        self.uploaded
            .lock()
            .push((identifier.to_string(), names.clone()));
        self.items
            .lock()
            .insert(identifier.to_string(), metadata.clone());
        Ok(UploadReceipt {
            identifier: identifier.to_string(),
            files: names,
            bytes,
        })
    }
}
