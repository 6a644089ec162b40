//! ZIP container indexing
//!
//! Enumerates the central directory, fully decompresses and hashes every file
//! entry, and returns entries in central-directory order regardless of which
//! worker finished first.

use crate::concurrency::HashingPool;
use crate::content::hasher::hash_reader;
use crate::content::manifest::ContentEntry;
use crate::error::ApiError;
use crate::flux::{parse_flux_reader, FluxImage};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

type Archive = ZipArchive<BufReader<File>>;

/// Builds `ContentEntry` manifests from ZIP containers on the hashing pool.
#[derive(Clone)]
pub struct ZipContentIndexer {
    pool: HashingPool,
}

impl ZipContentIndexer {
    pub fn new(pool: HashingPool) -> Self {
        Self { pool }
    }

    /// Index a container. Directory entries are skipped.
    pub fn index(&self, container: &Path) -> Result<Vec<ContentEntry>, ApiError> {
        let entry_count = open_archive(container)?.len();

        let indexed: Vec<Option<ContentEntry>> = self.pool.install(|| {
            (0..entry_count)
                .into_par_iter()
                .map_init(
                    || open_archive(container),
                    |archive, index| match archive {
                        Ok(archive) => index_entry(archive, container, index),
                        Err(e) => Err(corrupt(container, e.to_string())),
                    },
                )
                .collect::<Result<Vec<_>, ApiError>>()
        })?;

        let entries: Vec<ContentEntry> = indexed.into_iter().flatten().collect();
        debug!(
            container = %container.display(),
            entries = entries.len(),
            "Indexed container"
        );
        Ok(entries)
    }
}

/// Decompress one entry and parse it as a flux image.
///
/// ZIP entries cannot seek, so the entry is read into memory first.
pub fn parse_embedded_flux(container: &Path, entry: &str) -> Result<FluxImage, ApiError> {
    let mut archive = open_archive(container)?;
    let mut file = archive
        .by_name(entry)
        .map_err(|e| corrupt(container, format!("{}: {}", entry, e)))?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)
        .map_err(|e| corrupt(container, format!("{}: {}", entry, e)))?;

    let mut image = parse_flux_reader(Cursor::new(bytes), container.to_path_buf())?;
    image.entry = Some(entry.to_string());
    Ok(image)
}

fn corrupt(container: &Path, reason: impl Into<String>) -> ApiError {
    ApiError::ContainerCorrupt {
        path: container.to_path_buf(),
        reason: reason.into(),
    }
}

fn open_archive(container: &Path) -> Result<Archive, ApiError> {
    let file = File::open(container)?;
    ZipArchive::new(BufReader::new(file))
        .map_err(|e| corrupt(container, format!("unreadable central directory: {}", e)))
}

fn index_entry(
    archive: &mut Archive,
    container: &Path,
    index: usize,
) -> Result<Option<ContentEntry>, ApiError> {
    let mut file = archive
        .by_index(index)
        .map_err(|e| corrupt(container, format!("entry {}: {}", index, e)))?;

    if file.is_dir() || file.name().ends_with('/') {
        return Ok(None);
    }

    let path = file.name().to_string();
    let declared = file.size();
    let (hash, actual) = hash_reader(&mut file)
        .map_err(|e| corrupt(container, format!("{}: {}", path, e)))?;

    if actual != declared {
        return Err(corrupt(
            container,
            format!(
                "{}: declared {} bytes, decompressed {}",
                path, declared, actual
            ),
        ));
    }

    Ok(Some(ContentEntry {
        path,
        size: declared,
        hash,
        position: index as u32,
    }))
}
