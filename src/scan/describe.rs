//! Archive metadata drawn from a disk folder
//!
//! Fills a record's empty metadata fields from its description file, its
//! flux images' META pairs, and the configured seed. Fields that already hold
//! a value are never overwritten, so edits made after the first scan stick.

use crate::config::MetadataSeed;
use crate::disk::DiskRecord;
use std::path::Path;

/// Clear bit 7 of every byte, as 8-bit editors of the era set it on text.
///
/// NUL becomes U+FFFD and the CP/M end-of-file marker (0x1A) is dropped.
pub fn strip_high_bit(raw: &[u8]) -> String {
    raw.iter()
        .map(|b| b & 0x7F)
        .filter(|b| *b != 0x1A)
        .map(|b| match b {
            0 => char::REPLACEMENT_CHARACTER,
            other => char::from(other),
        })
        .collect()
}

/// Read a description file as cleaned text.
pub fn read_description(path: &Path) -> std::io::Result<String> {
    let raw = std::fs::read(path)?;
    Ok(strip_high_bit(&raw).trim().to_string())
}

/// Fill the empty metadata fields of `record`.
///
/// Returns a problem note when the description file could not be read.
pub fn seed_metadata(record: &mut DiskRecord, seed: &MetadataSeed) -> Option<String> {
    let mut problem = None;
    if record.metadata.description.is_empty() {
        if let Some(path) = record.description_file.clone() {
            match read_description(&path) {
                Ok(text) => record.metadata.description = text,
                Err(e) => problem = Some(format!("{}: {}", path.display(), e)),
            }
        }
    }

    if record.metadata.creators.is_empty() {
        let mut creators: Vec<String> = Vec::new();
        for image in record.flux_image_iter() {
            let meta = image.meta_chunk();
            for name in [meta.developer(), meta.publisher()].into_iter().flatten() {
                if !creators.iter().any(|c| c == name) {
                    creators.push(name.to_string());
                }
            }
        }
        record.metadata.creators = creators;
    }

    if record.metadata.languages.is_empty() {
        let language = record
            .flux_image_iter()
            .find_map(|i| i.meta_chunk().language().map(str::to_string));
        record.metadata.languages = match language {
            Some(language) => vec![language],
            None => seed.languages.clone(),
        };
    }
    if record.metadata.subjects.is_empty() {
        record.metadata.subjects = seed.subjects.clone();
    }
    if record.metadata.collections.is_empty() {
        record.metadata.collections = seed.collections.clone();
    }
    problem
}
