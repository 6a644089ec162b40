//! Content identity
//!
//! Hashes individual byte streams and turns a ZIP container into an ordered
//! manifest of `ContentEntry` values. A disk's content-hash set is always
//! derived from this manifest and never edited by hand.

pub mod hasher;
pub mod manifest;
pub mod zip_index;

pub use hasher::{hash_bytes, hash_file, hash_reader};
pub use manifest::{ContainerFingerprint, ContentEntry, ContentManifest};
pub use zip_index::{parse_embedded_flux, ZipContentIndexer};
