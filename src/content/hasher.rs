//! Content hash computation

use crate::types::ContentHash;
use md5::{Digest, Md5};
use std::io::{self, Read};
use std::path::Path;

/// Hash an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash(Md5::digest(bytes).into())
}

/// Hash a reader to exhaustion, returning the digest and the byte count.
pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<(ContentHash, u64)> {
    let mut hasher = Md5::new();
    let copied = io::copy(reader, &mut hasher)?;
    Ok((ContentHash(hasher.finalize().into()), copied))
}

/// Hash a file on disk.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
    let mut file = std::fs::File::open(path)?;
    hash_reader(&mut file).map(|(hash, _)| hash)
}
