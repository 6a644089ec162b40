//! Flux Images
//!
//! Parser for A2R-style flux captures: an 8-byte magic signature followed by
//! `{tag: 4 ASCII bytes, length: u32 LE, payload}` chunks. Only the chunks
//! needed for metadata extraction are decoded; stream payloads stay on disk and
//! are referenced by byte range.

pub mod chunk;
pub mod info;
pub mod parser;

pub use info::{InfoChunk, MetaChunk};
pub use parser::{parse_flux_file, parse_flux_reader, MAX_INFO_VERSION};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Capture resolution used when no RWCP chunk states one (125 ns ticks).
pub const DEFAULT_RESOLUTION_PS: u32 = 125_000;

/// Location of raw bit-cell timing data inside the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub len: u64,
}

/// One STRM record exactly as encountered, including superseded captures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub track: u8,
    pub side: u8,
    pub capture_type: u8,
    /// Offset of the index signal within the stream, in ticks
    pub index_offset: u32,
    pub data: ByteRange,
}

/// Decoded metadata for one physical track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FluxTrack {
    pub track: u8,
    pub side: u8,
    /// Bit-cell timing resolution in picoseconds
    pub resolution_ps: u32,
    /// Number of STRM records seen for this track/side
    pub capture_count: u32,
    pub capture_type: u8,
    pub index_offset: u32,
    pub data: ByteRange,
}

/// Result of parsing one flux image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FluxImage {
    pub path: PathBuf,
    /// Entry name when `path` is a ZIP container holding the image
    #[serde(default)]
    pub entry: Option<String>,
    pub info: Option<InfoChunk>,
    pub meta: BTreeMap<String, String>,
    /// One entry per track/side, the last capture encountered wins
    pub tracks: Vec<FluxTrack>,
    /// Every STRM record in file order
    pub records: Vec<StreamRecord>,
    /// Tags of chunks that were skipped as unknown
    pub skipped_chunks: Vec<String>,
}

impl FluxImage {
    /// INFO fields as a string map.
    pub fn info_map(&self) -> BTreeMap<String, String> {
        self.info.as_ref().map(InfoChunk::to_map).unwrap_or_default()
    }

    /// Typed view over the META pairs.
    pub fn meta_chunk(&self) -> MetaChunk<'_> {
        MetaChunk::new(&self.meta)
    }

    pub fn track(&self, track: u8, side: u8) -> Option<&FluxTrack> {
        self.tracks
            .iter()
            .find(|t| t.track == track && t.side == side)
    }

    /// Read the raw bit-cell bytes of a track from the source file.
    pub fn read_stream(&self, track: &FluxTrack) -> std::io::Result<Vec<u8>> {
        match &self.entry {
            None => read_range(&self.path, track.data),
            Some(entry) => read_entry_range(&self.path, entry, track.data),
        }
    }
}

fn read_entry_range(container: &Path, entry: &str, range: ByteRange) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(container)?;
    let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))?;
    let mut source = archive.by_name(entry)?;
    std::io::copy(&mut (&mut source).take(range.offset), &mut std::io::sink())?;
    let mut buf = vec![0u8; range.len as usize];
    source.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read `range` from the file at `path`.
pub fn read_range(path: &Path, range: ByteRange) -> std::io::Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(range.offset))?;
    let mut buf = vec![0u8; range.len as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
