//! Chunk framing

use crate::error::ApiError;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::debug;

pub const MAGIC_LEN: usize = 8;

/// Accepted signatures: "A2R2" / "A2R3" followed by FF 0A 0D 0A.
pub const MAGIC_V2: [u8; MAGIC_LEN] = *b"A2R2\xFF\n\r\n";
pub const MAGIC_V3: [u8; MAGIC_LEN] = *b"A2R3\xFF\n\r\n";

pub const TAG_INFO: [u8; 4] = *b"INFO";
pub const TAG_META: [u8; 4] = *b"META";
pub const TAG_STRM: [u8; 4] = *b"STRM";
pub const TAG_RWCP: [u8; 4] = *b"RWCP";
pub const TAG_SLVD: [u8; 4] = *b"SLVD";

/// Tags a capture tool writes. An overrunning declaration on one of these is
/// a cut-off file; on anything else it is trailing text after the last chunk.
const KNOWN_TAGS: [[u8; 4]; 5] = [TAG_INFO, TAG_META, TAG_STRM, TAG_RWCP, TAG_SLVD];

/// A chunk header plus the absolute offset of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub tag: [u8; 4],
    pub len: u32,
    pub payload_offset: u64,
}

impl ChunkHeader {
    pub fn tag_str(&self) -> String {
        tag_to_string(&self.tag)
    }
}

pub fn tag_to_string(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// Tags are printable ASCII. Anything else after the last chunk is padding.
fn is_tag(tag: &[u8; 4]) -> bool {
    tag.iter().all(|b| b.is_ascii_graphic() || *b == b' ')
}

/// Sequential reader over the chunk stream of a seekable source.
pub struct ChunkReader<R> {
    inner: R,
    file_len: u64,
    position: u64,
}

impl<R: Read + Seek> ChunkReader<R> {
    /// Validate the magic signature and position at the first chunk.
    pub fn open(mut inner: R) -> Result<Self, ApiError> {
        let file_len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; MAGIC_LEN];
        let read = read_fully(&mut inner, &mut magic)?;
        if read < MAGIC_LEN || (magic != MAGIC_V2 && magic != MAGIC_V3) {
            return Err(ApiError::MagicMismatch {
                found: hex::encode(&magic[..read]),
            });
        }

        Ok(Self {
            inner,
            file_len,
            position: MAGIC_LEN as u64,
        })
    }

    pub fn remaining(&self) -> u64 {
        self.file_len.saturating_sub(self.position)
    }

    /// Next chunk header, or `None` at end of input or trailing padding.
    ///
    /// Fails with `TruncatedChunk` when a known chunk's declared length runs
    /// past the end of the file. An unknown tag that does so ends the chunk
    /// stream instead. The caller must consume or skip the payload.
    pub fn next_header(&mut self) -> Result<Option<ChunkHeader>, ApiError> {
        if self.remaining() < 8 {
            return Ok(None);
        }
        let mut header = [0u8; 8];
        self.inner.read_exact(&mut header)?;
        let tag = [header[0], header[1], header[2], header[3]];
        if !is_tag(&tag) {
            return Ok(None);
        }
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        self.position += 8;

        if u64::from(len) > self.remaining() {
            if !KNOWN_TAGS.contains(&tag) {
                debug!(
                    tag = %tag_to_string(&tag),
                    declared = len,
                    remaining = self.remaining(),
                    "Ignoring trailing bytes"
                );
                return Ok(None);
            }
            return Err(ApiError::TruncatedChunk {
                tag: tag_to_string(&tag),
                declared: u64::from(len),
                remaining: self.remaining(),
            });
        }

        Ok(Some(ChunkHeader {
            tag,
            len,
            payload_offset: self.position,
        }))
    }

    /// Read a whole payload into memory (small, fixed-layout chunks only).
    pub fn read_payload(&mut self, header: &ChunkHeader) -> Result<Vec<u8>, ApiError> {
        let mut buf = vec![0u8; header.len as usize];
        self.inner.read_exact(&mut buf)?;
        self.position += u64::from(header.len);
        Ok(buf)
    }

    /// Skip a payload using its declared length.
    pub fn skip_payload(&mut self, header: &ChunkHeader) -> Result<(), ApiError> {
        self.seek_to(header.payload_offset + u64::from(header.len))
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<(), ApiError> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    /// Read exactly `buf.len()` bytes at the current position.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ApiError> {
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}
