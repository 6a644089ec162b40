//! Flux image parsing

use super::chunk::{ChunkHeader, ChunkReader, TAG_INFO, TAG_META, TAG_RWCP, TAG_STRM};
use super::info::{parse_meta, InfoChunk};
use super::{ByteRange, FluxImage, FluxTrack, StreamRecord, DEFAULT_RESOLUTION_PS};
use crate::error::ApiError;
use std::collections::BTreeMap;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Highest INFO version this parser understands.
pub const MAX_INFO_VERSION: u8 = 1;

/// STRM record list terminator (track byte).
const STREAM_END: u8 = 0xFF;

/// Bytes after the track byte: side, capture type, index offset, data length.
const STREAM_HEADER_TAIL: u64 = 1 + 1 + 4 + 4;

/// Parse a flux image file.
pub fn parse_flux_file(path: &Path) -> Result<FluxImage, ApiError> {
    let file = std::fs::File::open(path)?;
    parse_flux_reader(BufReader::new(file), path.to_path_buf())
}

/// Parse a flux image from any seekable source. `path` is recorded so stream
/// byte ranges can be read back later.
pub fn parse_flux_reader<R: Read + Seek>(reader: R, path: PathBuf) -> Result<FluxImage, ApiError> {
    let mut chunks = ChunkReader::open(reader)?;
    let mut info = None;
    let mut meta = BTreeMap::new();
    let mut records = Vec::new();
    let mut skipped_chunks = Vec::new();
    let mut resolution_ps = DEFAULT_RESOLUTION_PS;

    while let Some(header) = chunks.next_header()? {
        trace!(tag = %header.tag_str(), len = header.len, "Chunk");
        match header.tag {
            TAG_INFO => {
                let payload = chunks.read_payload(&header)?;
                let parsed = InfoChunk::parse(&payload)?;
                if parsed.version > MAX_INFO_VERSION {
                    return Err(ApiError::UnsupportedVersion {
                        found: parsed.version,
                        supported: MAX_INFO_VERSION,
                    });
                }
                info = Some(parsed);
            }
            TAG_META => {
                let payload = chunks.read_payload(&header)?;
                meta.extend(parse_meta(&payload)?);
            }
            TAG_RWCP => {
                if header.len >= 5 {
                    let mut head = [0u8; 5];
                    chunks.read_exact(&mut head)?;
                    let resolution = u32::from_le_bytes([head[1], head[2], head[3], head[4]]);
                    if resolution > 0 {
                        resolution_ps = resolution;
                    }
                }
                chunks.skip_payload(&header)?;
            }
            TAG_STRM => read_stream_records(&mut chunks, &header, &mut records)?,
            _ => {
                skipped_chunks.push(header.tag_str());
                chunks.skip_payload(&header)?;
            }
        }
    }

    let tracks = collapse_captures(&records, resolution_ps);
    debug!(
        path = %path.display(),
        tracks = tracks.len(),
        records = records.len(),
        skipped = skipped_chunks.len(),
        "Parsed flux image"
    );

    Ok(FluxImage {
        path,
        entry: None,
        info,
        meta,
        tracks,
        records,
        skipped_chunks,
    })
}

fn read_stream_records<R: Read + Seek>(
    chunks: &mut ChunkReader<R>,
    header: &ChunkHeader,
    records: &mut Vec<StreamRecord>,
) -> Result<(), ApiError> {
    let end = header.payload_offset + u64::from(header.len);

    while chunks.position() < end {
        let mut track = [0u8; 1];
        chunks.read_exact(&mut track)?;
        if track[0] == STREAM_END {
            break;
        }
        if chunks.position() + STREAM_HEADER_TAIL > end {
            return Err(ApiError::MalformedChunk {
                tag: "STRM".to_string(),
                reason: format!("record header at {} runs past chunk end", chunks.position() - 1),
            });
        }

        let mut tail = [0u8; STREAM_HEADER_TAIL as usize];
        chunks.read_exact(&mut tail)?;
        let index_offset = u32::from_le_bytes([tail[2], tail[3], tail[4], tail[5]]);
        let data_len = u64::from(u32::from_le_bytes([tail[6], tail[7], tail[8], tail[9]]));

        let data_offset = chunks.position();
        if data_offset + data_len > end {
            return Err(ApiError::TruncatedChunk {
                tag: "STRM".to_string(),
                declared: data_len,
                remaining: end - data_offset,
            });
        }

        records.push(StreamRecord {
            track: track[0],
            side: tail[0],
            capture_type: tail[1],
            index_offset,
            data: ByteRange {
                offset: data_offset,
                len: data_len,
            },
        });
        chunks.seek_to(data_offset + data_len)?;
    }

    chunks.seek_to(end)
}

/// One track per track/side pair; the last capture encountered wins.
fn collapse_captures(records: &[StreamRecord], resolution_ps: u32) -> Vec<FluxTrack> {
    let mut by_location: BTreeMap<(u8, u8), (u32, &StreamRecord)> = BTreeMap::new();
    for record in records {
        let slot = by_location
            .entry((record.track, record.side))
            .or_insert((0, record));
        slot.0 += 1;
        slot.1 = record;
    }

    by_location
        .into_iter()
        .map(|((track, side), (capture_count, record))| FluxTrack {
            track,
            side,
            resolution_ps,
            capture_count,
            capture_type: record.capture_type,
            index_offset: record.index_offset,
            data: record.data,
        })
        .collect()
}
