//! Loopback container format
//!
//! A minimal interleaved container written by the loopback encoder:
//!
//! ```text
//! header : "SCLB" | version u8 | mime_len u16 | mime | bitrate u32
//! block  : kind u8 (1 video, 2 audio) | timestamp_ms u64 | len u32 | payload
//! index  : "SCIX" | count u32 | (timestamp_ms u64, offset u64) * count | index_len u32
//! ```
//!
//! All integers are little-endian. Video payloads are `width u32 | height u32 |
//! rgba`, audio payloads are `sample_rate u32 | channels u16 | i16 samples`.
//! The trailing index is optional and is what `SeekIndexFinisher` appends.
//! Block kinds never collide with the index magic, so the index is found by
//! walking blocks rather than by reading the trailer.

use crate::capture::track::{AudioBuffer, VideoFrame};
use crate::recorder::artifact::{Artifact, ArtifactFinisher};
use crate::utils::error::{RecorderError, RecorderResult};

pub const MAGIC: &[u8; 4] = b"SCLB";
pub const INDEX_MAGIC: &[u8; 4] = b"SCIX";
pub const VERSION: u8 = 1;

const BLOCK_VIDEO: u8 = 1;
const BLOCK_AUDIO: u8 = 2;
const BLOCK_HEADER_LEN: usize = 1 + 8 + 4;
const INDEX_ENTRY_LEN: usize = 16;

/// Kind of a container block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Video,
    Audio,
}

/// Location of one block inside a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub kind: BlockKind,
    pub timestamp_ms: u64,
    pub offset: usize,
    pub len: usize,
}

/// Parsed container layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    pub mime_type: String,
    pub bitrate: u32,
    pub blocks: Vec<BlockInfo>,
    /// Byte length of header plus blocks, excluding any index
    pub body_len: usize,
    pub has_index: bool,
}

pub fn write_header(out: &mut Vec<u8>, mime_type: &str, bitrate: u32) {
    let mime = mime_type.as_bytes();
    let mime_len = mime.len().min(u16::MAX as usize);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&(mime_len as u16).to_le_bytes());
    out.extend_from_slice(&mime[..mime_len]);
    out.extend_from_slice(&bitrate.to_le_bytes());
}

pub fn write_video_block(out: &mut Vec<u8>, frame: &VideoFrame) {
    let payload_len = 8 + frame.data.len();
    write_block_header(out, BLOCK_VIDEO, frame.timestamp_ms, payload_len);
    out.extend_from_slice(&frame.width.to_le_bytes());
    out.extend_from_slice(&frame.height.to_le_bytes());
    out.extend_from_slice(&frame.data);
}

pub fn write_audio_block(out: &mut Vec<u8>, buffer: &AudioBuffer) {
    let payload_len = 6 + buffer.samples.len() * 2;
    write_block_header(out, BLOCK_AUDIO, buffer.timestamp_ms, payload_len);
    out.extend_from_slice(&buffer.sample_rate.to_le_bytes());
    out.extend_from_slice(&buffer.channels.to_le_bytes());
    for sample in &buffer.samples {
        let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&quantized.to_le_bytes());
    }
}

fn write_block_header(out: &mut Vec<u8>, kind: u8, timestamp_ms: f64, payload_len: usize) {
    out.push(kind);
    out.extend_from_slice(&(timestamp_ms.max(0.0) as u64).to_le_bytes());
    out.extend_from_slice(&(payload_len as u32).to_le_bytes());
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    let b = bytes.get(at..at + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Some(u64::from_le_bytes(raw))
}

fn malformed(reason: impl Into<String>) -> RecorderError {
    RecorderError::Platform(format!("malformed loopback container: {}", reason.into()))
}

/// Validate the index starting at `start` and return its entry count
///
/// The index must run to the end of `bytes`, and its trailer must match.
fn check_index(bytes: &[u8], start: usize) -> RecorderResult<usize> {
    let count = read_u32(bytes, start + 4).ok_or_else(|| malformed("truncated index"))? as usize;
    let index_len = count
        .checked_mul(INDEX_ENTRY_LEN)
        .and_then(|n| n.checked_add(8))
        .ok_or_else(|| malformed("index too large"))?;
    let trailer_at = start
        .checked_add(index_len)
        .ok_or_else(|| malformed("index too large"))?;
    match read_u32(bytes, trailer_at) {
        Some(trailer) if trailer as usize == index_len && trailer_at + 4 == bytes.len() => {
            Ok(count)
        }
        Some(_) => Err(malformed(format!("inconsistent index at {start}"))),
        None => Err(malformed("truncated index")),
    }
}

/// Walk the header and every block
///
/// An index is recognized only where a block would begin.
pub fn parse(bytes: &[u8]) -> RecorderResult<ContainerLayout> {
    if bytes.len() < 4 || &bytes[..4] != MAGIC {
        return Err(malformed("missing magic"));
    }
    if bytes.get(4) != Some(&VERSION) {
        return Err(malformed("unsupported version"));
    }
    let mime_len = read_u16(bytes, 5).ok_or_else(|| malformed("truncated header"))? as usize;
    let mime = bytes
        .get(7..7 + mime_len)
        .ok_or_else(|| malformed("truncated mime type"))?;
    let mime_type = String::from_utf8_lossy(mime).into_owned();
    let bitrate = read_u32(bytes, 7 + mime_len).ok_or_else(|| malformed("truncated header"))?;

    let mut blocks = Vec::new();
    let mut has_index = false;
    let mut at = 7 + mime_len + 4;
    while at < bytes.len() {
        if bytes[at..].starts_with(INDEX_MAGIC) {
            check_index(bytes, at)?;
            has_index = true;
            break;
        }
        let kind = match bytes[at] {
            BLOCK_VIDEO => BlockKind::Video,
            BLOCK_AUDIO => BlockKind::Audio,
            other => return Err(malformed(format!("unknown block kind {other} at {at}"))),
        };
        let timestamp_ms = read_u64(bytes, at + 1).ok_or_else(|| malformed("truncated block"))?;
        let len = read_u32(bytes, at + 9).ok_or_else(|| malformed("truncated block"))? as usize;
        let next = at + BLOCK_HEADER_LEN + len;
        if next > bytes.len() {
            return Err(malformed(format!("block at {at} overruns container")));
        }
        blocks.push(BlockInfo {
            kind,
            timestamp_ms,
            offset: at,
            len: BLOCK_HEADER_LEN + len,
        });
        at = next;
    }

    Ok(ContainerLayout {
        mime_type,
        bitrate,
        blocks,
        body_len: at,
        has_index,
    })
}

/// Seek entries of a container: one per video block
pub fn read_index(bytes: &[u8]) -> RecorderResult<Vec<(u64, u64)>> {
    let layout = parse(bytes)?;
    if !layout.has_index {
        return Err(malformed("no index"));
    }
    let start = layout.body_len;
    let count = check_index(bytes, start)?;

    (0..count)
        .map(|i| {
            let at = start + 8 + i * INDEX_ENTRY_LEN;
            match (read_u64(bytes, at), read_u64(bytes, at + 8)) {
                (Some(timestamp), Some(offset)) => Ok((timestamp, offset)),
                _ => Err(malformed("truncated index entry")),
            }
        })
        .collect()
}

/// Appends a seek index so players can scrub the artifact
#[derive(Debug, Default)]
pub struct SeekIndexFinisher;

impl ArtifactFinisher for SeekIndexFinisher {
    fn name(&self) -> &str {
        "seek-index"
    }

    fn finish(&self, artifact: &Artifact) -> RecorderResult<Artifact> {
        let layout = parse(artifact.bytes())?;
        if layout.has_index {
            return Ok(artifact.clone());
        }

        let entries: Vec<&BlockInfo> = layout
            .blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Video)
            .collect();

        let mut index = Vec::with_capacity(8 + entries.len() * INDEX_ENTRY_LEN);
        index.extend_from_slice(INDEX_MAGIC);
        index.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for block in &entries {
            index.extend_from_slice(&block.timestamp_ms.to_le_bytes());
            index.extend_from_slice(&(block.offset as u64).to_le_bytes());
        }

        let mut bytes = Vec::with_capacity(artifact.len() + index.len() + 4);
        bytes.extend_from_slice(artifact.bytes());
        bytes.extend_from_slice(&index);
        bytes.extend_from_slice(&(index.len() as u32).to_le_bytes());

        tracing::debug!("Indexed {} video blocks for seeking", entries.len());
        Ok(Artifact::new(bytes, artifact.media_type(), artifact.chunk_count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample_container() -> Vec<u8> {
        let mut out = Vec::new();
        write_header(&mut out, "video/webm", 12_000_000);
        write_video_block(
            &mut out,
            &VideoFrame {
                width: 1,
                height: 1,
                data: Arc::from(&[1u8, 2, 3, 4][..]),
                timestamp_ms: 0.0,
            },
        );
        write_audio_block(
            &mut out,
            &AudioBuffer {
                sample_rate: 48_000,
                channels: 1,
                samples: vec![0.0, 1.0],
                timestamp_ms: 5.0,
            },
        );
        write_video_block(
            &mut out,
            &VideoFrame {
                width: 1,
                height: 1,
                data: Arc::from(&[5u8, 6, 7, 8][..]),
                timestamp_ms: 16.7,
            },
        );
        out
    }

    #[test]
    fn test_parse_layout() {
        let bytes = sample_container();
        let layout = parse(&bytes).unwrap();

        assert_eq!(layout.mime_type, "video/webm");
        assert_eq!(layout.bitrate, 12_000_000);
        assert_eq!(layout.blocks.len(), 3);
        assert_eq!(layout.blocks[1].kind, BlockKind::Audio);
        assert_eq!(layout.blocks[2].timestamp_ms, 16);
        assert_eq!(layout.body_len, bytes.len());
        assert!(!layout.has_index);
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        assert!(parse(b"\x1aE\xdf\xa3webm").is_err());
    }

    #[test]
    fn test_rejects_truncated_block() {
        let bytes = sample_container();
        assert!(parse(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_seek_index_points_at_video_blocks() {
        let bytes = sample_container();
        let artifact = Artifact::new(bytes.clone(), "video/webm", 1);

        let finished = SeekIndexFinisher.finish(&artifact).unwrap();
        assert_eq!(&finished.bytes()[..bytes.len()], &bytes[..]);

        let layout = parse(finished.bytes()).unwrap();
        assert!(layout.has_index);
        assert_eq!(layout.blocks.len(), 3);

        let index = read_index(finished.bytes()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index[0], (0, layout.blocks[0].offset as u64));
        assert_eq!(index[1], (16, layout.blocks[2].offset as u64));
    }

    #[test]
    fn test_seek_index_is_idempotent() {
        let artifact = Artifact::new(sample_container(), "video/webm", 1);
        let once = SeekIndexFinisher.finish(&artifact).unwrap();
        let twice = SeekIndexFinisher.finish(&once).unwrap();
        assert_eq!(once.bytes(), twice.bytes());
    }

    #[test]
    fn test_payload_resembling_an_index_is_not_one() {
        let mut bytes = sample_container();
        let mut data = b"SCIX".to_vec();
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&8u32.to_le_bytes());
        write_video_block(
            &mut bytes,
            &VideoFrame {
                width: 1,
                height: 1,
                data: Arc::from(&data[..]),
                timestamp_ms: 33.4,
            },
        );

        let layout = parse(&bytes).unwrap();
        assert!(!layout.has_index);
        assert_eq!(layout.body_len, bytes.len());
        assert_eq!(layout.blocks.len(), 4);
        assert!(read_index(&bytes).is_err());

        let finished = SeekIndexFinisher
            .finish(&Artifact::new(bytes.clone(), "video/webm", 1))
            .unwrap();
        assert_eq!(read_index(finished.bytes()).unwrap().len(), 3);
    }

    #[test]
    fn test_rejects_index_with_bad_trailer() {
        let artifact = Artifact::new(sample_container(), "video/webm", 1);
        let mut bytes = SeekIndexFinisher.finish(&artifact).unwrap().bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(parse(&bytes).is_err());
    }
}
