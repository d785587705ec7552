//! Paper backup chunks
//!
//! A container is printed as a numbered set of lines:
//!
//! ```text
//! SDRK1:<index>/<total>:<container_len>:<set_hash>:<base64 data>:<crc32>
//! ```
//!
//! - `index` is 1-based; every line carries the set total, the full
//!   container length and the first 16 hex chars of its SHA-256
//! - `crc32` covers the canonical line body and catches a mistyped line
//!   in isolation
//! - reassembly checks completeness, length and set hash, so a missing or
//!   foreign chunk is always rejected

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use thiserror::Error;

use super::container::{RecoveryContainer, MAX_CONTAINER_LEN};
use super::errors::{RecoveryError, RecoveryResult};
use crate::digest::{crc32_hex, sha256_hex};
use crate::observability::{log_event, Event};
use crate::persistence::write_bytes_atomic;

/// Line prefix and format version
pub const CHUNK_PREFIX: &str = "SDRK1";

/// Container bytes per chunk (64 base64 characters)
pub const CHUNK_DATA_BYTES: usize = 48;

const SET_HASH_LEN: usize = 16;

/// Chunk count of the largest container
const MAX_CHUNKS: usize = MAX_CONTAINER_LEN / CHUNK_DATA_BYTES + 1;

const LINE_PATTERN: &str = r"^SDRK1:(\d+)/(\d+):(\d+):([0-9a-fA-F]{16}):([A-Za-z0-9+/=]+):([0-9a-fA-F]{8})$";

/// Reasons a chunk set is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("no chunks found")]
    Empty,

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("chunk {index}: checksum does not match, re-check this line")]
    ChunkCrc { index: usize },

    #[error("chunk {index} appears twice with different contents")]
    DuplicateConflict { index: usize },

    #[error("chunks belong to different recovery kits")]
    MixedSets,

    #[error("reassembled container checksum mismatch: {detail}")]
    ChecksumMismatch { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChunkLine {
    index: usize,
    total: usize,
    container_len: usize,
    set_hash: String,
    data: String,
}

impl ChunkLine {
    fn body(&self) -> String {
        format!(
            "{}/{}:{}:{}:{}",
            self.index, self.total, self.container_len, self.set_hash, self.data
        )
    }

    fn render(&self) -> String {
        let body = self.body();
        format!("{}:{}:{}", CHUNK_PREFIX, body, crc32_hex(body.as_bytes()))
    }
}

/// Encode container bytes as printable chunk lines.
pub fn encode_chunks(bytes: &[u8]) -> Vec<String> {
    let set_hash = sha256_hex(bytes)[..SET_HASH_LEN].to_string();
    let total = bytes.chunks(CHUNK_DATA_BYTES).count();
    bytes
        .chunks(CHUNK_DATA_BYTES)
        .enumerate()
        .map(|(i, data)| {
            ChunkLine {
                index: i + 1,
                total,
                container_len: bytes.len(),
                set_hash: set_hash.clone(),
                data: BASE64.encode(data),
            }
            .render()
        })
        .collect()
}

/// Reassemble container bytes from chunk lines in any order.
pub fn reconstruct<'a, I>(lines: I) -> Result<Vec<u8>, ChunkError>
where
    I: IntoIterator<Item = &'a str>,
{
    let pattern = Regex::new(LINE_PATTERN).map_err(|e| ChunkError::Malformed {
        line: 0,
        reason: e.to_string(),
    })?;

    let mut chunks: BTreeMap<usize, ChunkLine> = BTreeMap::new();
    let mut set: Option<(usize, usize, String)> = None;

    for (i, raw) in lines.into_iter().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let chunk = parse_line(&pattern, line, line_no)?;
        let key = (chunk.total, chunk.container_len, chunk.set_hash.clone());
        match &set {
            None => set = Some(key),
            Some(existing) if *existing != key => return Err(ChunkError::MixedSets),
            Some(_) => {}
        }

        if let Some(previous) = chunks.get(&chunk.index) {
            if previous.data != chunk.data {
                return Err(ChunkError::DuplicateConflict { index: chunk.index });
            }
            continue;
        }
        chunks.insert(chunk.index, chunk);
    }

    let (total, container_len, set_hash) = set.ok_or(ChunkError::Empty)?;

    let missing: Vec<String> = (1..=total)
        .filter(|i| !chunks.contains_key(i))
        .map(|i| i.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ChunkError::ChecksumMismatch {
            detail: format!("missing chunk(s) {} of {}", missing.join(", "), total),
        });
    }

    let mut bytes = Vec::with_capacity(container_len);
    for chunk in chunks.values() {
        let decoded = BASE64
            .decode(chunk.data.as_bytes())
            .map_err(|e| ChunkError::Malformed {
                line: chunk.index,
                reason: format!("base64: {}", e),
            })?;
        bytes.extend_from_slice(&decoded);
    }

    if bytes.len() != container_len {
        return Err(ChunkError::ChecksumMismatch {
            detail: format!("length {} != recorded {}", bytes.len(), container_len),
        });
    }
    let actual_hash = &sha256_hex(&bytes)[..SET_HASH_LEN];
    if actual_hash != set_hash {
        return Err(ChunkError::ChecksumMismatch {
            detail: format!("set hash {} != recorded {}", actual_hash, set_hash),
        });
    }
    Ok(bytes)
}

fn parse_line(pattern: &Regex, line: &str, line_no: usize) -> Result<ChunkLine, ChunkError> {
    let malformed = |reason: &str| ChunkError::Malformed {
        line: line_no,
        reason: reason.to_string(),
    };
    let caps = pattern
        .captures(line)
        .ok_or_else(|| malformed("not a recovery chunk line"))?;

    let number = |n: usize, what: &str| -> Result<usize, ChunkError> {
        caps[n]
            .parse::<usize>()
            .map_err(|_| malformed(&format!("{} out of range", what)))
    };
    let chunk = ChunkLine {
        index: number(1, "index")?,
        total: number(2, "total")?,
        container_len: number(3, "length")?,
        set_hash: caps[4].to_ascii_lowercase(),
        data: caps[5].to_string(),
    };
    if chunk.total == 0 || chunk.total > MAX_CHUNKS {
        return Err(malformed(&format!("total {} outside 1..={}", chunk.total, MAX_CHUNKS)));
    }
    if chunk.index == 0 || chunk.index > chunk.total {
        return Err(malformed(&format!(
            "index {} outside 1..={}",
            chunk.index, chunk.total
        )));
    }
    if chunk.container_len == 0 || chunk.container_len > MAX_CONTAINER_LEN {
        return Err(malformed(&format!(
            "length {} outside 1..={}",
            chunk.container_len, MAX_CONTAINER_LEN
        )));
    }
    // total is fixed by the length: only the last chunk may be short.
    let span = (chunk.total - 1) * CHUNK_DATA_BYTES..=chunk.total * CHUNK_DATA_BYTES;
    if chunk.container_len == *span.start() || !span.contains(&chunk.container_len) {
        return Err(malformed(&format!(
            "{} chunks cannot hold {} bytes",
            chunk.total, chunk.container_len
        )));
    }

    if crc32_hex(chunk.body().as_bytes()) != caps[6].to_ascii_lowercase() {
        return Err(ChunkError::ChunkCrc { index: chunk.index });
    }
    Ok(chunk)
}

/// Reassemble the chunk file at `chunk_file` and atomically write the
/// container to `output`. Nothing is written unless the result parses as
/// a container.
pub fn reconstruct_file(chunk_file: &Path, output: &Path) -> RecoveryResult<usize> {
    let text = fs::read_to_string(chunk_file).map_err(|e| {
        RecoveryError::io(format!("failed to read {}", chunk_file.display()), e)
    })?;

    let bytes = match reconstruct(text.lines()) {
        Ok(bytes) => bytes,
        Err(err) => {
            let reason = err.to_string();
            log_event(Event::ChunksRejected, &[("reason", reason.as_str())]);
            return Err(err.into());
        }
    };
    RecoveryContainer::from_bytes(&bytes)?;

    write_bytes_atomic(output, &bytes)?;
    let len = bytes.len().to_string();
    let shown = output.display().to_string();
    log_event(
        Event::ChunksReconstructed,
        &[("bytes", len.as_str()), ("output", shown.as_str())],
    );
    Ok(bytes.len())
}
