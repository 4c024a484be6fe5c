//! Semantic-boundary text chunking.
//!
//! Splits a source file into overlapping byte-window chunks suitable for
//! embedding. Split points prefer paragraph breaks, then line breaks, then
//! word breaks, so chunks keep paragraphs and code blocks intact; consecutive
//! chunks overlap so meaning that straddles a boundary is embedded twice
//! rather than lost.
//!
//! The chunk is the retrieval unit: its byte range and line number are what
//! search results point the user at.

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{BINARY_SNIFF_BYTES, MAX_CHUNK_BYTES, OVERLAP_BYTES};
use crate::error::ChunkError;

/// A contiguous slice of a source file.
///
/// `start_byte..end_byte` is the raw window in the file; `text` is that
/// window with surrounding whitespace trimmed, and is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Source file path
    pub path: PathBuf,
    /// Trimmed chunk text
    pub text: String,
    /// 1-based line number of the first non-whitespace byte in the window
    pub line_num: usize,
    /// Byte offset of the window start in the file
    pub start_byte: u64,
    /// Byte offset one past the window end
    pub end_byte: u64,
    /// Ordinal of this chunk within its file
    pub index: usize,
}

/// Chunking parameters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    /// Maximum size of a single chunk window in bytes.
    pub max_bytes: usize,
    /// How many bytes of the previous chunk to carry into the next.
    pub overlap_bytes: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_bytes: MAX_CHUNK_BYTES,
            overlap_bytes: OVERLAP_BYTES,
        }
    }
}

/// Policy deciding which files sift will index.
///
/// A file qualifies when its lowercased extension is in the allow-list and a
/// sniff of its first bytes finds no null byte. The extension set is data,
/// not code: callers may extend or replace it.
#[derive(Debug, Clone)]
pub struct SupportedFiles {
    extensions: HashSet<String>,
}

impl Default for SupportedFiles {
    fn default() -> Self {
        let extensions = [
            "md", "txt", "go", "py", "js", "ts", "rs", "c", "cpp", "h", "json", "yaml", "yml",
            "toml", "kdl", "conf",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        Self { extensions }
    }
}

impl SupportedFiles {
    /// Builds a policy from an explicit extension list (lowercase, no dots).
    pub fn from_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if the extension alone qualifies, without touching the
    /// filesystem. Used by the watcher to pre-filter event floods.
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Returns `true` if `path` should be indexed: supported extension and
    /// no null byte in the first [`BINARY_SNIFF_BYTES`] bytes.
    pub fn is_supported(&self, path: &Path) -> bool {
        self.matches_extension(path) && !is_binary(path)
    }
}

/// Sniffs the head of the file for null bytes. Unreadable files are treated
/// as binary so they fall out of the pipeline early.
fn is_binary(path: &Path) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return true;
    };
    let mut buf = [0u8; BINARY_SNIFF_BYTES];
    let mut taken = file.take(BINARY_SNIFF_BYTES as u64);
    let Ok(n) = taken.read(&mut buf) else {
        return true;
    };
    buf[..n].contains(&0)
}

/// Reads `path` and returns its overlapping semantic chunks.
pub fn chunk_file(path: &Path, opts: ChunkOptions) -> Result<Vec<Chunk>, ChunkError> {
    let data = fs::read(path).map_err(|source| ChunkError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(chunk_bytes(&data, path, opts))
}

/// Splits raw file bytes into chunks.
///
/// The cursor walks the file; each step finds the best split point in the
/// window `[start, start + max_bytes)` — the last `\n\n`, else the last `\n`,
/// else the last space, else a hard split — then backs up by `overlap_bytes`
/// (snapped forward to the next line or word boundary) for the next window.
/// The cursor always advances by at least one byte. Whitespace-only chunks
/// are dropped.
///
/// Split offsets are byte positions, so a hard split can land inside a
/// multi-byte UTF-8 sequence; chunk text is recovered lossily in that case.
pub fn chunk_bytes(data: &[u8], path: &Path, opts: ChunkOptions) -> Vec<Chunk> {
    let opts = if opts.max_bytes == 0 {
        ChunkOptions::default()
    } else {
        opts
    };

    let len = data.len();
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut chunk_idx = 0usize;
    let mut start = 0usize;

    while start < len {
        if start + opts.max_bytes >= len {
            chunks.push(make_chunk(data, path, start, len, chunk_idx));
            break;
        }

        let window = &data[start..start + opts.max_bytes];
        let split = if let Some(p) = rfind_slice(window, b"\n\n") {
            start + p + 2
        } else if let Some(p) = window.iter().rposition(|&b| b == b'\n') {
            start + p + 1
        } else if let Some(p) = window.iter().rposition(|&b| b == b' ') {
            start + p + 1
        } else {
            start + opts.max_bytes
        };

        chunks.push(make_chunk(data, path, start, split, chunk_idx));
        chunk_idx += 1;

        let mut overlap_start = split.saturating_sub(opts.overlap_bytes);
        if overlap_start <= start {
            // Guaranteed progress even when the overlap would rewind past
            // the current window start.
            overlap_start = start + 1;
        } else {
            // Snap forward so the overlap begins on a clean boundary.
            let seg = &data[overlap_start..split];
            if let Some(p) = seg.iter().position(|&b| b == b'\n') {
                overlap_start += p + 1;
            } else if let Some(p) = seg.iter().position(|&b| b == b' ') {
                overlap_start += p + 1;
            }
        }
        start = overlap_start;
    }

    chunks.retain(|c| !c.text.is_empty());
    chunks
}

fn make_chunk(data: &[u8], path: &Path, start: usize, end: usize, index: usize) -> Chunk {
    let window = &data[start..end];
    let leading_ws = window
        .iter()
        .take_while(|b| matches!(**b, b' ' | b'\t' | b'\n' | b'\r'))
        .count();
    let line_num = 1 + data[..start + leading_ws]
        .iter()
        .filter(|&&b| b == b'\n')
        .count();

    Chunk {
        path: path.to_path_buf(),
        text: String::from_utf8_lossy(window).trim().to_string(),
        line_num,
        start_byte: start as u64,
        end_byte: end as u64,
        index,
    }
}

/// Last occurrence of `needle` in `haystack`.
fn rfind_slice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}
