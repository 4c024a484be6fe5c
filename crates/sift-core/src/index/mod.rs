//! The sift index: chunk metadata, the HNSW graph, and the mtime skip-cache,
//! orchestrated behind a single reader-writer lock.
//!
//! Ingest pipeline: directory walk → skip-cache check → chunker → embedder
//! (batched, cancellable) → graph insert + metadata append → periodic flush.
//! Query pipeline: embed query → graph search → exact chunk re-read →
//! hybrid keyword re-rank → per-path deduplication.
//!
//! Locking: embedding and all source-file I/O happen outside the lock. The
//! lock is taken shared for `search`, `stats`, and the skip-cache pre-check,
//! and exclusive only for the final append, rebuild, and flush. A query that
//! begins after an insert completes sees the inserted node; one that begins
//! before sees neither the node nor any edges that insert added.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::chunking::{self, ChunkOptions, SupportedFiles};
use crate::config::{
    DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH, DEFAULT_M, EMBED_BATCH_SIZE, FETCH_MULTIPLIER,
    KEYWORD_BOOST, MIN_KEYWORD_LEN, PREVIEW_MAX_CHARS,
};
use crate::embedding::TextEmbedder;
use crate::error::IndexError;
use crate::hnsw::Graph;

const HNSW_FILE: &str = "hnsw.bin";
const META_FILE: &str = "meta.json";

/// Provenance of one indexed chunk. The record at position `i` in the
/// metadata array describes graph node `i`; records are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Source file path
    pub path: PathBuf,
    /// 1-based line number of the chunk start
    pub line_num: usize,
    /// Byte offset of the chunk window start
    pub start_byte: u64,
    /// Byte offset one past the chunk window end
    pub end_byte: u64,
    /// Ordinal of the chunk within its file
    pub chunk_index: usize,
    /// Text preview, at most [`PREVIEW_MAX_CHARS`] characters
    pub text: String,
    /// Source file modification time at index time, Unix milliseconds
    pub mtime: u64,
}

/// A single search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Chunk provenance
    pub meta: ChunkMeta,
    /// Hybrid score: cosine similarity plus keyword boost
    pub score: f32,
}

/// Summary statistics about the index.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Total indexed chunks (= graph nodes)
    pub num_chunks: usize,
    /// Distinct source files
    pub num_files: usize,
    /// On-disk size of `hnsw.bin` + `meta.json`, KiB
    pub index_size_kb: u64,
    /// Wall-clock time of the last mutation, if any happened this session
    pub last_updated: Option<SystemTime>,
}

/// Outcome of [`Index::add_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The file's chunks were embedded and added to the index.
    Added,
    /// The file was not ingested: unsupported, unreadable, too large,
    /// unchanged since the last ingest, or its embedding failed.
    Skipped,
}

/// Progress callback for directory ingestion: `(done, total, path, skipped)`.
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize, &Path, bool) + Sync);

/// Everything the lock guards. Mutated only under the write half.
struct IndexState {
    graph: Graph,
    chunks: Vec<ChunkMeta>,
    /// path → mtime (Unix ms) of the version already in the index
    file_cache: HashMap<PathBuf, u64>,
    dirty: bool,
    last_updated: Option<SystemTime>,
}

/// The index handle. Cheap to share behind an `Arc`; all methods take
/// `&self` and are safe to call concurrently.
pub struct Index {
    dir: PathBuf,
    embedder: Arc<dyn TextEmbedder>,
    supported: SupportedFiles,
    max_file_bytes: u64,
    state: RwLock<IndexState>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("dir", &self.dir)
            .field("max_file_bytes", &self.max_file_bytes)
            .finish_non_exhaustive()
    }
}

impl Index {
    /// Opens (or creates) the index stored in `dir`.
    ///
    /// Loads `meta.json` and `hnsw.bin` when present; the two must agree on
    /// the node count. The mtime skip-cache is reconstructed from the loaded
    /// metadata (max mtime per path).
    ///
    /// # Errors
    ///
    /// `CorruptIndex` if either file fails to parse or they disagree on the
    /// node count.
    pub fn open(
        dir: &Path,
        embedder: Arc<dyn TextEmbedder>,
        max_file_kb: u64,
    ) -> Result<Self, IndexError> {
        fs::create_dir_all(dir)?;

        let meta_path = dir.join(META_FILE);
        let chunks: Vec<ChunkMeta> = if meta_path.exists() {
            let data = fs::read(&meta_path)?;
            serde_json::from_slice(&data)
                .map_err(|e| IndexError::CorruptIndex(format!("meta.json: {e}")))?
        } else {
            Vec::new()
        };

        let hnsw_path = dir.join(HNSW_FILE);
        let graph = if hnsw_path.exists() {
            Graph::load(&hnsw_path)?
        } else {
            Graph::new(DEFAULT_M, DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH)
        };

        if graph.len() != chunks.len() {
            return Err(IndexError::CorruptIndex(format!(
                "hnsw.bin has {} nodes but meta.json has {} records",
                graph.len(),
                chunks.len()
            )));
        }

        let mut file_cache: HashMap<PathBuf, u64> = HashMap::new();
        for c in &chunks {
            let entry = file_cache.entry(c.path.clone()).or_insert(c.mtime);
            if c.mtime > *entry {
                *entry = c.mtime;
            }
        }

        info!(
            chunks = chunks.len(),
            files = file_cache.len(),
            "opened index at {}",
            dir.display()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            embedder,
            supported: SupportedFiles::default(),
            max_file_bytes: max_file_kb * 1024,
            state: RwLock::new(IndexState {
                graph,
                chunks,
                file_cache,
                dirty: false,
                last_updated: None,
            }),
        })
    }

    /// Chunks, embeds, and indexes a single file.
    ///
    /// Unsupported, unreadable, oversized, and embed-failing files are
    /// diagnosed on the log and reported as [`AddOutcome::Skipped`] — they
    /// are not errors. A file whose mtime matches the skip-cache is skipped
    /// without re-embedding.
    ///
    /// The token is checked before each embed batch; on cancellation the
    /// file is left out entirely (indexed as a whole or not at all).
    pub fn add_file(&self, token: &CancelToken, path: &Path) -> Result<AddOutcome, IndexError> {
        if !self.supported.is_supported(path) {
            debug!("skip {}: unsupported", path.display());
            return Ok(AddOutcome::Skipped);
        }

        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                warn!("skip {}: stat failed: {e}", path.display());
                return Ok(AddOutcome::Skipped);
            }
        };
        if metadata.len() > self.max_file_bytes {
            warn!(
                "skip {}: file too large ({} KB > {} KB limit)",
                path.display(),
                metadata.len() / 1024,
                self.max_file_bytes / 1024
            );
            return Ok(AddOutcome::Skipped);
        }

        let mtime = mtime_millis(&metadata);
        {
            let state = self.read_state()?;
            if state.file_cache.get(path) == Some(&mtime) {
                return Ok(AddOutcome::Skipped);
            }
        }

        let chunks = match chunking::chunk_file(path, ChunkOptions::default()) {
            Ok(c) => c,
            Err(e) => {
                warn!("skip {}: chunk error: {e}", path.display());
                return Ok(AddOutcome::Skipped);
            }
        };
        if chunks.is_empty() {
            return Ok(AddOutcome::Added);
        }

        // Embedding runs outside the lock; concurrent searches proceed.
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            if token.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            match self.embedder.embed_docs(&texts) {
                Ok(vecs) => vectors.extend(vecs),
                Err(e) => {
                    warn!("skip {}: embed error: {e}", path.display());
                    return Ok(AddOutcome::Skipped);
                }
            }
        }

        let mut state = self.write_state()?;
        for (chunk, vec) in chunks.iter().zip(vectors) {
            state.chunks.push(ChunkMeta {
                path: path.to_path_buf(),
                line_num: chunk.line_num,
                start_byte: chunk.start_byte,
                end_byte: chunk.end_byte,
                chunk_index: chunk.index,
                text: preview(&chunk.text),
                mtime,
            });
            state.graph.insert(vec)?;
        }
        state.file_cache.insert(path.to_path_buf(), mtime);
        state.dirty = true;
        state.last_updated = Some(SystemTime::now());

        Ok(AddOutcome::Added)
    }

    /// Walks `root` and indexes every supported file in it.
    ///
    /// Two passes: eligible paths are collected first (hidden directories
    /// and files skipped) so the progress callback knows the total, then
    /// each file goes through [`add_file`](Self::add_file). The token is
    /// checked before each file; on cancellation the files already completed
    /// are flushed before `Cancelled` is surfaced.
    pub fn index_dir(
        &self,
        token: &CancelToken,
        root: &Path,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<(), IndexError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = entry.map_err(|e| {
                IndexError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::other(format!("walk {}", root.display()))
                }))
            })?;
            if entry.file_type().is_file() && self.supported.is_supported(entry.path()) {
                paths.push(entry.into_path());
            }
        }

        let total = paths.len();
        for (i, path) in paths.iter().enumerate() {
            if token.is_cancelled() {
                self.flush()?;
                return Err(IndexError::Cancelled);
            }
            let outcome = match self.add_file(token, path) {
                Ok(outcome) => outcome,
                Err(IndexError::Cancelled) => {
                    self.flush()?;
                    return Err(IndexError::Cancelled);
                }
                Err(e) => return Err(e),
            };
            if let Some(cb) = progress {
                cb(i + 1, total, path, outcome == AddOutcome::Skipped);
            }
        }
        Ok(())
    }

    /// Discards the graph, metadata, and skip-cache, then re-ingests `root`
    /// from scratch.
    pub fn rebuild_from_dir(
        &self,
        token: &CancelToken,
        root: &Path,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<(), IndexError> {
        {
            let mut state = self.write_state()?;
            state.chunks.clear();
            state.graph = Graph::new(DEFAULT_M, DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH);
            state.file_cache.clear();
            state.dirty = true;
            info!("rebuilding index from {}", root.display());
        }
        self.index_dir(token, root, progress)
    }

    /// Returns the top-`k` chunks for `query`, hybrid-ranked and
    /// deduplicated to at most one result per source file.
    ///
    /// The dense score from the graph is boosted by [`KEYWORD_BOOST`] for
    /// each query word (longer than [`MIN_KEYWORD_LEN`]) appearing in the
    /// chunk's exact text, re-read from the source file. Unreadable files
    /// keep their raw similarity. Dedup runs after the re-rank so the
    /// boosted ordering decides which chunk represents a file.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, IndexError> {
        let query_vec = self.embedder.embed_query(query)?;

        let mut scored: Vec<(ChunkMeta, f32)> = {
            let state = self.read_state()?;
            let fetch_k = (k * FETCH_MULTIPLIER).min(state.chunks.len());
            if fetch_k == 0 {
                return Ok(Vec::new());
            }
            let hits = state.graph.search(&query_vec, fetch_k)?;
            hits.iter()
                .filter(|h| (h.id as usize) < state.chunks.len())
                .map(|h| (state.chunks[h.id as usize].clone(), h.score))
                .collect()
        };

        // Keyword boost over exact chunk bytes, read outside the lock.
        let query_words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .filter(|w| w.len() > MIN_KEYWORD_LEN)
            .collect();
        for (meta, score) in &mut scored {
            match read_range(&meta.path, meta.start_byte, meta.end_byte) {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).to_lowercase();
                    let matches = query_words.iter().filter(|w| text.contains(w.as_str())).count();
                    *score += matches as f32 * KEYWORD_BOOST;
                }
                Err(e) => {
                    debug!("no keyword boost for {}: {e}", meta.path.display());
                }
            }
        }

        // Stable sort keeps the graph's ordering on ties.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut results = Vec::with_capacity(k);
        let mut seen_paths: HashSet<PathBuf> = HashSet::new();
        for (meta, score) in scored {
            if results.len() >= k {
                break;
            }
            if !seen_paths.insert(meta.path.clone()) {
                continue;
            }
            results.push(SearchResult { meta, score });
        }
        Ok(results)
    }

    /// Writes `hnsw.bin` and `meta.json` if the index is dirty.
    ///
    /// Each file is written to a sibling temp file and renamed into place,
    /// so an interrupted flush leaves the previous index intact.
    pub fn flush(&self) -> Result<(), IndexError> {
        {
            let state = self.read_state()?;
            if !state.dirty {
                return Ok(());
            }
        }

        let mut state = self.write_state()?;

        let hnsw_path = self.dir.join(HNSW_FILE);
        let hnsw_tmp = self.dir.join(format!("{HNSW_FILE}.tmp"));
        state.graph.save(&hnsw_tmp)?;
        fs::rename(&hnsw_tmp, &hnsw_path)?;

        let meta_path = self.dir.join(META_FILE);
        let meta_tmp = self.dir.join(format!("{META_FILE}.tmp"));
        let data = serde_json::to_vec_pretty(&state.chunks)?;
        fs::write(&meta_tmp, data)?;
        fs::rename(&meta_tmp, &meta_path)?;

        state.dirty = false;
        info!(chunks = state.chunks.len(), "flushed index to {}", self.dir.display());
        Ok(())
    }

    /// Summary statistics for the `stats` command.
    pub fn stats(&self) -> Result<Stats, IndexError> {
        let state = self.read_state()?;

        let files: HashSet<&PathBuf> = state.chunks.iter().map(|c| &c.path).collect();
        let mut size_bytes = 0;
        for name in [HNSW_FILE, META_FILE] {
            if let Ok(md) = fs::metadata(self.dir.join(name)) {
                size_bytes += md.len();
            }
        }

        Ok(Stats {
            num_chunks: state.chunks.len(),
            num_files: files.len(),
            index_size_kb: size_bytes / 1024,
            last_updated: state.last_updated,
        })
    }

    /// Flushes dirty state and releases the embedder.
    pub fn close(self) -> Result<(), IndexError> {
        self.flush()
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, IndexState>, IndexError> {
        self.state.read().map_err(|_| IndexError::LockPoisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, IndexState>, IndexError> {
        self.state.write().map_err(|_| IndexError::LockPoisoned)
    }
}

/// Dotfiles and dot-directories are invisible to the walker, except the walk
/// root itself (which may legitimately be `.`).
fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Modification time as Unix milliseconds; 0 for files predating the epoch.
fn mtime_millis(metadata: &fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Truncates chunk text to the metadata preview length, on a char boundary.
fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(PREVIEW_MAX_CHARS - 3).collect();
    out.push_str("...");
    out
}

/// Random-access read of `[start, end)` from the source file.
fn read_range(path: &Path, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; (end - start) as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
