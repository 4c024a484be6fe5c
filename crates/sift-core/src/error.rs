//! Error types for sift-core.
//!
//! Each subsystem gets its own enum. Per-file problems during a directory
//! walk (unreadable file, embed failure, binary content) are diagnosed and
//! recovered locally by the indexer and never appear here; these types cover
//! what is actually surfaced to callers.

use thiserror::Error;

/// Errors surfaced by the HNSW graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A vector of the wrong dimension was presented to the graph.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension established by the first inserted vector
        expected: usize,
        /// Dimension of the offending vector
        actual: usize,
    },
    /// The graph file failed to parse (bad magic, truncated body).
    #[error("corrupt graph file: {0}")]
    CorruptIndex(String),
    /// The graph file was written by an incompatible format version.
    #[error("unsupported graph format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the file header
        found: u16,
        /// Version this build reads and writes
        expected: u16,
    },
    /// I/O failure while reading or writing the graph file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while chunking a source file.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Failed to read the source file.
    #[error("read {path}: {source}")]
    Io {
        /// Path of the file being chunked
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Failed to load model weights, config, or tokenizer from disk.
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    /// Failed to tokenize input text.
    #[error("tokenization failed: {0}")]
    Tokenization(String),
    /// Forward pass through the model failed.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl From<candle_core::Error> for EmbedError {
    fn from(err: candle_core::Error) -> Self {
        EmbedError::Inference(err.to_string())
    }
}

/// Errors surfaced by the indexer.
#[derive(Debug, Error)]
pub enum IndexError {
    /// `meta.json` failed to parse, or it disagrees with `hnsw.bin` on the
    /// node count. The index must be rebuilt.
    #[error("corrupt index: {0} — run `sift rebuild` to recreate it")]
    CorruptIndex(String),
    /// The cancellation token fired before the operation completed.
    #[error("indexing cancelled")]
    Cancelled,
    /// Graph-level failure (corrupt file, version or dimension mismatch).
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Embedding the search query failed.
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),
    /// The index lock was poisoned by a panicked thread.
    #[error("index lock poisoned by a panicked thread")]
    LockPoisoned,
    /// Unrecoverable I/O failure (index directory, flush target).
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Metadata (de)serialization failure while flushing.
    #[error("metadata serialization: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    /// True if this error is a cancellation rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IndexError::Cancelled)
    }
}
