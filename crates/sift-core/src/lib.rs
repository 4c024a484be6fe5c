//! # Sift Core
//!
//! Local, offline semantic file search: the retrieval engine behind the
//! `sift` CLI.
//!
//! Files are split into overlapping chunks on semantic boundaries, embedded
//! into L2-normalised 384-dimensional vectors, and indexed in a from-scratch
//! HNSW graph. Queries run entirely on the local CPU; no network is involved.
//!
//! ## Modules
//!
//! - [`chunking`] - Semantic-boundary chunker and supported-file policy
//! - [`hnsw`] - HNSW approximate nearest-neighbour graph with binary persistence
//! - [`embedding`] - Text embedder capability trait and BGE-small implementation
//! - [`index`] - The indexer: metadata store, skip-cache, hybrid search
//! - [`cancel`] - Cancellation token threaded through long-running operations
//! - [`config`] - Production configuration constants
//! - [`error`] - Error types for the graph, chunker, embedder, and indexer

pub mod cancel;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod hnsw;
pub mod index;
pub mod test_utils;

pub use cancel::CancelToken;
pub use chunking::{Chunk, ChunkOptions, SupportedFiles};
pub use embedding::{BgeEmbedder, TextEmbedder};
pub use error::{ChunkError, EmbedError, GraphError, IndexError};
pub use hnsw::Graph;
pub use index::{AddOutcome, ChunkMeta, Index, SearchResult, Stats};
