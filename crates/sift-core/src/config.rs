//! Production configuration constants.
//!
//! These values define the canonical sift configuration and are shared by
//! the engine, the CLI, and the tests so they never drift apart.

// =============================================================================
// Embedding model (BGE-small-en-v1.5)
// =============================================================================

/// Embedding vector dimension (BGE-small hidden size).
///
/// Every vector stored in the graph has this length. The dimension is fixed
/// for the lifetime of an index.
pub const EMBEDDING_DIM: usize = 384;

/// Maximum tokens fed to the model per input.
///
/// BGE-small supports 512 tokens, but capping at 256 halves the attention
/// matrix and is plenty for 1200-byte chunks.
pub const MAX_SEQ_LEN: usize = 256;

/// Number of chunk texts embedded per inference call.
///
/// Keeps memory and per-call latency bounded on low-end CPUs, and bounds how
/// long a cancellation request can go unnoticed inside `add_file`.
pub const EMBED_BATCH_SIZE: usize = 4;

// =============================================================================
// HNSW graph
// =============================================================================

/// Base number of bi-directional connections per node per layer.
/// Layer 0 allows `2 * DEFAULT_M`.
pub const DEFAULT_M: usize = 16;

/// Candidate pool size during insertion.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Candidate pool size during search.
pub const DEFAULT_EF_SEARCH: usize = 50;

/// Seed for the graph's level-sampling RNG.
///
/// Fixed so that identical insertion sequences produce bit-identical graphs
/// across runs.
pub const GRAPH_RNG_SEED: u64 = 42;

// =============================================================================
// Chunking
// =============================================================================

/// Maximum size of a single chunk window in bytes (~250-300 tokens).
pub const MAX_CHUNK_BYTES: usize = 1200;

/// Bytes of the previous chunk carried into the next one.
pub const OVERLAP_BYTES: usize = 250;

/// How many leading bytes are sniffed for null bytes to detect binary files.
pub const BINARY_SNIFF_BYTES: usize = 512;

// =============================================================================
// Indexer
// =============================================================================

/// Maximum characters kept in the metadata text preview.
pub const PREVIEW_MAX_CHARS: usize = 200;

/// Additive score bonus per query word found in the chunk text.
pub const KEYWORD_BOOST: f32 = 0.05;

/// Query words at or below this length are ignored by the keyword re-ranker.
pub const MIN_KEYWORD_LEN: usize = 2;

/// How many graph hits to fetch per requested result, giving the per-path
/// deduplication pass headroom when top hits cluster in one file.
pub const FETCH_MULTIPLIER: usize = 5;

/// Default cap on indexable file size, in KiB. Larger files are almost
/// certainly generated data rather than source or documentation.
pub const DEFAULT_MAX_FILE_KB: u64 = 512;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_dim_matches_bge_small() {
        assert_eq!(EMBEDDING_DIM, 384);
    }

    #[test]
    fn test_overlap_smaller_than_window() {
        assert!(OVERLAP_BYTES < MAX_CHUNK_BYTES);
    }

    #[test]
    fn test_ef_search_covers_default_k() {
        // The CLI asks for 10 results; ef_search must not undercut that.
        assert!(DEFAULT_EF_SEARCH >= 10);
    }
}
