//! The embedder capability trait.
//!
//! The indexer depends on this trait, not on a concrete model, so it can be
//! exercised in tests with a deterministic stub and the model stack can be
//! swapped without touching the engine.

use crate::error::EmbedError;

/// A text embedding model producing L2-normalised vectors.
///
/// Document and query embeddings are asymmetric: retrieval models are
/// typically trained with an instruction applied to the query side only, so
/// callers must route document chunks through [`embed_docs`](Self::embed_docs)
/// and search queries through [`embed_query`](Self::embed_query) — never mix
/// the two.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the indexer calls them from
/// whichever thread runs an ingest or a query, outside its own lock.
pub trait TextEmbedder: Send + Sync {
    /// Returns the embedding dimension. Every vector produced by this
    /// embedder has this length.
    fn dim(&self) -> usize;

    /// Embeds a batch of document chunk texts, one vector per input, in
    /// input order.
    fn embed_docs(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embeds a single search query.
    fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbedError>;
}
