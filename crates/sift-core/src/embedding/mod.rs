//! Text embedding: the capability trait the indexer consumes, and the
//! BGE-small-en-v1.5 implementation the CLI wires in.

mod model;
mod traits;

pub use model::BgeEmbedder;
pub use traits::TextEmbedder;
