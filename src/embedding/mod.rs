mod batch;
mod keyword_index;
/// Embedding & Indexing
///
/// Local embedding generation plus the two index structures behind product search.
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local multilingual embedding
/// - HNSW for vector similarity search
/// - Tantivy for keyword search
/// - CatalogIndexer for batched embedding of the catalog
mod provider;
mod vector_index;

pub use batch::{CatalogIndexer, EmbeddedCatalog, IndexStats};
pub use keyword_index::{KeywordHit, KeywordIndex, KeywordIndexError, DEFAULT_WRITER_HEAP};
pub use provider::{model_dimension, EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{VectorHit, VectorIndex, VectorIndexError};
