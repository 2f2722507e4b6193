//! Vitrine search crate - embedding service, flat vector index, catalog
//! store, and the query pipeline.
//!
//! Provides in-memory vector indexing with inner-product search, an
//! embedding service trait with ONNX and mock implementations, catalog
//! loading from CSV, and the pipeline that turns a shopper query into a
//! ranked result set.

pub mod catalog;
pub mod embedding;
pub mod index;
pub mod pipeline;

pub use catalog::{clean_html, embedding_text, CatalogStore};
pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding, OnnxEmbedder};
pub use index::{FlatIndex, IndexHit, VectorIndex};
pub use pipeline::{build_flat_index, SearchPipeline};
