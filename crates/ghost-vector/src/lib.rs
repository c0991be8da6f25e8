//! Ghost Vector crate - embedding service, RediSearch index client, result
//! decoding, an in-memory cosine index, and corpus ingestion.

pub mod embedding;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod parser;

pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding, OnnxEmbeddingService};
pub use index::{IndexSchema, KnnSearch, RedisVectorIndex, VectorAttribute};
pub use ingest::{EmbeddingReport, IngestPipeline};
pub use memory::MemoryIndex;
pub use parser::{parse_search_response, ResponseFields};
