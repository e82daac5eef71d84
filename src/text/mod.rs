//! Document text handling: normalization and chunking.

mod chunker;
mod document;
mod normalizer;

pub use chunker::{Chunk, Chunker, ChunkerConfig, DEFAULT_MAX_CHUNK_LEN, LengthUnit};
pub use document::{Document, DocumentFormat, DocumentMeta};
pub use normalizer::normalize;
