//! Caches skill descriptors fetched from the skills host and exposes exact
//! and embedding-indexed lookup.

mod embeddings;
mod error;
mod registry;
mod types;

pub use embeddings::{cosine_similarity, EmbeddingError, EmbeddingProvider, HashEmbeddingProvider, LruEmbeddingCache, EMBEDDING_DIM};
pub use error::RegistryError;
pub use registry::SkillRegistry;
pub use types::{ParamType, SkillDescriptor, SkillParameter, TransportMethod};
