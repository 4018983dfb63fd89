//! RAG Vector - Vector database abstraction
//!
//! Provides abstraction over vector databases (Qdrant, in-memory)
//! for storing and searching document embeddings, plus the clients
//! that compute those embeddings.

use async_trait::async_trait;
use rag_core::{CollectionConfig, Result, ScoredPoint, StoredPoint};

/// Trait for vector database operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Drop a collection and all its points. Absent collections are a no-op.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Create an empty collection
    async fn create_collection(&self, name: &str, config: &CollectionConfig) -> Result<()>;

    /// Insert or overwrite points in a single write
    ///
    /// With `wait` set, returns only once the write is acknowledged.
    async fn upsert(&self, name: &str, points: Vec<StoredPoint>, wait: bool) -> Result<()>;

    /// Nearest-neighbour search, best match first
    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        with_payload: bool,
    ) -> Result<Vec<ScoredPoint>>;

    /// Number of points in a collection
    async fn count(&self, name: &str) -> Result<u64>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

pub mod embedding;
pub mod memory_store;
pub mod qdrant_store;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
pub use memory_store::InMemoryStore;
pub use qdrant_store::QdrantStore;
