//! RAG Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the pipeline:
//! - Stored points, point identifiers and search hits
//! - Collection configuration (dimension, distance metric)
//! - Common error types
//! - Shared trait for generation backends
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, CorpusConfig, DatabaseConfig, EmptyContextPolicy, IdPolicy,
    LlmConfig, LlmProvider, LoggingConfig, RagConfig,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Payload key under which the original document text is stored
pub const TEXT_PAYLOAD_KEY: &str = "text";

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for pipeline operations
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// Vector Store Models
// ============================================================================

/// Identifier of a stored point
///
/// Vector stores accept either unsigned integers or UUIDs as point ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(Uuid),
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl From<u64> for PointId {
    fn from(n: u64) -> Self {
        Self::Num(n)
    }
}

impl From<Uuid> for PointId {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

/// Arbitrary JSON payload attached to a point
pub type Payload = HashMap<String, serde_json::Value>;

/// A point written to a collection: identifier, embedding and payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPoint {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

impl StoredPoint {
    /// Create a point whose payload holds the original document text
    pub fn from_document(id: PointId, vector: Vec<f32>, text: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert(
            TEXT_PAYLOAD_KEY.to_string(),
            serde_json::Value::String(text.into()),
        );
        Self {
            id,
            vector,
            payload,
        }
    }

    /// Original document text, if present in the payload
    pub fn text(&self) -> Option<&str> {
        self.payload.get(TEXT_PAYLOAD_KEY).and_then(|v| v.as_str())
    }
}

/// A search hit returned by a nearest-neighbour query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,

    /// Similarity score (higher is better for every supported metric)
    pub score: f32,

    /// Payload, only present when requested
    pub payload: Option<Payload>,
}

impl ScoredPoint {
    /// Original document text, if the payload was requested and holds one
    pub fn text(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.get(TEXT_PAYLOAD_KEY))
            .and_then(|v| v.as_str())
    }
}

/// Distance metric a collection is configured with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Dot-product similarity
    #[default]
    Dot,
    Cosine,
    #[serde(alias = "euclidean")]
    Euclid,
}

impl Distance {
    /// Convert a raw engine score into a similarity where higher is nearer
    ///
    /// Dot and cosine scores already grow with similarity; a Euclidean score
    /// is a distance and is negated.
    pub fn similarity(self, raw: f32) -> f32 {
        match self {
            Self::Dot | Self::Cosine => raw,
            Self::Euclid => -raw,
        }
    }
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dot => write!(f, "dot"),
            Self::Cosine => write!(f, "cosine"),
            Self::Euclid => write!(f, "euclid"),
        }
    }
}

impl std::str::FromStr for Distance {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dot" => Ok(Self::Dot),
            "cosine" => Ok(Self::Cosine),
            "euclid" | "euclidean" => Ok(Self::Euclid),
            _ => Err(ConfigError::InvalidValue {
                key: "VECTOR_DISTANCE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration a collection is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Vector dimension (must match embedding model)
    pub dimension: usize,

    /// Distance metric
    pub distance: Distance,
}

impl CollectionConfig {
    pub fn new(dimension: usize, distance: Distance) -> Self {
        Self {
            dimension,
            distance,
        }
    }

    /// Reject vectors whose length differs from the configured dimension
    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Retrieval Models
// ============================================================================

/// The document selected to ground a generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: PointId,
    pub text: String,
    pub score: f32,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response (non-streaming)
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier used for generation
    fn model(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_from_document() {
        let point = StoredPoint::from_document(PointId::Num(3), vec![0.1, 0.2], "Llamas");
        assert_eq!(point.text(), Some("Llamas"));
        assert_eq!(
            point.payload.get(TEXT_PAYLOAD_KEY),
            Some(&serde_json::json!("Llamas"))
        );
    }

    #[test]
    fn test_scored_point_without_payload() {
        let hit = ScoredPoint {
            id: PointId::Num(0),
            score: 0.9,
            payload: None,
        };
        assert_eq!(hit.text(), None);
    }

    #[test]
    fn test_point_id_display() {
        assert_eq!(PointId::Num(42).to_string(), "42");
        let u = Uuid::nil();
        assert_eq!(
            PointId::Uuid(u).to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_distance_parse() {
        assert_eq!("dot".parse::<Distance>().unwrap(), Distance::Dot);
        assert_eq!("Cosine".parse::<Distance>().unwrap(), Distance::Cosine);
        assert_eq!("euclidean".parse::<Distance>().unwrap(), Distance::Euclid);
        assert!("manhattan".parse::<Distance>().is_err());
    }

    #[test]
    fn test_distance_deserialize_alias() {
        let d: Distance = serde_json::from_str("\"euclidean\"").unwrap();
        assert_eq!(d, Distance::Euclid);
        let d: Distance = serde_json::from_str("\"euclid\"").unwrap();
        assert_eq!(d, Distance::Euclid);
    }

    #[test]
    fn test_similarity_orders_nearer_first() {
        assert_eq!(Distance::Dot.similarity(0.8), 0.8);
        assert_eq!(Distance::Cosine.similarity(-0.3), -0.3);

        let near = Distance::Euclid.similarity(0.2);
        let far = Distance::Euclid.similarity(5.0);
        assert_eq!(near, -0.2);
        assert!(near > far);
    }

    #[test]
    fn test_dimension_check() {
        let config = CollectionConfig::new(3, Distance::Dot);
        assert!(config.check_dimension(&[1.0, 2.0, 3.0]).is_ok());

        match config.check_dimension(&[1.0, 2.0]) {
            Err(RagError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("expected dimension mismatch, got {other:?}"),
        }
    }
}
