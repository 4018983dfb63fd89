//! In-memory vector store
//!
//! Keeps collections in a `HashMap` behind a `tokio::sync::RwLock`.
//! Scores with the same metrics Qdrant offers and enforces the collection
//! dimension on every write and query. Used for tests and offline runs.

use async_trait::async_trait;
use rag_core::{CollectionConfig, Distance, PointId, RagError, Result, ScoredPoint, StoredPoint};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

struct Collection {
    config: CollectionConfig,
    points: HashMap<PointId, StoredPoint>,
}

/// In-memory vector store implementation
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers stored in a collection, sorted
    pub async fn ids(&self, name: &str) -> Result<Vec<PointId>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        let mut ids: Vec<PointId> = collection.points.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    /// Whether a collection exists
    pub async fn has_collection(&self, name: &str) -> bool {
        self.collections.read().await.contains_key(name)
    }
}

/// Similarity between two vectors; higher is closer for every metric
fn similarity(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Dot => dot(a, b),
        Distance::Cosine => {
            let norm_a = dot(a, a).sqrt();
            let norm_b = dot(b, b).sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                return 0.0;
            }
            dot(a, b) / (norm_a * norm_b)
        }
        Distance::Euclid => distance.similarity(
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        ),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[async_trait]
impl super::VectorStore for InMemoryStore {
    async fn delete_collection(&self, name: &str) -> Result<()> {
        let removed = self.collections.write().await.remove(name).is_some();
        debug!(collection = name, removed, "deleted in-memory collection");
        Ok(())
    }

    async fn create_collection(&self, name: &str, config: &CollectionConfig) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(RagError::DatabaseError(format!(
                "Collection `{name}` already exists"
            )));
        }

        collections.insert(
            name.to_string(),
            Collection {
                config: *config,
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<StoredPoint>, _wait: bool) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        // Validate the whole batch first so a bad vector leaves the collection untouched
        for point in &points {
            collection.config.check_dimension(&point.vector)?;
        }

        let count = points.len();
        for point in points {
            collection.points.insert(point.id, point);
        }

        debug!(collection = name, count, "upserted points in memory");
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        with_payload: bool,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        collection.config.check_dimension(vector)?;

        let mut hits: Vec<ScoredPoint> = collection
            .points
            .values()
            .map(|point| ScoredPoint {
                id: point.id,
                score: similarity(collection.config.distance, &point.vector, vector),
                payload: with_payload.then(|| point.payload.clone()),
            })
            .collect();

        // Ties broken by id for deterministic results
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, name: &str) -> Result<u64> {
        let collections = self.collections.read().await;
        collections
            .get(name)
            .map(|c| c.points.len() as u64)
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VectorStore;

    fn point(id: u64, vector: Vec<f32>, text: &str) -> StoredPoint {
        StoredPoint::from_document(PointId::Num(id), vector, text)
    }

    async fn seeded(distance: Distance) -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .create_collection("docs", &CollectionConfig::new(2, distance))
            .await
            .unwrap();
        store
            .upsert(
                "docs",
                vec![
                    point(0, vec![1.0, 0.0], "east"),
                    point(1, vec![0.0, 1.0], "north"),
                    point(2, vec![3.0, 3.0], "far north-east"),
                ],
                true,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_delete_missing_collection_is_noop() {
        let store = InMemoryStore::new();
        assert!(store.delete_collection("missing").await.is_ok());
    }

    #[tokio::test]
    async fn test_recreate_drops_points() {
        let store = seeded(Distance::Dot).await;
        assert_eq!(store.count("docs").await.unwrap(), 3);

        store.delete_collection("docs").await.unwrap();
        assert!(!store.has_collection("docs").await);

        store
            .create_collection("docs", &CollectionConfig::new(2, Distance::Dot))
            .await
            .unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_existing_collection_fails() {
        let store = seeded(Distance::Dot).await;
        let result = store
            .create_collection("docs", &CollectionConfig::new(2, Distance::Dot))
            .await;
        assert!(matches!(result, Err(RagError::DatabaseError(_))));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_id() {
        let store = seeded(Distance::Dot).await;
        store
            .upsert("docs", vec![point(1, vec![0.0, 2.0], "north again")], true)
            .await
            .unwrap();

        assert_eq!(store.count("docs").await.unwrap(), 3);
        let hits = store.query("docs", &[0.0, 1.0], 1, true).await.unwrap();
        assert_eq!(hits[0].text(), Some("far north-east"));
        let hits = store.query("docs", &[-1.0, 1.0], 1, true).await.unwrap();
        assert_eq!(hits[0].text(), Some("north again"));
    }

    #[tokio::test]
    async fn test_dot_prefers_magnitude() {
        let store = seeded(Distance::Dot).await;
        let hits = store.query("docs", &[1.0, 0.1], 3, false).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, PointId::Num(2));
        assert!(hits[0].payload.is_none());
    }

    #[tokio::test]
    async fn test_cosine_ignores_magnitude() {
        let store = seeded(Distance::Cosine).await;
        let hits = store.query("docs", &[1.0, 0.1], 1, true).await.unwrap();
        assert_eq!(hits[0].id, PointId::Num(0));
        assert_eq!(hits[0].text(), Some("east"));
    }

    #[tokio::test]
    async fn test_euclid_prefers_nearest() {
        let store = seeded(Distance::Euclid).await;
        let hits = store.query("docs", &[2.5, 2.5], 2, true).await.unwrap();
        assert_eq!(hits[0].id, PointId::Num(2));
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = seeded(Distance::Dot).await;

        let result = store
            .upsert(
                "docs",
                vec![
                    point(9, vec![1.0, 1.0], "ok"),
                    point(10, vec![1.0, 1.0, 1.0], "too long"),
                ],
                true,
            )
            .await;
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert_eq!(store.count("docs").await.unwrap(), 3);

        let result = store.query("docs", &[1.0], 1, true).await;
        assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_missing_collection_errors() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.query("nope", &[1.0], 1, true).await,
            Err(RagError::CollectionNotFound(_))
        ));
        assert!(matches!(
            store.upsert("nope", vec![], true).await,
            Err(RagError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_collection_returns_nothing() {
        let store = InMemoryStore::new();
        store
            .create_collection("empty", &CollectionConfig::new(2, Distance::Dot))
            .await
            .unwrap();
        let hits = store.query("empty", &[1.0, 0.0], 1, true).await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_similarity_metrics() {
        assert_eq!(similarity(Distance::Dot, &[1.0, 2.0], &[3.0, 4.0]), 11.0);
        assert_eq!(similarity(Distance::Cosine, &[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((similarity(Distance::Cosine, &[2.0, 0.0], &[5.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(similarity(Distance::Euclid, &[0.0, 0.0], &[3.0, 4.0]), -5.0);
    }
}
