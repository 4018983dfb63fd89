//! Qdrant implementation for vector storage
//!
//! Provides connection management, collection lifecycle and
//! point operations for document embeddings.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorParamsKind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance as QdrantDistance,
    PointId as QdrantPointId, PointStruct, ScoredPoint as QdrantScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload as QdrantPayload, Qdrant};
use rag_core::{
    CollectionConfig, DatabaseConfig, Distance, Payload, PointId, RagError, Result, ScoredPoint,
    StoredPoint,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Qdrant vector store implementation
///
/// Qdrant reports Euclidean scores as distances, so the metric of each
/// collection is remembered to normalise search scores.
pub struct QdrantStore {
    client: Qdrant,
    metrics: RwLock<HashMap<String, Distance>>,
}

impl QdrantStore {
    /// Create a new Qdrant connection
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| RagError::DatabaseError(format!("Qdrant connection failed: {e}")))?;

        Ok(Self::from_client(client))
    }

    /// Create from config
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::new(&config.qdrant_url)
    }

    /// Create from an existing client
    pub fn from_client(client: Qdrant) -> Self {
        Self {
            client,
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Distance metric of a collection, asking Qdrant when it was created elsewhere
    async fn collection_distance(&self, name: &str) -> Result<Distance> {
        if let Some(distance) = self.metrics.read().await.get(name) {
            return Ok(*distance);
        }

        let info = self.client.collection_info(name).await.map_err(|e| {
            RagError::SearchError(format!("Failed to get collection info for '{name}': {e}"))
        })?;

        let params = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        let raw = match params {
            Some(VectorParamsKind::Params(params)) => params.distance,
            _ => {
                return Err(RagError::SearchError(format!(
                    "Collection '{name}' has no single unnamed vector configuration"
                )))
            }
        };

        let distance = QdrantDistance::try_from(raw)
            .ok()
            .and_then(from_qdrant_distance)
            .ok_or_else(|| {
                RagError::SearchError(format!("Unsupported distance metric in '{name}': {raw}"))
            })?;

        self.metrics
            .write()
            .await
            .insert(name.to_string(), distance);
        Ok(distance)
    }
}

fn to_qdrant_distance(distance: Distance) -> QdrantDistance {
    match distance {
        Distance::Dot => QdrantDistance::Dot,
        Distance::Cosine => QdrantDistance::Cosine,
        Distance::Euclid => QdrantDistance::Euclid,
    }
}

fn from_qdrant_distance(distance: QdrantDistance) -> Option<Distance> {
    match distance {
        QdrantDistance::Dot => Some(Distance::Dot),
        QdrantDistance::Cosine => Some(Distance::Cosine),
        QdrantDistance::Euclid => Some(Distance::Euclid),
        _ => None,
    }
}

fn to_qdrant_id(id: PointId) -> QdrantPointId {
    match id {
        PointId::Num(n) => QdrantPointId::from(n),
        PointId::Uuid(u) => QdrantPointId::from(u.to_string()),
    }
}

fn from_qdrant_id(id: Option<QdrantPointId>) -> Option<PointId> {
    match id?.point_id_options? {
        PointIdOptions::Num(n) => Some(PointId::Num(n)),
        PointIdOptions::Uuid(s) => Uuid::parse_str(&s).ok().map(PointId::Uuid),
    }
}

/// Convert a Qdrant payload value back into JSON
fn value_to_json(value: QdrantValue) -> serde_json::Value {
    match value.kind {
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Value::from(d),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, value_to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

/// Convert a Qdrant hit, normalising its score so that higher is nearer
fn from_qdrant_hit(
    point: QdrantScoredPoint,
    distance: Distance,
    with_payload: bool,
) -> Option<ScoredPoint> {
    let id = from_qdrant_id(point.id)?;
    let payload = with_payload.then(|| {
        point
            .payload
            .into_iter()
            .map(|(k, v)| (k, value_to_json(v)))
            .collect::<Payload>()
    });
    Some(ScoredPoint {
        id,
        score: distance.similarity(point.score),
        payload,
    })
}

fn to_qdrant_payload(payload: Payload) -> Result<QdrantPayload> {
    let object: serde_json::Map<String, serde_json::Value> = payload.into_iter().collect();
    QdrantPayload::try_from(serde_json::Value::Object(object))
        .map_err(|e| RagError::DatabaseError(format!("Invalid payload: {e}")))
}

#[async_trait]
impl super::VectorStore for QdrantStore {
    async fn delete_collection(&self, name: &str) -> Result<()> {
        let exists = self.client.collection_exists(name).await.map_err(|e| {
            RagError::DatabaseError(format!("Failed to check collection existence: {e}"))
        })?;

        if !exists {
            debug!(collection = name, "qdrant collection absent, nothing to delete");
            return Ok(());
        }

        self.client
            .delete_collection(name)
            .await
            .map_err(|e| RagError::DatabaseError(format!("Failed to delete collection: {e}")))?;
        self.metrics.write().await.remove(name);

        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn create_collection(&self, name: &str, config: &CollectionConfig) -> Result<()> {
        self.client
            .create_collection(CreateCollectionBuilder::new(name).vectors_config(
                VectorParamsBuilder::new(
                    config.dimension as u64,
                    to_qdrant_distance(config.distance),
                ),
            ))
            .await
            .map_err(|e| RagError::DatabaseError(format!("Failed to create collection: {e}")))?;
        self.metrics
            .write()
            .await
            .insert(name.to_string(), config.distance);

        debug!(
            collection = name,
            dimension = config.dimension,
            distance = %config.distance,
            "created qdrant collection"
        );
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<StoredPoint>, wait: bool) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let points = points
            .into_iter()
            .map(|p| {
                Ok(PointStruct::new(
                    to_qdrant_id(p.id),
                    p.vector,
                    to_qdrant_payload(p.payload)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(wait))
            .await
            .map_err(|e| RagError::DatabaseError(format!("Failed to upsert points: {e}")))?;

        debug!(collection = name, count, wait, "upserted points to qdrant");
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        with_payload: bool,
    ) -> Result<Vec<ScoredPoint>> {
        let distance = self.collection_distance(name).await?;
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(name, vector.to_vec(), limit as u64)
                    .with_payload(with_payload),
            )
            .await
            .map_err(|e| RagError::SearchError(format!("Vector search failed: {e}")))?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| from_qdrant_hit(point, distance, with_payload))
            .collect::<Vec<_>>();

        debug!(collection = name, hits = hits.len(), "qdrant search completed");
        Ok(hits)
    }

    async fn count(&self, name: &str) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(name).exact(true))
            .await
            .map_err(|e| RagError::DatabaseError(format!("Failed to count points: {e}")))?;

        Ok(response.result.map(|r| r.count).unwrap_or_default())
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
