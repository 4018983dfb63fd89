//! RAG Pipeline - populate-then-query Retrieval-Augmented Generation
//!
//! Two sequential phases:
//! - Ingestion: embed each document, reset the collection and upsert
//!   one point per document in a single acknowledged write
//! - Query: embed the question, fetch the single nearest document and
//!   ask the LLM to answer using it
//!
//! Author: hephaex@gmail.com

use rag_core::{
    AppConfig, CollectionConfig, EmptyContextPolicy, IdPolicy, LlmClient, PointId, RagConfig,
    RagError, Result, RetrievedDocument, StoredPoint,
};
use rag_vector::{EmbeddingClient, VectorStore};
use std::sync::Arc;
use std::time::Instant;

pub mod llm;

pub use llm::{create_llm_client, OllamaClient, OpenAiClient};

/// Number of points requested from vector search
pub const RETRIEVAL_LIMIT: usize = 1;

// ============================================================================
// Prompt Template
// ============================================================================

/// Prompt template with `{context}` and `{query}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute the placeholders in a single pass, so text inside
    /// `context` is never itself treated as a placeholder.
    pub fn render(&self, context: &str, query: &str) -> String {
        let mut prompt = String::with_capacity(self.template.len() + context.len() + query.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            prompt.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{context}") {
                prompt.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{query}") {
                prompt.push_str(query);
                rest = after;
            } else {
                prompt.push('{');
                rest = &tail[1..];
            }
        }
        prompt.push_str(rest);

        prompt
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(RagConfig::default().prompt_template)
    }
}

// ============================================================================
// Ingestion
// ============================================================================

/// Result of a populate run
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub collection: String,
    pub points_written: usize,
    /// Identifiers in document order
    pub ids: Vec<PointId>,
}

/// Resets a collection and fills it with one point per document
pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    collection: String,
    collection_config: CollectionConfig,
    id_policy: IdPolicy,
}

impl Ingestor {
    /// Create a new ingestor with positional identifiers
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        collection: impl Into<String>,
        collection_config: CollectionConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
            collection_config,
            id_policy: IdPolicy::Positional,
        }
    }

    /// Create from config
    pub fn from_config(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            store,
            embedder,
            config.database.collection.clone(),
            CollectionConfig::new(config.database.vector_dimension, config.database.distance),
        )
        .with_id_policy(config.rag.id_policy)
    }

    /// Set identifier policy
    pub fn with_id_policy(mut self, policy: IdPolicy) -> Self {
        self.id_policy = policy;
        self
    }

    /// Replace the collection with freshly embedded documents
    ///
    /// Every document is embedded before the collection is touched, so an
    /// embedding failure leaves the previous collection in place.
    pub async fn populate(&self, documents: &[String]) -> Result<IngestReport> {
        let start_time = Instant::now();
        tracing::info!(
            collection = %self.collection,
            documents = documents.len(),
            store = self.store.name(),
            "Ingestion started"
        );

        let mut points = Vec::with_capacity(documents.len());
        for (index, document) in documents.iter().enumerate() {
            let vector = self.embedder.embed(document).await?;
            self.collection_config.check_dimension(&vector)?;

            let id = self.id_policy.assign(index, document);
            tracing::debug!(%id, index, dimension = vector.len(), "Document embedded");
            points.push(StoredPoint::from_document(id, vector, document.as_str()));
        }

        self.store.delete_collection(&self.collection).await?;
        self.store
            .create_collection(&self.collection, &self.collection_config)
            .await?;

        let ids: Vec<PointId> = points.iter().map(|p| p.id).collect();
        let points_written = points.len();
        self.store.upsert(&self.collection, points, true).await?;

        tracing::info!(
            collection = %self.collection,
            points = points_written,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Inserted datapoints"
        );

        Ok(IngestReport {
            collection: self.collection.clone(),
            points_written,
            ids,
        })
    }
}

// ============================================================================
// Query
// ============================================================================

/// Generated answer together with what grounded it
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Document used as context; `None` for ungrounded generation
    pub source: Option<RetrievedDocument>,
    pub prompt: String,
}

/// Outcome of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Answered(Answer),
    /// No document qualified as context and generation was skipped
    NoContext { query: String },
}

impl QueryOutcome {
    /// Generated text, if generation ran
    pub fn answer_text(&self) -> Option<&str> {
        match self {
            Self::Answered(answer) => Some(&answer.text),
            Self::NoContext { .. } => None,
        }
    }
}

/// Answers questions grounded in the nearest stored document
pub struct QueryEngine {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    llm_client: Arc<dyn LlmClient>,
    collection: String,
    collection_config: CollectionConfig,
    min_score: Option<f32>,
    on_empty_context: EmptyContextPolicy,
    template: PromptTemplate,
}

impl QueryEngine {
    /// Create a new query engine
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        llm_client: Arc<dyn LlmClient>,
        collection: impl Into<String>,
        collection_config: CollectionConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            llm_client,
            collection: collection.into(),
            collection_config,
            min_score: None,
            on_empty_context: EmptyContextPolicy::default(),
            template: PromptTemplate::default(),
        }
    }

    /// Create from config
    pub fn from_config(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        llm_client: Arc<dyn LlmClient>,
        config: &AppConfig,
    ) -> Self {
        let mut engine = Self::new(
            store,
            embedder,
            llm_client,
            config.database.collection.clone(),
            CollectionConfig::new(config.database.vector_dimension, config.database.distance),
        )
        .with_empty_context_policy(config.rag.on_empty_context)
        .with_template(PromptTemplate::new(config.rag.prompt_template.clone()));
        engine.min_score = config.rag.min_score;
        engine
    }

    /// Only use hits scoring at least `score`
    pub fn with_min_score(mut self, score: f32) -> Self {
        self.min_score = Some(score);
        self
    }

    /// Set behaviour when nothing is retrieved
    pub fn with_empty_context_policy(mut self, policy: EmptyContextPolicy) -> Self {
        self.on_empty_context = policy;
        self
    }

    /// Set prompt template
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Find the single nearest document for a query
    pub async fn retrieve(&self, query: &str) -> Result<Option<RetrievedDocument>> {
        let vector = self.embedder.embed(query).await?;
        self.collection_config.check_dimension(&vector)?;

        let hits = self
            .store
            .query(&self.collection, &vector, RETRIEVAL_LIMIT, true)
            .await?;
        tracing::debug!(hits = hits.len(), "Vector search completed");

        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };

        if let Some(min_score) = self.min_score {
            if hit.score < min_score {
                tracing::debug!(
                    id = %hit.id,
                    score = hit.score,
                    min_score,
                    "Nearest hit below score threshold"
                );
                return Ok(None);
            }
        }

        let text = hit
            .text()
            .ok_or_else(|| RagError::SearchError(format!("Point {} has no text payload", hit.id)))?
            .to_string();

        Ok(Some(RetrievedDocument {
            id: hit.id,
            text,
            score: hit.score,
        }))
    }

    /// Answer a question using the nearest stored document as context
    pub async fn answer(&self, query: &str) -> Result<QueryOutcome> {
        let start_time = Instant::now();
        tracing::info!(collection = %self.collection, "RAG query started");

        let source = self.retrieve(query).await?;

        let context = match &source {
            Some(doc) => {
                tracing::debug!(id = %doc.id, score = doc.score, "Context document selected");
                format!("{} ", doc.text)
            }
            None => match self.on_empty_context {
                EmptyContextPolicy::NoAnswer => {
                    tracing::warn!("No context document found, skipping generation");
                    return Ok(QueryOutcome::NoContext {
                        query: query.to_string(),
                    });
                }
                EmptyContextPolicy::Ungrounded => {
                    tracing::warn!("No context document found, generating ungrounded");
                    String::new()
                }
            },
        };

        let prompt = self.template.render(&context, query);
        tracing::info!(
            model = self.llm_client.model(),
            "Calling LLM with prompt length: {} chars",
            prompt.len()
        );
        let text = self.llm_client.generate(&prompt).await?;
        tracing::info!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "LLM response received: {} chars",
            text.len()
        );

        Ok(QueryOutcome::Answered(Answer {
            text,
            source,
            prompt,
        }))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Ingestion followed by a single query against the same collection
pub struct RagPipeline {
    ingestor: Ingestor,
    engine: QueryEngine,
}

impl RagPipeline {
    pub fn new(ingestor: Ingestor, engine: QueryEngine) -> Self {
        Self { ingestor, engine }
    }

    /// Wire both phases from config around the given clients
    pub fn from_config(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        llm_client: Arc<dyn LlmClient>,
        config: &AppConfig,
    ) -> Self {
        Self {
            ingestor: Ingestor::from_config(store.clone(), embedder.clone(), config),
            engine: QueryEngine::from_config(store, embedder, llm_client, config),
        }
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Populate the collection, then answer one question
    pub async fn run(
        &self,
        documents: &[String],
        query: &str,
    ) -> Result<(IngestReport, QueryOutcome)> {
        let report = self.ingestor.populate(documents).await?;
        let outcome = self.engine.answer(query).await?;
        Ok((report, outcome))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_matches_demo_prompt() {
        let prompt = PromptTemplate::default().render(
            "Llamas are vegetarians ",
            "What do llamas eat?",
        );
        assert_eq!(
            prompt,
            "Using this data: Llamas are vegetarians . Respond to this prompt: What do llamas eat?"
        );
    }

    #[test]
    fn test_template_single_pass() {
        let template = PromptTemplate::new("[{context}] -> {query}");
        let prompt = template.render("literal {query} inside", "q");
        assert_eq!(prompt, "[literal {query} inside] -> q");
    }

    #[test]
    fn test_template_unknown_braces_kept() {
        let template = PromptTemplate::new("{json} {context}{query} {");
        assert_eq!(template.render("c", "q"), "{json} cq {");
    }

    #[test]
    fn test_outcome_answer_text() {
        let outcome = QueryOutcome::NoContext {
            query: "q".to_string(),
        };
        assert_eq!(outcome.answer_text(), None);

        let outcome = QueryOutcome::Answered(Answer {
            text: "camels".to_string(),
            source: None,
            prompt: String::new(),
        });
        assert_eq!(outcome.answer_text(), Some("camels"));
    }
}
