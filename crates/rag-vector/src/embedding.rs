//! Embedding client for generating vector representations
//!
//! Supports OpenAI and Ollama embedding APIs.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use rag_core::{LlmConfig, LlmProvider, RagError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Model identifier
    fn model(&self) -> &str;
}

/// Embedding input; both APIs accept either a single string or a list
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbedInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

impl EmbedInput<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(texts) => texts.len(),
        }
    }
}

/// Reject responses that do not carry one vector per input
fn expect_count(expected: usize, embeddings: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if embeddings.len() != expected {
        return Err(RagError::EmbeddingError(format!(
            "Expected {expected} embeddings, got {}",
            embeddings.len()
        )));
    }
    Ok(embeddings)
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: EmbedInput<'a>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbeddingResponse {
    /// Vectors in input order
    fn into_ordered(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|d| d.index);
        self.data.into_iter().map(|d| d.embedding).collect()
    }
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "text-embedding-3-large" => 3072,
            // text-embedding-3-small, text-embedding-ada-002 and unknown models
            _ => 1536,
        };

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| RagError::ConfigError("OpenAI API key required".to_string()))?;

        let client = Self::new(api_key.clone(), config.embedding_model.clone());
        Ok(match &config.openai_base_url {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        })
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn request(&self, input: EmbedInput<'_>) -> Result<Vec<Vec<f32>>> {
        let expected = input.len();
        let request = OpenAiEmbeddingRequest {
            input,
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingError(format!("Embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingError(format!(
                "OpenAI embedding error ({status}): {error_text}"
            )));
        }

        let result: OpenAiEmbeddingResponse = response.json().await.map_err(|e| {
            RagError::EmbeddingError(format!("Failed to parse embedding response: {e}"))
        })?;

        expect_count(expected, result.into_ordered())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(EmbedInput::Single(text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingError("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(EmbedInput::Batch(texts)).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client (`/api/embed`)
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: EmbedInput<'a>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768, // Default for most models
        };

        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.embedding_model.clone())
    }

    async fn request(&self, input: EmbedInput<'_>) -> Result<Vec<Vec<f32>>> {
        let request = OllamaEmbedRequest {
            model: &self.model,
            input,
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                RagError::EmbeddingError(format!("Ollama embedding request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingError(format!(
                "Ollama embedding error: {error_text}"
            )));
        }

        let result: OllamaEmbedResponse = response.json().await.map_err(|e| {
            RagError::EmbeddingError(format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(result.embeddings)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(EmbedInput::Single(text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingError("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.request(EmbedInput::Batch(texts)).await?;
        expect_count(texts.len(), embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
pub fn create_embedding_client(config: &LlmConfig) -> Result<Box<dyn EmbeddingClient>> {
    match config.provider {
        LlmProvider::OpenAI | LlmProvider::Azure => {
            Ok(Box::new(OpenAiEmbedding::from_config(config)?))
        }
        LlmProvider::Ollama => Ok(Box::new(OllamaEmbedding::from_config(config))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_dimension() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-small");
        assert_eq!(client.dimension(), 1536);

        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-large");
        assert_eq!(client.dimension(), 3072);
    }

    #[test]
    fn test_openai_base_url_from_config() {
        let config = LlmConfig {
            provider: LlmProvider::OpenAI,
            openai_api_key: Some("sk-test".to_string()),
            openai_base_url: Some("http://localhost:8000/v1/".to_string()),
            embedding_model: "text-embedding-3-small".to_string(),
            ..Default::default()
        };
        let client = OpenAiEmbedding::from_config(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:8000/v1");
        assert_eq!(client.model(), "text-embedding-3-small");
    }

    #[test]
    fn test_openai_request_shape() {
        let texts = vec!["Llamas".to_string(), "Camels".to_string()];
        let request = OpenAiEmbeddingRequest {
            input: EmbedInput::Batch(&texts),
            model: "text-embedding-3-small",
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "input": ["Llamas", "Camels"],
                "model": "text-embedding-3-small"
            })
        );
    }

    #[test]
    fn test_openai_response_ordered_by_index() {
        let body = r#"{"object":"list","data":[
            {"object":"embedding","index":1,"embedding":[0.0,1.0]},
            {"object":"embedding","index":0,"embedding":[1.0,0.0]}
        ]}"#;
        let parsed: OpenAiEmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_ordered(), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_embedding_count_checked() {
        assert!(expect_count(2, vec![vec![1.0], vec![2.0]]).is_ok());
        assert!(matches!(
            expect_count(2, vec![vec![1.0]]),
            Err(RagError::EmbeddingError(_))
        ));
        assert_eq!(EmbedInput::Single("x").len(), 1);
    }

    #[test]
    fn test_ollama_dimension() {
        let client = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text");
        assert_eq!(client.dimension(), 768);
        assert_eq!(client.model(), "nomic-embed-text");

        let client = OllamaEmbedding::new("http://localhost:11434", "mxbai-embed-large");
        assert_eq!(client.dimension(), 1024);
    }

    #[test]
    fn test_ollama_base_url_trailing_slash() {
        let client = OllamaEmbedding::new("http://localhost:11434/", "nomic-embed-text");
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_ollama_request_shape() {
        let single = OllamaEmbedRequest {
            model: "nomic-embed-text",
            input: EmbedInput::Single("Llamas"),
        };
        assert_eq!(
            serde_json::to_value(&single).unwrap(),
            serde_json::json!({ "model": "nomic-embed-text", "input": "Llamas" })
        );

        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = OllamaEmbedRequest {
            model: "nomic-embed-text",
            input: EmbedInput::Batch(&texts),
        };
        assert_eq!(
            serde_json::to_value(&batch).unwrap(),
            serde_json::json!({ "model": "nomic-embed-text", "input": ["a", "b"] })
        );
    }

    #[test]
    fn test_ollama_response_parse() {
        let body = r#"{"model":"nomic-embed-text","embeddings":[[0.1,0.2,0.3]]}"#;
        let parsed: OllamaEmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embeddings, vec![vec![0.1, 0.2, 0.3]]);
    }

    #[test]
    fn test_factory_requires_openai_key() {
        let config = LlmConfig {
            provider: LlmProvider::OpenAI,
            ..Default::default()
        };
        assert!(create_embedding_client(&config).is_err());

        let config = LlmConfig::default();
        let client = create_embedding_client(&config).unwrap();
        assert_eq!(client.model(), "nomic-embed-text");
    }

    #[tokio::test]
    #[ignore = "requires a running Ollama with nomic-embed-text"]
    async fn test_ollama_embed_live() {
        let client = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text");
        let vector = client.embed("Llamas are camelids").await.unwrap();
        assert_eq!(vector.len(), client.dimension());
    }
}
