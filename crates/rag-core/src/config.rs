//! Configuration Management
//!
//! Handles configuration from environment variables and TOML files with
//! defaults that reproduce the llama demo against a local Ollama and Qdrant.

use crate::{Distance, PointId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Vector database connection and collection layout
    pub database: DatabaseConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// RAG pipeline configuration
    pub rag: RagConfig,

    /// Documents to ingest and the example question
    pub corpus: CorpusConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError { path, message },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Qdrant
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.database.qdrant_url = url;
        }
        if let Ok(collection) = std::env::var("QDRANT_COLLECTION") {
            self.database.collection = collection;
        }
        if let Ok(dim) = std::env::var("VECTOR_DIMENSION") {
            self.database.vector_dimension =
                dim.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "VECTOR_DIMENSION".to_string(),
                    value: dim,
                })?;
        }
        if let Ok(distance) = std::env::var("VECTOR_DISTANCE") {
            self.database.distance = distance.parse()?;
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.collection.trim().is_empty() {
            return Err(ConfigError::MissingRequired("database.collection".to_string()));
        }
        if self.database.vector_dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "database.vector_dimension".to_string(),
                value: "0".to_string(),
            });
        }
        if !self.rag.prompt_template.contains("{query}") {
            return Err(ConfigError::InvalidValue {
                key: "rag.prompt_template".to_string(),
                value: self.rag.prompt_template.clone(),
            });
        }
        if matches!(self.llm.provider, LlmProvider::OpenAI | LlmProvider::Azure)
            && self.llm.openai_api_key.is_none()
        {
            return Err(ConfigError::MissingRequired("OPENAI_API_KEY".to_string()));
        }
        Ok(())
    }
}

/// Vector database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Collection name (ie table name in a traditional database)
    pub collection: String,

    /// Vector dimension (must match embedding model)
    pub vector_dimension: usize,

    /// Distance metric used when the collection is created
    pub distance: Distance,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "example_text".to_string(),
            vector_dimension: 768, // nomic-embed-text
            distance: Distance::Dot,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use for generation
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gemma3:4b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            max_tokens: 2048,
            temperature: 0.1,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// How point identifiers are derived from documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPolicy {
    /// Zero-based position in the input sequence
    #[default]
    Positional,
    /// UUID v5 of the document text; stable across reordering
    ContentHash,
}

/// Namespace for content-hash point ids
const DOCUMENT_NAMESPACE: Uuid = Uuid::from_u128(0x6c6c_616d_612d_7261_6700_0000_0000_0001);

impl IdPolicy {
    /// Identifier for the document at `index` with the given text
    pub fn assign(&self, index: usize, text: &str) -> PointId {
        match self {
            Self::Positional => PointId::Num(index as u64),
            Self::ContentHash => PointId::Uuid(Uuid::new_v5(&DOCUMENT_NAMESPACE, text.as_bytes())),
        }
    }
}

/// What to do when retrieval yields no usable document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyContextPolicy {
    /// Skip generation and report that nothing was found
    #[default]
    NoAnswer,
    /// Generate anyway with an empty context
    Ungrounded,
}

/// RAG pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Minimum score a hit needs to be used as context
    pub min_score: Option<f32>,

    /// Point identifier assignment
    pub id_policy: IdPolicy,

    /// Behaviour when no document qualifies as context
    pub on_empty_context: EmptyContextPolicy,

    /// Prompt template with `{context}` and `{query}` placeholders
    pub prompt_template: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            min_score: None,
            id_policy: IdPolicy::Positional,
            on_empty_context: EmptyContextPolicy::NoAnswer,
            prompt_template: "Using this data: {context}. Respond to this prompt: {query}"
                .to_string(),
        }
    }
}

/// Documents to ingest and the question asked after ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub documents: Vec<String>,
    pub query: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        let documents = [
            "Llamas are members of the camelid family meaning they're pretty closely related to vicuñas and camels",
            "Llamas were first domesticated and used as pack animals 4,000 to 5,000 years ago in the Peruvian highlands",
            "Llamas can grow as much as 6 feet tall though the average llama between 5 feet 6 inches and 5 feet 9 inches tall",
            "Llamas weigh between 280 and 450 pounds and can carry 25 to 30 percent of their body weight",
            "Llamas are vegetarians and have very efficient digestive systems",
            "Llamas live to be about 20 years old, though some only live for 15 years and others live to be 30 years old",
        ];

        Self {
            documents: documents.iter().map(|d| d.to_string()).collect(),
            query: "What animals are llamas related to?".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
