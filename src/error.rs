use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the shop assistant
#[derive(Error, Debug)]
pub enum AssistError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Request rejected before any work was done
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Catalog could not be read or converted into documents
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Index construction failed
    #[error("Index error: {0}")]
    Index(String),

    /// Route label could not be parsed; recovered by routing to chat
    #[error("Routing output ambiguous: {0}")]
    RoutingAmbiguous(String),

    /// Neither index could answer the query
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Relevance scoring failed; recovered by passing fused results through
    #[error("Rerank unavailable: {0}")]
    RerankUnavailable(String),

    /// Language model call exhausted its retries
    #[error("Generation failed after {attempts} attempt(s): {message}")]
    GenerationFailed { attempts: u32, message: String },

    /// Conversation store could not be reached
    #[error("Conversation store unavailable: {0}")]
    MemoryStoreUnavailable(String),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AssistError {
    /// Stable tag for the failure, used by transports to map status codes
    pub fn kind(&self) -> &'static str {
        match self {
            AssistError::Config(_)
            | AssistError::ConfigValidation { .. }
            | AssistError::ConfigNotFound { .. }
            | AssistError::InvalidConfigValue { .. } => "config",
            AssistError::InvalidRequest(_) => "invalid_request",
            AssistError::Catalog(_) => "catalog",
            AssistError::Index(_) => "index",
            AssistError::RoutingAmbiguous(_) => "routing_ambiguous",
            AssistError::RetrievalUnavailable(_) => "retrieval_unavailable",
            AssistError::RerankUnavailable(_) => "rerank_unavailable",
            AssistError::GenerationFailed { .. } => "generation_failed",
            AssistError::MemoryStoreUnavailable(_) => "memory_store_unavailable",
            AssistError::Io { .. } => "io",
            AssistError::Toml(_) | AssistError::TomlSerialization(_) => "toml",
            AssistError::Json { .. } => "json",
            AssistError::Database(_) => "database",
            AssistError::Other(_) => "internal",
        }
    }

    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssistError::RetrievalUnavailable(_)
                | AssistError::GenerationFailed { .. }
                | AssistError::MemoryStoreUnavailable(_)
        )
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for shop assistant operations
pub type Result<T> = std::result::Result<T, AssistError>;
