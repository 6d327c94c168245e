//! Configuration management for the shop assistant
//!
//! Every tunable of the pipeline (fusion weights, rank offset, rerank threshold,
//! summarization trigger, retry counts and timeouts) lives here and is handed to
//! component constructors.

use crate::error::{AssistError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub router: RouterConfig,
    pub memory: MemoryConfig,
    pub llm: LlmConfig,
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// SQLite file holding conversation threads (relative paths resolve under data_dir)
    pub threads_db: PathBuf,
}

/// Product catalog source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Normalized product catalog (JSON array)
    pub path: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Index construction and lookup parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub vector_dim: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_search: usize,
    /// Keyword index heap for the tantivy writer, in bytes
    pub keyword_writer_heap: usize,
}

/// Hybrid retrieval and fusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of products handed to the generation step
    pub top_k: usize,
    /// Each index is asked for `top_k * search_multiplier` candidates
    pub search_multiplier: usize,
    pub lexical_weight: f32,
    pub semantic_weight: f32,
    /// Reciprocal rank offset
    pub rrf_k: f32,
    pub search_timeout_ms: u64,
}

impl RetrievalConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }
}

/// When the cross-encoder runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankMode {
    /// Every product search is re-ranked
    Always,
    /// Only queries containing one of `rerank.keywords` are re-ranked
    Keywords,
}

/// Cross-encoder re-ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub enabled: bool,
    pub model: String,
    /// Candidates scoring below this value are dropped
    pub threshold: f32,
    pub mode: RerankMode,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Query routing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Classify obvious small talk with regexes before asking the model
    pub fast_path: bool,
    #[serde(default)]
    pub chat_patterns: Vec<String>,
    /// Classification attempts when the model output cannot be parsed
    pub max_attempts: u32,
    /// Number of recent messages shown to the classifier
    pub history_window: usize,
}

/// Conversation memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Summarize once a thread holds more than this many messages
    pub summary_threshold: usize,
    /// Messages kept verbatim when summarizing
    pub keep_recent: usize,
    pub store_timeout_ms: u64,
}

impl MemoryConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Language model provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "gemini" or "ollama"
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub ollama_host: String,
    pub temperature: f32,
    pub top_p: f32,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Persona and prompt settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub persona_name: String,
    pub shop_name: String,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_mode: Option<RerankMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AssistError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| AssistError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| AssistError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| AssistError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(enabled) = overrides.rerank_enabled {
            self.rerank.enabled = enabled;
        }
        if let Some(mode) = overrides.rerank_mode {
            self.rerank.mode = mode;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: SHOPASSIST_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("SHOPASSIST_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__PROVIDER" => self.llm.provider = value.to_string(),
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__OLLAMA_HOST" => self.llm.ollama_host = value.to_string(),
            "CATALOG__PATH" => self.catalog.path = PathBuf::from(value),
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "RERANK__ENABLED" => self.rerank.enabled = parse_env(path, value)?,
            "RERANK__THRESHOLD" => self.rerank.threshold = parse_env(path, value)?,
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_env(path, value)?,
            "MEMORY__SUMMARY_THRESHOLD" => {
                self.memory.summary_threshold = parse_env(path, value)?
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AssistError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("shopassist").join("config.toml"))
    }

    /// Conversation database path, resolved against the (expanded) data directory
    pub fn threads_db_path(&self) -> Result<PathBuf> {
        if self.storage.threads_db.is_absolute() {
            Ok(self.storage.threads_db.clone())
        } else {
            Ok(expand_path(&self.storage.data_dir)?.join(&self.storage.threads_db))
        }
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| AssistError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| AssistError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| AssistError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Regexes recognising small talk that never needs retrieval
pub fn default_chat_patterns() -> Vec<String> {
    [
        r"(?i)^\s*(chào|xin chào|hi|hello|alo)\b",
        r"(?i)\b(cảm ơn|thank you|thanks)\b",
        r"(?i)\b(tạm biệt|bye)\b",
        r"(?i)\b(bạn là ai|bạn tên gì|who are you)\b",
        r"(?i)^\s*(oke|ok|tuyệt vời|tốt quá)\s*$",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Query words that call for the slower, more precise re-ranking pass
pub fn default_rerank_keywords() -> Vec<String> {
    [
        "so sánh",
        "đánh giá",
        "nên mua",
        "khác biệt",
        "tốt hơn",
        "ưu điểm",
        "nhược điểm",
        "phân tích",
        "compare",
        "review",
        "better",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.shopassist");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: data_dir.clone(),
                threads_db: PathBuf::from("threads.sqlite"),
            },
            catalog: CatalogConfig {
                path: data_dir.join("catalog.json"),
            },
            embedding: EmbeddingConfig {
                model: "paraphrase-multilingual-minilm-l12-v2".to_string(),
                batch_size: 32,
            },
            indexing: IndexingConfig {
                vector_dim: 384,
                hnsw_ef_construction: 200,
                hnsw_m: 16,
                hnsw_ef_search: 64,
                keyword_writer_heap: 50_000_000,
            },
            retrieval: RetrievalConfig {
                top_k: 3,
                search_multiplier: 3,
                lexical_weight: 0.3,
                semantic_weight: 0.7,
                rrf_k: 60.0,
                search_timeout_ms: 5_000,
            },
            rerank: RerankConfig {
                enabled: true,
                model: "bge-reranker-v2-m3".to_string(),
                threshold: 0.0,
                mode: RerankMode::Always,
                keywords: default_rerank_keywords(),
            },
            router: RouterConfig {
                fast_path: true,
                chat_patterns: default_chat_patterns(),
                max_attempts: 3,
                history_window: 4,
            },
            memory: MemoryConfig {
                summary_threshold: 10,
                keep_recent: 4,
                store_timeout_ms: 5_000,
            },
            llm: LlmConfig {
                provider: "gemini".to_string(),
                model: "gemini-2.5-flash".to_string(),
                api_key_env: "GOOGLE_API_KEY".to_string(),
                ollama_host: "http://localhost:11434".to_string(),
                temperature: 0.7,
                top_p: 0.9,
                request_timeout_secs: 240,
                max_attempts: 3,
                base_delay_ms: 2_000,
                max_delay_ms: 30_000,
            },
            assistant: AssistantConfig {
                persona_name: "Lisa".to_string(),
                shop_name: "the phone shop".to_string(),
            },
            profiles: HashMap::new(),
        }
    }
}
