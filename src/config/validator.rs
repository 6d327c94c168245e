use crate::config::Config;
use crate::error::{AssistError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_rerank(config, &mut errors);
        Self::validate_router(config, &mut errors);
        Self::validate_memory(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AssistError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.threads_db.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.threads_db",
                "Thread database path cannot be empty",
            ));
        }
        if config.catalog.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "catalog.path",
                "Catalog path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.vector_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.vector_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        // tantivy refuses writer heaps below 15MB
        if config.indexing.keyword_writer_heap < 15_000_000 {
            errors.push(ValidationError::new(
                "indexing.keyword_writer_heap",
                "Keyword writer heap must be at least 15000000 bytes",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        if retrieval.search_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.search_multiplier",
                "Search multiplier must be greater than 0",
            ));
        }

        for (path, weight) in [
            ("retrieval.lexical_weight", retrieval.lexical_weight),
            ("retrieval.semantic_weight", retrieval.semantic_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be finite and non-negative, got {}", weight),
                ));
            }
        }

        if retrieval.lexical_weight == 0.0 && retrieval.semantic_weight == 0.0 {
            errors.push(ValidationError::new(
                "retrieval.semantic_weight",
                "Lexical and semantic weights cannot both be zero",
            ));
        }

        if !retrieval.rrf_k.is_finite() || retrieval.rrf_k < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("Rank offset must be finite and non-negative, got {}", retrieval.rrf_k),
            ));
        }

        if retrieval.search_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.search_timeout_ms",
                "Search timeout must be greater than 0",
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        if !config.rerank.threshold.is_finite() {
            errors.push(ValidationError::new(
                "rerank.threshold",
                "Threshold must be a finite number",
            ));
        }

        if config.rerank.enabled && config.rerank.model.is_empty() {
            errors.push(ValidationError::new(
                "rerank.model",
                "Model name cannot be empty when re-ranking is enabled",
            ));
        }

        if config.rerank.mode == super::RerankMode::Keywords && config.rerank.keywords.is_empty()
        {
            errors.push(ValidationError::new(
                "rerank.keywords",
                "Keyword mode needs at least one keyword",
            ));
        }
    }

    fn validate_router(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.router.max_attempts == 0 {
            errors.push(ValidationError::new(
                "router.max_attempts",
                "Router attempts must be greater than 0",
            ));
        }

        for (i, pattern) in config.router.chat_patterns.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ValidationError::new(
                    format!("router.chat_patterns[{}]", i),
                    format!("Invalid regex: {}", e),
                ));
            }
        }
    }

    fn validate_memory(config: &Config, errors: &mut Vec<ValidationError>) {
        let memory = &config.memory;

        if memory.summary_threshold == 0 {
            errors.push(ValidationError::new(
                "memory.summary_threshold",
                "Summary threshold must be greater than 0",
            ));
        }

        if memory.keep_recent >= memory.summary_threshold {
            errors.push(ValidationError::new(
                "memory.keep_recent",
                format!(
                    "keep_recent ({}) must be smaller than summary_threshold ({})",
                    memory.keep_recent, memory.summary_threshold
                ),
            ));
        }

        // The kept tail must start on a customer message; chat APIs expect a user turn first
        if memory.keep_recent % 2 != 0 {
            errors.push(ValidationError::new(
                "memory.keep_recent",
                format!(
                    "keep_recent ({}) must be even so whole exchanges are kept",
                    memory.keep_recent
                ),
            ));
        }

        if memory.store_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "memory.store_timeout_ms",
                "Store timeout must be greater than 0",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let llm = &config.llm;

        let valid_providers = ["gemini", "ollama"];
        if !valid_providers.contains(&llm.provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, llm.provider
                ),
            ));
        }

        if llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", llm.temperature),
            ));
        }

        if !(0.0..=1.0).contains(&llm.top_p) {
            errors.push(ValidationError::new(
                "llm.top_p",
                format!("top_p must be between 0.0 and 1.0, got {}", llm.top_p),
            ));
        }

        if llm.max_attempts == 0 {
            errors.push(ValidationError::new(
                "llm.max_attempts",
                "At least one attempt is required",
            ));
        }

        if llm.request_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.request_timeout_secs",
                "Request timeout must be greater than 0",
            ));
        }

        if llm.base_delay_ms > llm.max_delay_ms {
            errors.push(ValidationError::new(
                "llm.base_delay_ms",
                "Base delay cannot exceed max delay",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(AssistError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_keep_recent_must_be_below_threshold() {
        let mut config = Config::default();
        config.memory.keep_recent = 10;
        assert_eq!(error_paths(&config), vec!["memory.keep_recent"]);
    }

    #[test]
    fn test_keep_recent_must_be_even() {
        let mut config = Config::default();
        config.memory.keep_recent = 3;
        assert_eq!(error_paths(&config), vec!["memory.keep_recent"]);

        config.memory.keep_recent = 0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_weights() {
        let mut config = Config::default();
        config.retrieval.lexical_weight = -0.1;
        assert!(error_paths(&config).contains(&"retrieval.lexical_weight".to_string()));

        config.retrieval.lexical_weight = 0.0;
        config.retrieval.semantic_weight = 0.0;
        assert!(error_paths(&config).contains(&"retrieval.semantic_weight".to_string()));

        // Weights are not required to sum to one
        config.retrieval.lexical_weight = 2.0;
        config.retrieval.semantic_weight = 5.0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.llm.provider = "openai".to_string();
        config.router.chat_patterns.push("(unclosed".to_string());
        config.retrieval.top_k = 0;

        let paths = error_paths(&config);
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&"llm.provider".to_string()));
        assert!(paths.iter().any(|p| p.starts_with("router.chat_patterns")));
    }
}
