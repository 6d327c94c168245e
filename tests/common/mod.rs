//! Shared fixtures: a small phone catalog, a hashing embedder and a scripted model
#![allow(dead_code)]

use async_trait::async_trait;
use shopassist::assistant::AssistantComponents;
use shopassist::catalog::{Document, DocumentMetadata, InMemoryCatalog};
use shopassist::config::Config;
use shopassist::embedding::{EmbeddingError, EmbeddingProvider};
use shopassist::llm::{LanguageModel, LlmError};
use shopassist::memory::{Message, ThreadStore};
use shopassist::ShopAssistant;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DIM: usize = 64;

/// Bag-of-words vectors: every lowercase token is hashed into one of `DIM` buckets
pub struct HashingEmbedder;

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; DIM];
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let bucket = token
                .bytes()
                .fold(17usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % DIM] += 1.0;
        }
        // keep blank texts off the zero vector
        v[0] += 0.01;
        Ok(v)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

fn phone(id: &str, title: &str, price: u64, text: &str) -> Document {
    let metadata = DocumentMetadata {
        title: title.to_string(),
        price: Some(price),
        url: format!("https://shop.example/{}", id),
        ..Default::default()
    };
    Document::new(id, text, metadata)
}

pub fn sample_documents() -> Vec<Document> {
    vec![
        phone(
            "ip15",
            "iPhone 15 128GB",
            19_990_000,
            "iPhone 15 128GB màn hình 6.1 inch chip A16 Bionic camera 48MP",
        ),
        phone(
            "ip15pm",
            "iPhone 15 Pro Max 256GB",
            29_990_000,
            "iPhone 15 Pro Max 256GB khung titan chip A17 Pro camera zoom 5x",
        ),
        phone(
            "s24u",
            "Samsung Galaxy S24 Ultra",
            27_490_000,
            "Samsung Galaxy S24 Ultra bút S Pen camera 200MP màn hình 6.8 inch",
        ),
        phone(
            "a55",
            "Samsung Galaxy A55 5G",
            9_690_000,
            "Samsung Galaxy A55 5G pin 5000 mAh màn hình Super AMOLED",
        ),
        phone(
            "rn13",
            "Xiaomi Redmi Note 13",
            4_890_000,
            "Xiaomi Redmi Note 13 pin 5000 mAh sạc nhanh 33W giá rẻ",
        ),
    ]
}

/// Defaults tuned for tests: small vectors, fast retries, inclusive rerank threshold
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.indexing.vector_dim = DIM;
    config.indexing.hnsw_ef_construction = 64;
    config.llm.base_delay_ms = 1;
    config.llm.max_delay_ms = 5;
    config.llm.request_timeout_secs = 5;
    config.rerank.threshold = 1.0;
    config.memory.store_timeout_ms = 1_000;
    config
}

/// Model whose replies are set by the test
///
/// `classify` answers with `route_reply`; `generate` answers summary requests with a
/// fixed summary and everything else with `reply`; `score_pairs` counts query words
/// found in each text.
pub struct MockModel {
    pub route_reply: Mutex<String>,
    pub reply: Mutex<Result<String, LlmError>>,
    pub scoring_fails: Mutex<bool>,
    pub generate_calls: AtomicUsize,
    pub summary_calls: AtomicUsize,
    pub last_system: Mutex<String>,
    pub last_context: Mutex<Vec<Message>>,
}

pub const SUMMARY_TEXT: &str = "Khách đang tìm điện thoại Samsung pin trâu";

impl MockModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            route_reply: Mutex::new(r#"{"route": "chat", "query": ""}"#.to_string()),
            reply: Mutex::new(Ok("Dạ, Lisa xin chào anh/chị ạ!".to_string())),
            scoring_fails: Mutex::new(false),
            generate_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
            last_system: Mutex::new(String::new()),
            last_context: Mutex::new(Vec::new()),
        })
    }

    pub fn route_to_search(&self, query: &str) {
        *self.route_reply.lock().unwrap() = format!(r#"{{"route": "product_search", "query": "{}"}}"#, query);
    }

    pub fn fail_generation(&self, error: LlmError) {
        *self.reply.lock().unwrap() = Err(error);
    }

    pub fn generations(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str, context: &[Message]) -> Result<String, LlmError> {
        let is_summary = context
            .last()
            .map(|m| m.content.contains("Distill the above chat messages"))
            .unwrap_or(false);
        if is_summary {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(SUMMARY_TEXT.to_string());
        }

        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().unwrap() = prompt.to_string();
        *self.last_context.lock().unwrap() = context.to_vec();
        self.reply.lock().unwrap().clone()
    }

    async fn classify(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(self.route_reply.lock().unwrap().clone())
    }

    async fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, LlmError> {
        if *self.scoring_fails.lock().unwrap() {
            return Err(LlmError::Unavailable("cross-encoder offline".to_string()));
        }
        let words: Vec<String> = query.to_lowercase().split_whitespace().map(str::to_string).collect();
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                words.iter().filter(|w| text.contains(w.as_str())).count() as f32
            })
            .collect())
    }
}

pub async fn assistant_with(
    model: Arc<MockModel>,
    store: Arc<dyn ThreadStore>,
    documents: Vec<Document>,
    config: &Config,
) -> ShopAssistant {
    AssistantComponents {
        model,
        embedder: Arc::new(HashingEmbedder),
        catalog: Arc::new(InMemoryCatalog::new(documents)),
        store,
    }
    .assemble(config)
    .await
    .unwrap()
}
