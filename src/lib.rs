//! shopassist - Phone-shop customer assistant
//!
//! Routes each customer message to small talk or product search, answers product
//! questions from a hybrid keyword + vector search that is fused, re-ranked and
//! filtered, and keeps per-thread conversation memory with summarization.

pub mod assistant;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod memory;
pub mod retrieval;
pub mod router;

pub use assistant::{ShopAssistant, TurnNotice, TurnResponse};
pub use error::{AssistError, Result};
