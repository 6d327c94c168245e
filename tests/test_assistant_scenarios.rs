//! End-to-end turns through router, retrieval, rerank, generation and memory

mod common;

use async_trait::async_trait;
use common::{assistant_with, sample_documents, test_config, MockModel, SUMMARY_TEXT};
use shopassist::assistant::NO_PRODUCT_FOUND;
use shopassist::llm::LlmError;
use shopassist::memory::{ConversationThread, InMemoryThreadStore, Role, StoreError, ThreadStore};
use shopassist::retrieval::CandidateSource;
use shopassist::router::RouteDecision;
use shopassist::{AssistError, TurnNotice};
use std::sync::Arc;

#[tokio::test]
async fn test_empty_catalog_generates_without_context() {
    let model = MockModel::new();
    model.route_to_search("iPhone 15");
    let store = Arc::new(InMemoryThreadStore::new());
    let assistant = assistant_with(model.clone(), store, Vec::new(), &test_config()).await;

    let turn = assistant.handle_turn(None, "iPhone 15 giá bao nhiêu?").await.unwrap();

    assert!(turn.route.is_product_search());
    assert!(turn.products.is_empty());
    assert!(turn.notices.is_empty());

    let system = model.last_system.lock().unwrap().clone();
    assert!(system.contains(NO_PRODUCT_FOUND));
    assert!(!system.contains("Nguồn:"));
}

#[tokio::test]
async fn test_new_thread_gets_exactly_one_exchange() {
    let model = MockModel::new();
    let store = Arc::new(InMemoryThreadStore::new());
    let assistant = assistant_with(model.clone(), store.clone(), sample_documents(), &test_config()).await;

    let before = assistant.memory().load("fresh").await.unwrap();
    assert!(before.is_empty());

    let turn = assistant
        .handle_turn(Some("fresh".to_string()), "Xin chào")
        .await
        .unwrap();
    assert_eq!(turn.thread_id, "fresh");
    assert_eq!(turn.route, RouteDecision::Chat);

    let after = store.get("fresh").await.unwrap().unwrap();
    assert_eq!(after.messages.len(), 2);
    assert_eq!(after.messages[0].role, Role::User);
    assert_eq!(after.messages[0].content, "Xin chào");
    assert_eq!(after.messages[1].role, Role::Assistant);
    assert_eq!(after.messages[1].content, turn.response);
}

#[tokio::test]
async fn test_generation_failure_leaves_thread_unchanged() {
    let model = MockModel::new();
    let store = Arc::new(InMemoryThreadStore::new());
    let assistant = assistant_with(model.clone(), store.clone(), sample_documents(), &test_config()).await;

    assistant
        .handle_turn(Some("t1".to_string()), "Xin chào")
        .await
        .unwrap();
    let before = store.get("t1").await.unwrap().unwrap();
    let calls_before = model.generations();

    model.fail_generation(LlmError::Unavailable("model overloaded".to_string()));
    let err = assistant
        .handle_turn(Some("t1".to_string()), "Cảm ơn shop")
        .await
        .unwrap_err();

    match err {
        AssistError::GenerationFailed { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(model.generations() - calls_before, 3);
    assert_eq!(store.get("t1").await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn test_permanent_generation_error_is_not_retried() {
    let model = MockModel::new();
    model.fail_generation(LlmError::Provider {
        status: 400,
        message: "bad request".to_string(),
    });
    let assistant = assistant_with(
        model.clone(),
        Arc::new(InMemoryThreadStore::new()),
        sample_documents(),
        &test_config(),
    )
    .await;

    let err = assistant.handle_turn(None, "hello").await.unwrap_err();
    assert_eq!(err.kind(), "generation_failed");
    assert_eq!(model.generations(), 1);
}

#[tokio::test]
async fn test_product_turn_grounds_reply_in_catalog() {
    let model = MockModel::new();
    model.route_to_search("Samsung Galaxy S24 Ultra");
    let assistant = assistant_with(
        model.clone(),
        Arc::new(InMemoryThreadStore::new()),
        sample_documents(),
        &test_config(),
    )
    .await;

    let turn = assistant
        .handle_turn(None, "con s24 ultra còn hàng không shop")
        .await
        .unwrap();

    assert_eq!(
        turn.route,
        RouteDecision::ProductSearch {
            normalized_query: "Samsung Galaxy S24 Ultra".to_string()
        }
    );
    assert!(!turn.products.is_empty());
    assert!(turn.products.len() <= 3);
    assert_eq!(turn.products[0].id(), "s24u");
    assert!(turn.products.iter().all(|p| p.score >= 1.0));
    assert!(turn
        .products
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));

    let system = model.last_system.lock().unwrap().clone();
    assert!(system.contains("Nguồn: Samsung Galaxy S24 Ultra"));
    assert!(system.contains("URL: https://shop.example/s24u"));
    assert!(system.contains("Giá: 27.490.000đ"));

    let context = model.last_context.lock().unwrap().clone();
    assert_eq!(context.last().unwrap().content, "con s24 ultra còn hàng không shop");
}

#[tokio::test]
async fn test_rerank_failure_passes_fused_results_with_notice() {
    let model = MockModel::new();
    model.route_to_search("iPhone 15");
    *model.scoring_fails.lock().unwrap() = true;
    let assistant = assistant_with(
        model.clone(),
        Arc::new(InMemoryThreadStore::new()),
        sample_documents(),
        &test_config(),
    )
    .await;

    let turn = assistant.handle_turn(None, "iphone 15").await.unwrap();
    assert!(turn.notices.contains(&TurnNotice::RerankSkipped));
    assert!(!turn.products.is_empty());
    assert!(turn.products.iter().all(|p| p.source == CandidateSource::Fused));
}

#[tokio::test]
async fn test_disabled_rerank_keeps_fused_order() {
    let model = MockModel::new();
    let mut config = test_config();
    config.rerank.enabled = false;
    let assistant = assistant_with(
        model,
        Arc::new(InMemoryThreadStore::new()),
        sample_documents(),
        &config,
    )
    .await;

    let outcome = assistant.search("pin 5000 mAh", 3, true).await.unwrap();
    assert!(outcome.notices.is_empty());
    assert!(outcome.candidates.iter().all(|c| c.source == CandidateSource::Fused));
    let ids = outcome.candidates.ids();
    assert!(ids.contains(&"a55") || ids.contains(&"rn13"));
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let model = MockModel::new();
    let assistant = assistant_with(
        model.clone(),
        Arc::new(InMemoryThreadStore::new()),
        sample_documents(),
        &test_config(),
    )
    .await;

    let err = assistant.handle_turn(None, "   ").await.unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
    assert_eq!(model.generations(), 0);
}

#[tokio::test]
async fn test_history_is_passed_to_generation() {
    let model = MockModel::new();
    let assistant = assistant_with(
        model.clone(),
        Arc::new(InMemoryThreadStore::new()),
        sample_documents(),
        &test_config(),
    )
    .await;

    let first = assistant.handle_turn(None, "Chào Lisa").await.unwrap();
    assistant
        .handle_turn(Some(first.thread_id.clone()), "Bạn tên gì?")
        .await
        .unwrap();

    let context = model.last_context.lock().unwrap().clone();
    let contents: Vec<&str> = context.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Chào Lisa", first.response.as_str(), "Bạn tên gì?"]);
}

#[tokio::test]
async fn test_long_thread_is_summarized() {
    let model = MockModel::new();
    let mut config = test_config();
    config.memory.summary_threshold = 4;
    config.memory.keep_recent = 2;
    let store = Arc::new(InMemoryThreadStore::new());
    let assistant = assistant_with(model.clone(), store.clone(), sample_documents(), &config).await;

    for message in ["Chào shop", "Cảm ơn nhé", "ok", "Tạm biệt"] {
        assistant
            .handle_turn(Some("long".to_string()), message)
            .await
            .unwrap();
    }

    let thread = store.get("long").await.unwrap().unwrap();
    assert!(thread.messages.len() <= 4);
    assert_eq!(thread.summary.as_deref(), Some(SUMMARY_TEXT));

    // The summary reaches the next generation through the system prompt
    assistant
        .handle_turn(Some("long".to_string()), "Xin chào lại")
        .await
        .unwrap();
    assert!(model.last_system.lock().unwrap().contains(SUMMARY_TEXT));
}

/// Store whose every call fails
struct BrokenStore;

#[async_trait]
impl ThreadStore for BrokenStore {
    async fn get(&self, _thread_id: &str) -> Result<Option<ConversationThread>, StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn put(&self, _thread: &ConversationThread) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }
}

#[tokio::test]
async fn test_store_outage_still_answers() {
    let model = MockModel::new();
    let assistant = assistant_with(model.clone(), Arc::new(BrokenStore), sample_documents(), &test_config()).await;

    let turn = assistant.handle_turn(None, "Xin chào").await.unwrap();
    assert!(!turn.response.is_empty());
    assert_eq!(turn.notices, vec![TurnNotice::ContinuityLost]);
    assert!(uuid::Uuid::parse_str(&turn.thread_id).is_ok());
}
