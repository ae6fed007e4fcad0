use std::{sync::Arc, time::Duration};

use quarry_domain::StrategyKind;
use quarry_service::{Error, RagQuery, RetrieverRegistry};
use quarry_testkit::{RecordingAnalyticsSink, ScriptedRetriever};

use super::scripted_service;

#[tokio::test]
async fn failing_strategy_falls_back_to_retrieve_read_exactly_once() {
	let failing = Arc::new(ScriptedRetriever::failing(StrategyKind::Hybrid, "sparse index offline"));
	let fallback = Arc::new(ScriptedRetriever::returning(
		StrategyKind::RetrieveRead,
		&[("doc-a", 0.9), ("doc-b", 0.4)],
	));
	let mut registry = RetrieverRegistry::new();

	registry.register(failing.clone()).register(fallback.clone());

	let service = scripted_service(registry, Arc::new(RecordingAnalyticsSink::new()));
	let response = service
		.retrieve_with_strategy(RagQuery::new("rust ownership"), StrategyKind::Hybrid, None)
		.await
		.expect("Failed to retrieve with fallback.");

	assert_eq!(failing.call_count(), 1);
	assert_eq!(fallback.call_count(), 1);
	assert_eq!(response.strategy, "retrieve_read");
	assert_eq!(response.results.len(), 2);
	assert_eq!(response.results[0].document_id, "doc-a");
	assert!(response.debug_info.fallback_used);
	assert_eq!(response.debug_info.fallback_from, Some(StrategyKind::Hybrid));
	assert!(
		response
			.debug_info
			.fallback_reason
			.as_deref()
			.is_some_and(|reason| reason.contains("sparse index offline"))
	);
}

#[tokio::test]
async fn failing_fallback_strategy_surfaces_a_contextual_error() {
	let fallback =
		Arc::new(ScriptedRetriever::failing(StrategyKind::RetrieveRead, "vector store down"));
	let mut registry = RetrieverRegistry::new();

	registry.register(fallback.clone());

	let service = scripted_service(registry, Arc::new(RecordingAnalyticsSink::new()));
	let query = RagQuery::new("rust ownership");
	let err = service
		.retrieve_with_strategy(query, StrategyKind::RetrieveRead, None)
		.await
		.expect_err("Expected the retrieval to fail.");

	assert_eq!(fallback.call_count(), 1);

	let Error::Retrieval { strategy, .. } = &err else {
		panic!("Unexpected error: {err:?}");
	};

	assert_eq!(strategy, "retrieve_read");
	assert!(matches!(err.root_cause(), Error::Provider { .. }));
}

#[tokio::test]
async fn fallback_failure_after_a_primary_failure_is_reported_against_the_fallback() {
	let failing = Arc::new(ScriptedRetriever::failing(StrategyKind::Hybrid, "sparse index offline"));
	let fallback =
		Arc::new(ScriptedRetriever::failing(StrategyKind::RetrieveRead, "vector store down"));
	let mut registry = RetrieverRegistry::new();

	registry.register(failing.clone()).register(fallback.clone());

	let service = scripted_service(registry, Arc::new(RecordingAnalyticsSink::new()));
	let err = service
		.retrieve_with_strategy(RagQuery::new("rust ownership"), StrategyKind::Hybrid, None)
		.await
		.expect_err("Expected the retrieval to fail.");

	assert_eq!(failing.call_count(), 1);
	assert_eq!(fallback.call_count(), 1);
	assert!(matches!(&err, Error::Retrieval { strategy, .. } if strategy == "retrieve_read"));
}

#[tokio::test]
async fn stalled_strategy_times_out_and_falls_back() {
	let stalled =
		Arc::new(ScriptedRetriever::stalling(StrategyKind::Hybrid, Duration::from_secs(5)));
	let fallback =
		Arc::new(ScriptedRetriever::returning(StrategyKind::RetrieveRead, &[("doc-a", 0.7)]));
	let mut registry = RetrieverRegistry::new();

	registry.register(stalled.clone()).register(fallback.clone());

	let service = scripted_service(registry, Arc::new(RecordingAnalyticsSink::new()));
	let query = RagQuery { timeout_ms: Some(50), ..RagQuery::new("rust ownership") };
	let response = service
		.retrieve_with_strategy(query, StrategyKind::Hybrid, None)
		.await
		.expect("Failed to retrieve with fallback.");

	assert_eq!(stalled.call_count(), 1);
	assert_eq!(fallback.call_count(), 1);
	assert!(response.debug_info.fallback_used);
	assert_eq!(response.results.len(), 1);
}

#[tokio::test]
async fn validation_errors_are_not_retried() {
	let fallback =
		Arc::new(ScriptedRetriever::returning(StrategyKind::RetrieveRead, &[("doc-a", 0.7)]));
	let mut registry = RetrieverRegistry::new();

	registry.register(fallback.clone());

	let service = scripted_service(registry, Arc::new(RecordingAnalyticsSink::new()));

	for query in [
		RagQuery::new("   "),
		RagQuery::new("rust").with_top_k(0),
		RagQuery { timeout_ms: Some(0), ..RagQuery::new("rust") },
	] {
		let err = service.retrieve(query).await.expect_err("Expected a validation error.");

		assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err:?}");
	}

	assert_eq!(fallback.call_count(), 0);
}

#[tokio::test]
async fn unregistered_strategy_is_a_configuration_error() {
	let fallback =
		Arc::new(ScriptedRetriever::returning(StrategyKind::RetrieveRead, &[("doc-a", 0.7)]));
	let mut registry = RetrieverRegistry::new();

	registry.register(fallback.clone());

	let service = scripted_service(registry, Arc::new(RecordingAnalyticsSink::new()));
	let err = service
		.retrieve_with_strategy(RagQuery::new("rust"), StrategyKind::GraphRag, None)
		.await
		.expect_err("Expected a configuration error.");

	assert!(matches!(err, Error::Configuration { .. }), "Unexpected error: {err:?}");
	assert_eq!(fallback.call_count(), 0);
}
