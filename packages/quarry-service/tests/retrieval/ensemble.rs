use std::{sync::Arc, time::Duration};

use quarry_domain::StrategyKind;
use quarry_service::{Error, RagQuery, RetrieverRegistry};
use quarry_testkit::{RecordingAnalyticsSink, ScriptedRetriever};

use super::scripted_service;

fn registry(retrievers: &[Arc<ScriptedRetriever>]) -> RetrieverRegistry {
	let mut registry = RetrieverRegistry::new();

	for retriever in retrievers {
		registry.register(retriever.clone());
	}

	registry
}

#[tokio::test]
async fn partial_failure_is_absorbed_and_reported() {
	let dense = Arc::new(ScriptedRetriever::returning(
		StrategyKind::RetrieveRead,
		&[("doc-a", 0.8), ("doc-b", 0.5)],
	));
	let hybrid = Arc::new(ScriptedRetriever::failing(StrategyKind::Hybrid, "sparse index offline"));
	let sink = Arc::new(RecordingAnalyticsSink::new());
	let service = scripted_service(registry(&[dense.clone(), hybrid.clone()]), sink.clone());
	let response = service
		.ensemble_retrieve(
			RagQuery::new("rust ownership"),
			&[StrategyKind::RetrieveRead, StrategyKind::Hybrid],
		)
		.await
		.expect("Failed to run ensemble retrieval.");

	assert_eq!(dense.call_count(), 1);
	assert_eq!(hybrid.call_count(), 1);
	assert_eq!(response.results.len(), 2);
	assert_eq!(response.debug_info.fused_strategies, vec!["retrieve_read"]);
	assert_eq!(response.debug_info.branch_failures.len(), 1);
	assert_eq!(response.debug_info.branch_failures[0].strategy, "hybrid");
	assert!(response.debug_info.branch_failures[0].error.contains("sparse index offline"));
	assert_eq!(sink.records().len(), 1);
}

#[tokio::test]
async fn every_branch_failing_fails_the_call() {
	let dense = Arc::new(ScriptedRetriever::failing(StrategyKind::RetrieveRead, "vector store down"));
	let hybrid = Arc::new(ScriptedRetriever::failing(StrategyKind::Hybrid, "sparse index offline"));
	let sink = Arc::new(RecordingAnalyticsSink::new());
	let service = scripted_service(registry(&[dense.clone(), hybrid.clone()]), sink.clone());
	let err = service
		.ensemble_retrieve(
			RagQuery::new("rust ownership"),
			&[StrategyKind::RetrieveRead, StrategyKind::Hybrid],
		)
		.await
		.expect_err("Expected the ensemble to fail.");
	let Error::AllStrategiesFailed { failures, .. } = &err else {
		panic!("Unexpected error: {err:?}");
	};
	let strategies: Vec<&str> = failures.iter().map(|failure| failure.strategy.as_str()).collect();

	assert_eq!(strategies, vec!["retrieve_read", "hybrid"]);
	assert_eq!(dense.call_count(), 1);
	assert!(sink.records().is_empty());
}

#[tokio::test]
async fn duplicate_members_run_once() {
	let dense =
		Arc::new(ScriptedRetriever::returning(StrategyKind::RetrieveRead, &[("doc-a", 0.8)]));
	let hybrid = Arc::new(ScriptedRetriever::returning(StrategyKind::Hybrid, &[("doc-a", 0.6)]));
	let service = scripted_service(
		registry(&[dense.clone(), hybrid.clone()]),
		Arc::new(RecordingAnalyticsSink::new()),
	);
	let response = service
		.ensemble_retrieve(
			RagQuery::new("rust ownership"),
			&[StrategyKind::RetrieveRead, StrategyKind::Hybrid, StrategyKind::RetrieveRead],
		)
		.await
		.expect("Failed to run ensemble retrieval.");

	assert_eq!(dense.call_count(), 1);
	assert_eq!(hybrid.call_count(), 1);
	assert_eq!(response.results.len(), 1);
	assert_eq!(response.results[0].score, 0.8);
	assert_eq!(response.results[0].rank, 1);
}

#[tokio::test]
async fn single_member_is_served_like_a_direct_strategy_call() {
	let dense =
		Arc::new(ScriptedRetriever::returning(StrategyKind::RetrieveRead, &[("doc-a", 0.8)]));
	let service = scripted_service(registry(&[dense.clone()]), Arc::new(RecordingAnalyticsSink::new()));
	let response = service
		.ensemble_retrieve(RagQuery::new("rust ownership"), &[StrategyKind::RetrieveRead])
		.await
		.expect("Failed to run ensemble retrieval.");

	assert_eq!(response.strategy, "retrieve_read");
	assert_eq!(dense.call_count(), 1);
}

#[tokio::test]
async fn empty_and_adaptive_member_lists_are_rejected() {
	let dense =
		Arc::new(ScriptedRetriever::returning(StrategyKind::RetrieveRead, &[("doc-a", 0.8)]));
	let hybrid = Arc::new(ScriptedRetriever::returning(StrategyKind::Hybrid, &[("doc-a", 0.6)]));
	let service = scripted_service(
		registry(&[dense.clone(), hybrid.clone()]),
		Arc::new(RecordingAnalyticsSink::new()),
	);
	let empty = service
		.ensemble_retrieve(RagQuery::new("rust ownership"), &[])
		.await
		.expect_err("Expected an empty ensemble to be rejected.");
	let adaptive = service
		.ensemble_retrieve(
			RagQuery::new("rust ownership"),
			&[StrategyKind::Adaptive, StrategyKind::Hybrid],
		)
		.await
		.expect_err("Expected an adaptive member to be rejected.");

	assert!(matches!(empty, Error::InvalidRequest { .. }));
	assert!(matches!(adaptive, Error::InvalidRequest { .. }));
	assert_eq!(dense.call_count(), 0);
	assert_eq!(hybrid.call_count(), 0);
}

#[tokio::test]
async fn stalled_branch_times_out_without_sinking_the_ensemble() {
	let dense =
		Arc::new(ScriptedRetriever::returning(StrategyKind::RetrieveRead, &[("doc-a", 0.8)]));
	let hybrid =
		Arc::new(ScriptedRetriever::stalling(StrategyKind::Hybrid, Duration::from_secs(5)));
	let service = scripted_service(
		registry(&[dense.clone(), hybrid.clone()]),
		Arc::new(RecordingAnalyticsSink::new()),
	);
	let query = RagQuery { timeout_ms: Some(50), ..RagQuery::new("rust ownership") };
	let response = service
		.ensemble_retrieve(query, &[StrategyKind::RetrieveRead, StrategyKind::Hybrid])
		.await
		.expect("Failed to run ensemble retrieval.");

	assert_eq!(response.results.len(), 1);
	assert_eq!(response.debug_info.branch_failures.len(), 1);
	assert!(response.debug_info.branch_failures[0].error.contains("timed out"));
}

#[tokio::test]
async fn dropping_the_call_aborts_in_flight_branches() {
	let dense =
		Arc::new(ScriptedRetriever::returning(StrategyKind::RetrieveRead, &[("doc-a", 0.8)]));
	let hybrid =
		Arc::new(ScriptedRetriever::stalling(StrategyKind::Hybrid, Duration::from_millis(300)));
	let sink = Arc::new(RecordingAnalyticsSink::new());
	let service = scripted_service(registry(&[dense.clone(), hybrid.clone()]), sink.clone());
	let query = RagQuery { timeout_ms: Some(10_000), ..RagQuery::new("rust ownership") };
	let outcome = tokio::time::timeout(
		Duration::from_millis(50),
		service.ensemble_retrieve(query, &[StrategyKind::RetrieveRead, StrategyKind::Hybrid]),
	)
	.await;

	assert!(outcome.is_err(), "Expected the caller to give up first.");
	assert_eq!(hybrid.call_count(), 1);

	tokio::time::sleep(Duration::from_millis(600)).await;

	assert_eq!(dense.completed_count(), 1);
	assert_eq!(hybrid.completed_count(), 0);
	assert!(sink.records().is_empty());
}
