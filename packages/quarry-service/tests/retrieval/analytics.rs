use std::time::Duration;

use serde_json::{Map, Value};

use quarry_domain::{Difficulty, StrategyKind};
use quarry_service::RagQuery;
use quarry_testkit::RecordingAnalyticsSink;

use super::Harness;

#[tokio::test]
async fn served_query_is_recorded_once() {
	let harness = Harness::new();
	let query = RagQuery {
		session_id: Some("session-1".to_string()),
		client_id: Some("cli".to_string()),
		..RagQuery::new("What is machine learning?")
	};
	let response = harness.service.retrieve(query).await.expect("Failed to retrieve.");
	let records = harness.analytics.records();

	assert_eq!(records.len(), 1);

	let record = &records[0];

	assert_eq!(record.query_id, response.query_id);
	assert_eq!(record.session_id.as_deref(), Some("session-1"));
	assert_eq!(record.client_id.as_deref(), Some("cli"));
	assert_eq!(record.query_text, "What is machine learning?");
	assert_eq!(record.strategy, "retrieve_read");
	assert_eq!(record.difficulty.as_deref(), Some("easy"));
	assert_eq!(record.result_count as usize, response.results.len());
	assert_eq!(record.top_k, 5);
	assert!(!record.fallback_used);
	assert_eq!(record.confidence, response.confidence);
}

#[tokio::test]
async fn caller_annotations_are_recorded() {
	let harness = Harness::new();
	let metadata = Map::from_iter([("tenant".to_string(), Value::from("docs"))]);
	let query = RagQuery {
		difficulty: Some(Difficulty::Hard),
		metadata: metadata.clone(),
		..RagQuery::new("What is machine learning?")
	};

	harness.service.retrieve(query).await.expect("Failed to retrieve.");

	let records = harness.analytics.records();

	assert_eq!(records.len(), 1);
	assert_eq!(records[0].difficulty.as_deref(), Some("hard"));
	assert_eq!(records[0].metadata, metadata);
}

#[tokio::test]
async fn fallback_is_visible_in_analytics() {
	let harness = Harness::new();

	harness.rerank.fail_with("rerank provider offline");

	let response = harness
		.service
		.retrieve_with_strategy(
			RagQuery::new("What is machine learning?"),
			StrategyKind::TwoStageRerank,
			None,
		)
		.await
		.expect("Failed to retrieve with fallback.");
	let records = harness.analytics.records();

	assert!(response.debug_info.fallback_used);
	assert_eq!(records.len(), 1);
	assert!(records[0].fallback_used);
	assert_eq!(records[0].strategy, "retrieve_read");
}

#[tokio::test]
async fn failing_sink_never_fails_the_call() {
	let harness = Harness::with_sink(RecordingAnalyticsSink::failing());
	let response = harness
		.service
		.retrieve(RagQuery::new("What is machine learning?"))
		.await
		.expect("Failed to retrieve.");

	assert!(!response.results.is_empty());
	assert!(harness.analytics.records().is_empty());
}

#[tokio::test]
async fn stalled_sink_does_not_hold_the_call() {
	let harness = Harness::with_sink(RecordingAnalyticsSink::stalling(Duration::from_secs(30)));
	let response = tokio::time::timeout(
		Duration::from_secs(5),
		harness.service.retrieve(RagQuery::new("What is machine learning?")),
	)
	.await
	.expect("Retrieval waited on the analytics sink.")
	.expect("Failed to retrieve.");

	assert_eq!(harness.cfg.analytics.timeout_ms, 500);
	assert!(!response.results.is_empty());
	assert!(harness.analytics.records().is_empty());
}
