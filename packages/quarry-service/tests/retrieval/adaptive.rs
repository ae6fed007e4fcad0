use std::sync::Arc;

use quarry_domain::{StoreKind, StrategyKind};
use quarry_service::{Error, RagQuery, RetrieverRegistry};
use quarry_testkit::{RecordingAnalyticsSink, ScriptedRetriever};

use super::{Harness, scripted_service};

const RELATIONSHIP_QUERY: &str = "How is Rust related to Mozilla?";

#[tokio::test]
async fn simple_semantic_query_is_routed_to_the_vector_store() {
	let harness = Harness::new();
	let response = harness
		.service
		.adaptive_retrieve(RagQuery::new("What is machine learning?"))
		.await
		.expect("Failed to run adaptive retrieval.");
	let routing = response.debug_info.routing.as_ref().expect("Expected a routing decision.");

	assert_eq!(response.strategy, "adaptive");
	assert_eq!(routing.primary_store, StoreKind::Vector);
	assert_eq!(routing.secondary_store, None);
	assert!(!routing.reasoning.is_empty());
	assert!(response.explanation.starts_with(&routing.reasoning));
	assert_eq!(response.results[0].document_id, "ml-intro");
}

#[tokio::test]
async fn relationship_query_fuses_vector_and_graph_results() {
	let harness = Harness::with_graph();
	let response = harness
		.service
		.adaptive_retrieve(RagQuery::new(RELATIONSHIP_QUERY))
		.await
		.expect("Failed to run adaptive retrieval.");
	let routing = response.debug_info.routing.as_ref().expect("Expected a routing decision.");

	assert_eq!(response.strategy, "adaptive");
	assert!(routing.use_hybrid);
	assert_eq!(routing.stores(), vec![StoreKind::Vector, StoreKind::Graph]);
	assert_eq!(response.debug_info.fused_strategies, vec!["retrieve_read", "graph_rag"]);
	assert!(response.results.iter().any(|result| result.document_id == "mozilla-profile"));
	assert!(response.results.iter().any(|result| result.document_id == "rust-history"));

	let mut keys: Vec<_> = response
		.results
		.iter()
		.map(|result| (result.document_id.clone(), result.chunk_id))
		.collect();
	let total = keys.len();

	keys.sort();
	keys.dedup();

	assert_eq!(keys.len(), total);
}

#[tokio::test]
async fn graph_route_without_a_graph_store_is_a_configuration_error() {
	let harness = Harness::new();
	let err = harness
		.service
		.adaptive_retrieve(RagQuery::new(RELATIONSHIP_QUERY))
		.await
		.expect_err("Expected a configuration error.");

	assert!(matches!(err, Error::Configuration { .. }), "Unexpected error: {err:?}");
	assert!(harness.analytics.records().is_empty());
}

#[tokio::test]
async fn graph_analytics_query_is_served_by_the_graph_store_alone() {
	let harness = Harness::with_graph();
	let response = harness
		.service
		.adaptive_retrieve(RagQuery::new("Which community is Rust part of?"))
		.await
		.expect("Failed to run adaptive retrieval.");
	let routing = response.debug_info.routing.as_ref().expect("Expected a routing decision.");

	assert_eq!(routing.primary_store, StoreKind::Graph);
	assert!(!routing.use_hybrid);
	assert!(response.results.iter().all(|result| result.metadata.contains_key("path")));
	assert!(harness.graph.is_some());
}

#[tokio::test]
async fn vector_only_route_does_not_retry_the_same_retriever() {
	let dense =
		Arc::new(ScriptedRetriever::failing(StrategyKind::RetrieveRead, "vector store offline"));
	let mut registry = RetrieverRegistry::new();

	registry.register(dense.clone());

	let analytics = Arc::new(RecordingAnalyticsSink::new());
	let service = scripted_service(registry, analytics.clone());
	let err = service
		.adaptive_retrieve(RagQuery::new("what is ownership"))
		.await
		.expect_err("Expected the vector store failure.");

	assert_eq!(dense.call_count(), 1);
	assert!(matches!(err.root_cause(), Error::Provider { .. }), "Unexpected error: {err:?}");
	assert!(analytics.records().is_empty());
}
