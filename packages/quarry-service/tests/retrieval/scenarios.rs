use quarry_domain::{Difficulty, Granularity, QueryType, StrategyKind};
use quarry_service::RagQuery;

use super::Harness;

const ARCHITECTURE_QUERY: &str = "Analyze and compare the architectural trade-offs of microservices versus monoliths across twenty-five different dimensions of scalability, cost, and team structure";

#[tokio::test]
async fn simple_factual_query_uses_dense_retrieval_over_coarse_chunks() {
	let harness = Harness::new();
	let analysis = harness.service.analyzer().analyze("What is machine learning?");

	assert_eq!(analysis.difficulty, Difficulty::Easy);
	assert_eq!(analysis.query_type, QueryType::Factual);
	assert_eq!(analysis.suggested_strategy, StrategyKind::RetrieveRead);

	let response = harness
		.service
		.retrieve(RagQuery::new("What is machine learning?"))
		.await
		.expect("Failed to retrieve.");

	assert_eq!(response.strategy, "retrieve_read");
	assert_eq!(response.granularity, Granularity::Coarse);
	assert!(!response.debug_info.fallback_used);
	assert!(!response.results.is_empty());
	assert_eq!(response.results[0].document_id, "ml-intro");
	assert!(response.results.iter().all(|result| {
		result.chunk_granularity == Some(quarry_storage::models::ChunkGranularity::Coarse)
	}));
}

#[tokio::test]
async fn long_analytical_query_is_reranked_over_fine_chunks() {
	let harness = Harness::new();
	let analysis = harness.service.analyzer().analyze(ARCHITECTURE_QUERY);

	assert_eq!(analysis.difficulty, Difficulty::Hard);
	assert_eq!(analysis.query_type, QueryType::Analytical);
	assert_eq!(analysis.suggested_strategy, StrategyKind::TwoStageRerank);

	let response = harness
		.service
		.retrieve(RagQuery::new(ARCHITECTURE_QUERY))
		.await
		.expect("Failed to retrieve.");

	assert_eq!(response.strategy, "two_stage_rerank");
	assert_eq!(response.granularity, Granularity::Fine);
	assert!(response.reranking_latency_ms.is_some());
	assert_eq!(harness.rerank.call_count(), 1);
	assert!(!response.results.is_empty());
	assert!(response.results.iter().all(|result| result.document_id == "arch-tradeoffs"));
	assert!(response.results.iter().all(|result| result.scoring.rerank.is_some()));
}

#[tokio::test]
async fn ensemble_keeps_shared_result_once_with_the_higher_score() {
	let harness = Harness::new();
	let query = || RagQuery::new("What is machine learning?");
	let dense = harness
		.service
		.retrieve_with_strategy(query(), StrategyKind::RetrieveRead, None)
		.await
		.expect("Failed to retrieve with dense strategy.");
	let hybrid = harness
		.service
		.retrieve_with_strategy(query(), StrategyKind::Hybrid, None)
		.await
		.expect("Failed to retrieve with hybrid strategy.");
	let top = dense.results.first().expect("Expected a dense result.");
	let hybrid_score = hybrid
		.results
		.iter()
		.find(|result| result.document_id == top.document_id && result.chunk_id == top.chunk_id)
		.map(|result| result.score)
		.expect("Expected the dense top result among hybrid results.");
	let fused = harness
		.service
		.ensemble_retrieve(query(), &[StrategyKind::RetrieveRead, StrategyKind::Hybrid])
		.await
		.expect("Failed to run ensemble retrieval.");
	let matching: Vec<_> = fused
		.results
		.iter()
		.filter(|result| result.document_id == top.document_id && result.chunk_id == top.chunk_id)
		.collect();

	assert_eq!(fused.strategy, quarry_service::ENSEMBLE_STRATEGY_LABEL);
	assert_eq!(fused.debug_info.fused_strategies, vec!["retrieve_read", "hybrid"]);
	assert_eq!(matching.len(), 1);
	assert_eq!(matching[0].score, top.score.max(hybrid_score));
}
