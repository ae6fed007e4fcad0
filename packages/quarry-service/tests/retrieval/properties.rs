use uuid::Uuid;

use quarry_domain::{Granularity, StrategyKind};
use quarry_service::{
	DebugInfo, EnsembleFuser, FusionMethod, RagQuery, RagResponse, RetrievalResult, response,
};

use super::Harness;

const QUERIES: &[&str] = &[
	"What is machine learning?",
	"supervised learning with labeled examples",
	"Rust programming language history",
	"roasted tomatoes garlic",
];

fn assert_well_formed(response: &RagResponse) {
	assert!(response.results.len() <= response.top_k as usize);

	for (idx, result) in response.results.iter().enumerate() {
		assert_eq!(result.rank, idx as u32 + 1, "Rank gap in {} response.", response.strategy);
		assert!((0.0..=1.0).contains(&result.score), "Score out of range: {}.", result.score);
	}
	for pair in response.results.windows(2) {
		assert!(pair[0].score >= pair[1].score);
	}

	assert!((0.0..=1.0).contains(&response.confidence));
	assert!((0.0..=1.0).contains(&response.coverage));
}

#[tokio::test]
async fn every_strategy_returns_contiguous_ranks_and_unit_scores() {
	let harness = Harness::with_graph();

	for text in QUERIES {
		for strategy in [
			StrategyKind::RetrieveRead,
			StrategyKind::Hybrid,
			StrategyKind::TwoStageRerank,
			StrategyKind::GraphRag,
		] {
			let response = harness
				.service
				.retrieve_with_strategy(RagQuery::new(*text).with_top_k(2), strategy, None)
				.await
				.expect("Failed to retrieve.");

			assert_eq!(response.top_k, 2);
			assert_well_formed(&response);
		}

		let fused = harness
			.service
			.ensemble_retrieve(
				RagQuery::new(*text).with_top_k(3),
				&[StrategyKind::RetrieveRead, StrategyKind::Hybrid, StrategyKind::GraphRag],
			)
			.await
			.expect("Failed to run ensemble retrieval.");

		assert_well_formed(&fused);
	}
}

#[tokio::test]
async fn requested_top_k_is_clamped_to_the_configured_maximum() {
	let harness = Harness::new();
	let response = harness
		.service
		.retrieve(RagQuery::new("machine learning").with_top_k(10_000))
		.await
		.expect("Failed to retrieve.");

	assert_eq!(response.top_k, harness.cfg.retrieval.max_top_k);
	assert_well_formed(&response);
}

fn scripted_response(strategy: &str, results: &[(&str, f32)]) -> RagResponse {
	let results = response::finalize_results(
		results
			.iter()
			.map(|(document_id, score)| {
				RetrievalResult::new(*document_id, None, format!("content of {document_id}"), *score)
			})
			.collect(),
		10,
	);

	RagResponse {
		query_id: Uuid::nil(),
		results,
		total_latency_ms: 2.0,
		embedding_latency_ms: 1.0,
		retrieval_latency_ms: 1.0,
		reranking_latency_ms: None,
		strategy: strategy.to_string(),
		top_k: 10,
		granularity: Granularity::Coarse,
		confidence: 0.5,
		coverage: 0.5,
		explanation: String::new(),
		debug_info: DebugInfo::default(),
	}
}

#[test]
fn fusing_a_subset_yields_the_superset() {
	let superset =
		scripted_response("retrieve_read", &[("doc-a", 0.9), ("doc-b", 0.6), ("doc-c", 0.3)]);
	let subset = scripted_response("hybrid", &[("doc-b", 0.6), ("doc-c", 0.3)]);

	for method in [FusionMethod::MaxScore, FusionMethod::ReciprocalRank { k: 60 }] {
		let fused = EnsembleFuser::new(method)
			.fuse(&[superset.clone(), subset.clone()], 10)
			.expect("Failed to fuse.");
		let mut documents: Vec<&str> =
			fused.results.iter().map(|result| result.document_id.as_str()).collect();

		assert_well_formed(&fused);

		documents.sort_unstable();

		assert_eq!(documents, vec!["doc-a", "doc-b", "doc-c"]);
	}

	let fused = EnsembleFuser::new(FusionMethod::MaxScore)
		.fuse(&[superset.clone(), subset], 10)
		.expect("Failed to fuse.");

	assert_eq!(fused.results, superset.results);
}
