use serde_json::Value;

use quarry_config::StrategyOverrides;
use quarry_domain::{Granularity, StrategyKind};
use quarry_service::{Error, RagQuery};
use quarry_storage::models::{ChunkGranularity, SearchFilters};

use super::{COARSE_CORPUS, Harness};

#[tokio::test]
async fn hybrid_blends_dense_and_keyword_scores() {
	let harness = Harness::new();
	let response = harness
		.service
		.retrieve_with_strategy(RagQuery::new("machine learning"), StrategyKind::Hybrid, None)
		.await
		.expect("Failed to retrieve.");

	assert_eq!(response.strategy, "hybrid");
	assert!(!response.results.is_empty());

	for result in &response.results {
		let dense = result.scoring.dense.expect("Expected a dense score.");
		let sparse = result.scoring.sparse.expect("Expected a keyword score.");
		let expected = 0.7 * dense + 0.3 * sparse;

		assert!((result.score - expected).abs() < 1e-5);
		assert_eq!(result.scoring.hybrid, Some(result.score));
	}
}

#[tokio::test]
async fn keyword_only_hybrid_ranks_full_keyword_matches_first() {
	let harness = Harness::new();
	let overrides = StrategyOverrides {
		dense_weight: Some(0.0),
		sparse_weight: Some(1.0),
		..Default::default()
	};
	let response = harness
		.service
		.retrieve_with_strategy(
			RagQuery::new("machine learning"),
			StrategyKind::Hybrid,
			Some(&overrides),
		)
		.await
		.expect("Failed to retrieve.");

	assert_eq!(response.results[0].score, 1.0);
	assert_eq!(response.results[0].document_id, "ml-intro");
	assert!(response.results.iter().all(|result| result.scoring.sparse == Some(result.score)));
}

#[tokio::test]
async fn rerank_blends_retrieval_and_rerank_scores() {
	let harness = Harness::new();
	let response = harness
		.service
		.retrieve_with_strategy(
			RagQuery::new("supervised machine learning"),
			StrategyKind::TwoStageRerank,
			None,
		)
		.await
		.expect("Failed to retrieve.");

	assert_eq!(response.strategy, "two_stage_rerank");
	assert_eq!(harness.rerank.call_count(), 1);
	assert!(response.reranking_latency_ms.is_some());
	assert_eq!(response.results[0].content, COARSE_CORPUS[1].2);

	for result in &response.results {
		let dense = result.scoring.dense.expect("Expected a dense score.");
		let rerank = result.scoring.rerank.expect("Expected a rerank score.");

		assert!((result.score - (0.3 * dense + 0.7 * rerank)).abs() < 1e-5);
	}
}

#[tokio::test]
async fn rerank_provider_failure_falls_back_to_dense_retrieval() {
	let harness = Harness::new();

	harness.rerank.fail_with("rerank provider offline");

	let response = harness
		.service
		.retrieve_with_strategy(
			RagQuery::new("supervised machine learning"),
			StrategyKind::TwoStageRerank,
			None,
		)
		.await
		.expect("Failed to retrieve with fallback.");

	assert_eq!(response.strategy, "retrieve_read");
	assert_eq!(response.debug_info.fallback_from, Some(StrategyKind::TwoStageRerank));
	assert!(response.reranking_latency_ms.is_none());
}

#[tokio::test]
async fn graph_results_decay_with_hops() {
	let harness = Harness::with_graph();
	let response = harness
		.service
		.retrieve_with_strategy(RagQuery::new("Tell me about Servo"), StrategyKind::GraphRag, None)
		.await
		.expect("Failed to retrieve.");
	let documents: Vec<&str> =
		response.results.iter().map(|result| result.document_id.as_str()).collect();

	assert_eq!(response.strategy, "graph_rag");
	assert_eq!(documents, vec!["rust-history", "mozilla-profile"]);
	assert_eq!(response.results[0].score, 1.0);
	assert_eq!(response.results[1].score, 0.8);
	assert_eq!(
		response.results[0].metadata.get("path"),
		Some(&Value::String("Servo -[WRITTEN_IN]- Rust".to_string()))
	);
	assert_eq!(response.results[1].metadata.get("hops"), Some(&Value::from(2)));
}

#[tokio::test]
async fn graph_relationship_filter_limits_traversal() {
	let harness = Harness::with_graph();
	let overrides = StrategyOverrides {
		relationship_types: Some(vec!["SPONSORED".to_string()]),
		..Default::default()
	};
	let response = harness
		.service
		.retrieve_with_strategy(
			RagQuery::new("Tell me about Servo"),
			StrategyKind::GraphRag,
			Some(&overrides),
		)
		.await
		.expect("Failed to retrieve.");

	assert!(response.results.is_empty());
	assert_eq!(response.confidence, 0.0);
}

#[tokio::test]
async fn graph_store_failure_falls_back_to_dense_retrieval() {
	let harness = Harness::with_graph();

	harness.graph.as_ref().expect("Expected a graph store.").fail_with("graph store offline");

	let response = harness
		.service
		.retrieve_with_strategy(RagQuery::new("Rust and Mozilla"), StrategyKind::GraphRag, None)
		.await
		.expect("Failed to retrieve with fallback.");

	assert_eq!(response.strategy, "retrieve_read");
	assert!(
		response
			.debug_info
			.fallback_reason
			.as_deref()
			.is_some_and(|reason| reason.contains("graph store offline"))
	);
}

#[tokio::test]
async fn adaptive_granularity_attaches_neighboring_chunks() {
	let harness = Harness::new();
	let query = RagQuery::new("supervised machine learning trains models on labeled examples")
		.with_granularity(Granularity::Adaptive);
	let response = harness.service.retrieve(query).await.expect("Failed to retrieve.");
	let top = &response.results[0];
	let expected = [COARSE_CORPUS[0].2, COARSE_CORPUS[1].2, COARSE_CORPUS[2].2].join("\n");

	assert_eq!(response.granularity, Granularity::Coarse);
	assert_eq!(top.document_id, "ml-intro");
	assert_eq!(top.metadata.get("chunk_index"), Some(&Value::from(1)));
	assert_eq!(top.expanded_context.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn last_chunk_index_expands_without_overflow() {
	let harness = Harness::new();
	let previous = "the archive keeps every revision";
	let last = "boundary chunks close out the longest archived document";

	harness.seed("archive", i32::MAX - 1, ChunkGranularity::Coarse, previous);
	harness.seed("archive", i32::MAX, ChunkGranularity::Coarse, last);

	let response = harness
		.service
		.retrieve_with_strategy(
			RagQuery::new(last).with_granularity(Granularity::Adaptive),
			StrategyKind::RetrieveRead,
			None,
		)
		.await
		.expect("Failed to retrieve.");
	let top = &response.results[0];
	let expected = [previous, last].join("\n");

	assert_eq!(top.document_id, "archive");
	assert_eq!(top.expanded_context.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn fine_granularity_searches_fine_chunks() {
	let harness = Harness::new();
	let response = harness
		.service
		.retrieve(
			RagQuery::new("microservices scalability cost").with_granularity(Granularity::Fine),
		)
		.await
		.expect("Failed to retrieve.");

	assert_eq!(response.granularity, Granularity::Fine);
	assert!(!response.results.is_empty());
	assert!(
		response
			.results
			.iter()
			.all(|result| result.chunk_granularity == Some(ChunkGranularity::Fine))
	);
}

#[tokio::test]
async fn filters_restrict_the_searched_chunks() {
	let harness = Harness::new();
	let mut record = quarry_testkit::chunk(
		"ml-handbook",
		0,
		ChunkGranularity::Coarse,
		"Machine learning handbook chapter on supervised learning.",
	);

	record.source = Some("handbook".to_string());

	let vector = harness.embedding.vector(&record.content);

	harness.vectors.insert(record, vector);

	let query = RagQuery {
		filters: SearchFilters { sources: vec!["handbook".to_string()], ..Default::default() },
		..RagQuery::new("machine learning")
	};
	let response = harness.service.retrieve(query).await.expect("Failed to retrieve.");

	assert_eq!(response.results.len(), 1);
	assert_eq!(response.results[0].document_id, "ml-handbook");
	assert_eq!(response.results[0].metadata.get("source"), Some(&Value::from("handbook")));
}

#[tokio::test]
async fn invalid_overrides_are_rejected_before_retrieval() {
	let harness = Harness::new();
	let overrides = StrategyOverrides {
		dense_weight: Some(0.0),
		sparse_weight: Some(0.0),
		..Default::default()
	};
	let err = harness
		.service
		.retrieve_with_strategy(RagQuery::new("machine learning"), StrategyKind::Hybrid, Some(&overrides))
		.await
		.expect_err("Expected invalid overrides to be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err:?}");
	assert_eq!(harness.embedding.call_count(), 0);
	assert_eq!(harness.vectors.search_count(), 0);
}
