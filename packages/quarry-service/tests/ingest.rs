use std::sync::Arc;

use serde_json::Map;

use quarry_domain::Granularity;
use quarry_service::{
	Providers, RagQuery, RagService, RetrievalBackends,
	ingest::{self, DocumentInput},
};
use quarry_storage::qdrant::QdrantStore;
use quarry_testkit::{HashEmbedding, OverlapRerank, RecordingAnalyticsSink, TestCollection};

const GUIDE: &str = "Machine learning builds models from data. Supervised learning uses labeled \
	examples to fit a function. Unsupervised learning looks for structure without labels. \
	Reinforcement learning trains agents through rewards.";

#[tokio::test]
#[ignore = "Requires external Qdrant. Set QUARRY_QDRANT_URL to run."]
async fn ingested_document_is_retrievable_at_both_granularities() {
	let Some(url) = quarry_testkit::env_qdrant_url() else {
		eprintln!(
			"Skipping ingested_document_is_retrievable_at_both_granularities; set QUARRY_QDRANT_URL to run."
		);

		return;
	};
	let collection = TestCollection::new(url);
	let mut cfg = quarry_testkit::config();

	cfg.storage.qdrant = collection.qdrant_config(quarry_testkit::VECTOR_DIM);
	cfg.chunking.coarse_max_words = 24;
	cfg.chunking.fine_max_words = 10;
	cfg.chunking.overlap_words = 0;

	let store = QdrantStore::new(&cfg.storage.qdrant).expect("Failed to build Qdrant client.");

	store.ensure_collection().await.expect("Failed to create collection.");

	let embedding = Arc::new(HashEmbedding::new(quarry_testkit::VECTOR_DIM));
	let doc = DocumentInput {
		document_id: "ml-guide".to_string(),
		text: GUIDE.to_string(),
		title: Some("ML guide".to_string()),
		source: Some("handbook".to_string()),
		content_type: Some("text/plain".to_string()),
		language: Some("en".to_string()),
		created_at: None,
		metadata: Map::new(),
	};
	let report = ingest::ingest_document(
		embedding.as_ref(),
		&cfg.providers.embedding,
		&cfg.chunking,
		&store,
		&doc,
	)
	.await
	.expect("Failed to ingest document.");

	assert!(report.coarse_chunks >= 1);
	assert!(report.fine_chunks > report.coarse_chunks);

	let backends = RetrievalBackends {
		vectors: Arc::new(store),
		graph: None,
		providers: Providers::new(embedding, Arc::new(OverlapRerank::new())),
	};
	let service =
		RagService::from_backends(&cfg, &backends, Arc::new(RecordingAnalyticsSink::new()))
			.expect("Failed to build service.");

	for granularity in [Granularity::Coarse, Granularity::Fine] {
		let response = service
			.retrieve(RagQuery::new("supervised learning labeled examples").with_granularity(granularity))
			.await
			.expect("Failed to retrieve.");

		assert_eq!(response.granularity, granularity);
		assert!(!response.results.is_empty());
		assert_eq!(response.results[0].document_id, "ml-guide");
		assert_eq!(
			response.results[0].metadata.get("source").and_then(|value| value.as_str()),
			Some("handbook")
		);
	}

	collection.cleanup().await.expect("Failed to cleanup collection.");
}
