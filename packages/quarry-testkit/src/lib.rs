//! Fakes and fixtures shared by the workspace's integration tests.

pub mod analytics;
pub mod memory;
pub mod postgres;
pub mod providers;
pub mod qdrant;
pub mod retrievers;

mod error;

pub use analytics::RecordingAnalyticsSink;
pub use error::{Error, Result};
pub use memory::{MemoryGraphStore, MemoryVectorStore, cosine};
pub use postgres::TestDatabase;
pub use providers::{HashEmbedding, OverlapRerank};
pub use qdrant::TestCollection;
pub use retrievers::ScriptedRetriever;

use std::{collections::HashMap, env};

use serde_json::Map;

use quarry_config::{
	Analytics, Chunking, Config, EmbeddingProviderConfig, Ensemble, ProviderConfig, Providers,
	Qdrant, Retrieval, Routing, Service, Storage,
};
use quarry_storage::models::{ChunkGranularity, ChunkRecord};

pub const VECTOR_DIM: u32 = 256;

pub fn env_dsn() -> Option<String> {
	env::var("QUARRY_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("QUARRY_QDRANT_URL").ok()
}

/// A complete configuration pointing at local services, with a rerank provider and
/// `VECTOR_DIM` dimensional embeddings.
pub fn config() -> Config {
	let embedding = EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "test-key".to_string(),
		path: "/v1/embeddings".to_string(),
		model: "hash".to_string(),
		dimensions: VECTOR_DIM,
		timeout_ms: 1_000,
		default_headers: Map::new(),
		query_instruction: None,
		document_instruction: None,
	};
	let rerank = ProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "test-key".to_string(),
		path: "/v1/rerank".to_string(),
		model: "overlap".to_string(),
		timeout_ms: 1_000,
		default_headers: Map::new(),
	};

	Config {
		service: Service { log_level: "info".to_string() },
		storage: Storage {
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				collection: "quarry_test".to_string(),
				vector_dim: VECTOR_DIM,
			},
			postgres: None,
		},
		providers: Providers { embedding, rerank: Some(rerank) },
		retrieval: Retrieval {
			default_strategy: "retrieve_read".to_string(),
			top_k: 5,
			max_top_k: 20,
			score_threshold: 0.1,
			timeout_ms: 2_000,
			strategies: HashMap::new(),
			ensemble: Ensemble::default(),
		},
		routing: Routing::default(),
		analytics: Analytics::default(),
		chunking: Chunking::default(),
	}
}

pub fn chunk(
	document_id: &str,
	chunk_index: i32,
	granularity: ChunkGranularity,
	content: &str,
) -> ChunkRecord {
	ChunkRecord {
		chunk_id: ChunkRecord::chunk_id_for(document_id, granularity, chunk_index),
		document_id: document_id.to_string(),
		chunk_index,
		granularity,
		content: content.to_string(),
		title: None,
		source: None,
		content_type: None,
		language: None,
		created_at: None,
		metadata: Map::new(),
	}
}
