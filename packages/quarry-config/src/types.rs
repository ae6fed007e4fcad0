use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub retrieval: Retrieval,
	#[serde(default)]
	pub routing: Routing,
	#[serde(default)]
	pub analytics: Analytics,
	#[serde(default)]
	pub chunking: Chunking,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
	/// Optional. Required when the graph store or the postgres analytics sink is used.
	pub postgres: Option<Postgres>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	/// Instruction prepended to query text for instruction-tuned embedding models.
	pub query_instruction: Option<String>,
	/// Instruction prepended to document text at ingestion time.
	pub document_instruction: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	pub default_strategy: String,
	pub top_k: u32,
	#[serde(default = "default_max_top_k")]
	pub max_top_k: u32,
	pub score_threshold: f32,
	pub timeout_ms: u64,
	/// Map keys are strategy names, e.g. "hybrid".
	#[serde(default)]
	pub strategies: HashMap<String, StrategyOverrides>,
	#[serde(default)]
	pub ensemble: Ensemble,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StrategyOverrides {
	pub top_k: Option<u32>,
	pub score_threshold: Option<f32>,
	pub timeout_ms: Option<u64>,
	pub dense_weight: Option<f32>,
	pub sparse_weight: Option<f32>,
	pub candidate_multiplier: Option<u32>,
	pub rerank_depth: Option<u32>,
	pub rerank_retrieval_weight: Option<f32>,
	pub max_graph_hops: Option<u32>,
	pub relationship_types: Option<Vec<String>>,
	pub hop_decay: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ensemble {
	pub fusion_method: String,
	pub rrf_k: u32,
}
impl Default for Ensemble {
	fn default() -> Self {
		Self { fusion_method: "max_score".to_string(), rrf_k: 60 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Routing {
	pub default_policy: String,
}
impl Default for Routing {
	fn default() -> Self {
		Self { default_policy: "adaptive".to_string() }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Analytics {
	pub enabled: bool,
	pub sink: String,
	/// Upper bound on one sink write. A slower write is abandoned.
	pub timeout_ms: u64,
}
impl Default for Analytics {
	fn default() -> Self {
		Self { enabled: true, sink: "tracing".to_string(), timeout_ms: 500 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Chunking {
	pub coarse_max_words: u32,
	pub fine_max_words: u32,
	pub overlap_words: u32,
}
impl Default for Chunking {
	fn default() -> Self {
		Self { coarse_max_words: 256, fine_max_words: 64, overlap_words: 8 }
	}
}

fn default_max_top_k() -> u32 {
	100
}
