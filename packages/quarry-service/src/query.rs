use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};
use quarry_domain::{Difficulty, Granularity, QueryAnalysis, QueryType, StrategyKind};
use quarry_storage::models::{ChunkGranularity, SearchFilters};

/// Inbound query as a caller submits it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagQuery {
	pub text: String,
	/// Assigned by the service when absent.
	#[serde(default)]
	pub query_id: Option<Uuid>,
	#[serde(default)]
	pub session_id: Option<String>,
	#[serde(default)]
	pub client_id: Option<String>,
	#[serde(default)]
	pub query_type: Option<QueryType>,
	#[serde(default)]
	pub difficulty: Option<Difficulty>,
	#[serde(default)]
	pub top_k: Option<u32>,
	#[serde(default)]
	pub granularity: Granularity,
	#[serde(default)]
	pub strategy: Option<StrategyKind>,
	#[serde(default)]
	pub filters: SearchFilters,
	#[serde(default)]
	pub include_metadata: bool,
	/// Per-branch deadline. Falls back to the strategy's configured timeout.
	#[serde(default)]
	pub timeout_ms: Option<u64>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}
impl RagQuery {
	pub fn new(text: impl Into<String>) -> Self {
		Self { text: text.into(), ..Default::default() }
	}

	pub fn with_top_k(mut self, top_k: u32) -> Self {
		self.top_k = Some(top_k);

		self
	}

	pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
		self.strategy = Some(strategy);

		self
	}

	pub fn with_granularity(mut self, granularity: Granularity) -> Self {
		self.granularity = granularity;

		self
	}
}

/// A validated query with its id fixed and its analysis attached. Shared read-only by every
/// branch serving the call.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
	pub query_id: Uuid,
	pub text: String,
	pub session_id: Option<String>,
	pub client_id: Option<String>,
	/// Caller-requested result count after clamping, if any.
	pub top_k: Option<u32>,
	pub granularity: Granularity,
	pub filters: SearchFilters,
	pub include_metadata: bool,
	pub timeout_ms: Option<u64>,
	/// Caller annotations, recorded with the query's analytics.
	pub metadata: Map<String, Value>,
	pub analysis: QueryAnalysis,
	query_type: Option<QueryType>,
	difficulty: Option<Difficulty>,
}
impl PreparedQuery {
	/// Rejects malformed queries before any I/O.
	pub fn prepare(query: RagQuery, analysis: QueryAnalysis, max_top_k: u32) -> Result<Self> {
		let text = query.text.trim();

		if text.is_empty() {
			return Err(Error::InvalidRequest { message: "Query text must be non-empty.".to_string() });
		}
		if query.top_k == Some(0) {
			return Err(Error::InvalidRequest {
				message: "top_k must be greater than zero.".to_string(),
			});
		}
		if query.timeout_ms == Some(0) {
			return Err(Error::InvalidRequest {
				message: "timeout_ms must be greater than zero.".to_string(),
			});
		}

		let query_id = query.query_id.unwrap_or_else(Uuid::new_v4);
		let top_k = query.top_k.map(|requested| {
			if requested > max_top_k {
				tracing::warn!(%query_id, requested, max_top_k, "Clamping top_k to max_top_k.");
			}

			requested.min(max_top_k)
		});

		Ok(Self {
			query_id,
			text: text.to_string(),
			session_id: query.session_id,
			client_id: query.client_id,
			top_k,
			granularity: query.granularity,
			filters: query.filters,
			include_metadata: query.include_metadata,
			timeout_ms: query.timeout_ms,
			metadata: query.metadata,
			analysis,
			query_type: query.query_type,
			difficulty: query.difficulty,
		})
	}

	/// Caller-supplied type wins over the analyzer's classification.
	pub fn query_type(&self) -> QueryType {
		self.query_type.unwrap_or(self.analysis.query_type)
	}

	pub fn difficulty(&self) -> Difficulty {
		self.difficulty.unwrap_or(self.analysis.difficulty)
	}

	/// Stored tier to search. Fine when asked for or when the query needs fine-grained evidence.
	pub fn chunk_granularity(&self) -> ChunkGranularity {
		if self.granularity == Granularity::Fine || self.query_type() == QueryType::Analytical {
			ChunkGranularity::Fine
		} else {
			ChunkGranularity::Coarse
		}
	}

	pub fn wants_expanded_context(&self) -> bool {
		self.granularity == Granularity::Adaptive || self.include_metadata
	}
}

pub(crate) fn response_granularity(granularity: ChunkGranularity) -> Granularity {
	match granularity {
		ChunkGranularity::Coarse => Granularity::Coarse,
		ChunkGranularity::Fine => Granularity::Fine,
	}
}
