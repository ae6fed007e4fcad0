use std::collections::HashMap;

use uuid::Uuid;

use crate::{
	Error, RagResponse, Result,
	response::{self, DebugInfo, RetrievalResult},
};
use quarry_config::Ensemble;

/// Strategy label of every fused response.
pub const ENSEMBLE_STRATEGY_LABEL: &str = "ensemble_fusion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMethod {
	/// Keep the best-scoring instance of each result.
	MaxScore,
	/// `sum 1 / (k + rank)`, normalized by the best achievable sum.
	ReciprocalRank { k: u32 },
}
impl FusionMethod {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::MaxScore => "max_score",
			Self::ReciprocalRank { .. } => "reciprocal_rank",
		}
	}
}

#[derive(Debug, Clone, Copy)]
pub struct EnsembleFuser {
	method: FusionMethod,
}
impl EnsembleFuser {
	pub fn new(method: FusionMethod) -> Self {
		Self { method }
	}

	pub fn from_config(cfg: &Ensemble) -> Result<Self> {
		let method = match cfg.fusion_method.as_str() {
			"max_score" => FusionMethod::MaxScore,
			"reciprocal_rank" => FusionMethod::ReciprocalRank { k: cfg.rrf_k.max(1) },
			other => {
				return Err(Error::Configuration {
					message: format!("Unknown fusion method {other:?}."),
				});
			},
		};

		Ok(Self::new(method))
	}

	pub fn method(&self) -> FusionMethod {
		self.method
	}

	/// Merges responses to the same query into one ranked list of at most `top_k` results.
	///
	/// Results are keyed by `(document_id, chunk_id)`. Latencies take the slowest input;
	/// confidence and coverage are input means.
	pub fn fuse(&self, responses: &[RagResponse], top_k: u32) -> Result<RagResponse> {
		let Some(first) = responses.first() else {
			return Err(Error::InvalidRequest { message: "Nothing to fuse.".to_string() });
		};
		let (merged, unique) = match self.method {
			FusionMethod::MaxScore => max_score(responses),
			FusionMethod::ReciprocalRank { k } => reciprocal_rank(responses, k),
		};
		let results = response::finalize_results(merged, top_k);
		let strategies: Vec<String> =
			responses.iter().map(|response| response.strategy.clone()).collect();
		let confidences: Vec<f32> = responses.iter().map(|response| response.confidence).collect();
		let coverages: Vec<f32> = responses.iter().map(|response| response.coverage).collect();
		let max_of = |value: fn(&RagResponse) -> f64| {
			responses.iter().map(value).fold(0.0_f64, f64::max)
		};
		let reranking_latency_ms = responses
			.iter()
			.filter_map(|response| response.reranking_latency_ms)
			.reduce(f64::max);
		let explanation = format!(
			"Fused {} strategies ({}) with {}; {} unique results, kept {}.",
			responses.len(),
			strategies.join(", "),
			self.method.as_str(),
			unique,
			results.len()
		);

		Ok(RagResponse {
			query_id: first.query_id,
			results,
			total_latency_ms: max_of(|response| response.total_latency_ms),
			embedding_latency_ms: max_of(|response| response.embedding_latency_ms),
			retrieval_latency_ms: max_of(|response| response.retrieval_latency_ms),
			reranking_latency_ms,
			strategy: ENSEMBLE_STRATEGY_LABEL.to_string(),
			top_k,
			granularity: first.granularity,
			confidence: response::mean(&confidences),
			coverage: response::mean(&coverages),
			explanation,
			debug_info: DebugInfo {
				embedding_ms: max_of(|response| response.debug_info.embedding_ms),
				retrieval_ms: max_of(|response| response.debug_info.retrieval_ms),
				post_processing_ms: max_of(|response| response.debug_info.post_processing_ms),
				candidate_count: unique,
				fused_strategies: strategies,
				..Default::default()
			},
		})
	}
}

fn max_score(responses: &[RagResponse]) -> (Vec<RetrievalResult>, usize) {
	let mut best: HashMap<(String, Option<Uuid>), RetrievalResult> = HashMap::new();

	for result in responses.iter().flat_map(|response| response.results.iter()) {
		let key = (result.document_id.clone(), result.chunk_id);

		if best.get(&key).is_none_or(|existing| result.score > existing.score) {
			best.insert(key, result.clone());
		}
	}

	let unique = best.len();

	(best.into_values().collect(), unique)
}

fn reciprocal_rank(responses: &[RagResponse], k: u32) -> (Vec<RetrievalResult>, usize) {
	let k = k as f32;
	let ceiling = responses.len() as f32 / (k + 1.0);
	let mut fused: HashMap<(String, Option<Uuid>), (RetrievalResult, f32)> = HashMap::new();

	for response in responses {
		for (idx, result) in response.results.iter().enumerate() {
			let contribution = 1.0 / (k + idx as f32 + 1.0);
			let key = (result.document_id.clone(), result.chunk_id);

			match fused.get_mut(&key) {
				Some((kept, sum)) => {
					*sum += contribution;

					if result.score > kept.score {
						*kept = result.clone();
					}
				},
				None => {
					fused.insert(key, (result.clone(), contribution));
				},
			}
		}
	}

	let unique = fused.len();
	let results = fused
		.into_values()
		.map(|(mut result, sum)| {
			let score = sum / ceiling;

			result.score = score;
			result.scoring.hybrid = Some(score);

			result
		})
		.collect();

	(results, unique)
}
