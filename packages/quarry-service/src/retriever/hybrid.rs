use std::time::Instant;

use crate::{
	BoxFuture, RagResponse, Result, Retriever, StrategyConfig,
	query::{PreparedQuery, response_granularity},
	response::{self, ResponseParts, RetrievalResult, StageTimings},
	retriever::DenseRetriever,
};
use quarry_domain::{StrategyKind, text};

/// Dense candidates re-scored with keyword overlap.
#[derive(Clone)]
pub struct HybridRetriever {
	dense: DenseRetriever,
}
impl HybridRetriever {
	pub fn new(dense: DenseRetriever) -> Self {
		Self { dense }
	}

	async fn retrieve_hybrid(
		&self,
		query: &PreparedQuery,
		config: &StrategyConfig,
	) -> Result<RagResponse> {
		let started = Instant::now();
		let limit = config.top_k.saturating_mul(config.candidate_multiplier);
		let candidates = self.dense.candidates(query, limit, 0.0).await?;
		let post_started = Instant::now();
		let candidate_count = candidates.hits.len();
		let keywords = &query.analysis.keywords;
		let weight_sum = config.dense_weight + config.sparse_weight;
		let mut results = Vec::with_capacity(candidate_count);

		for hit in candidates.hits {
			let dense = response::normalize_score(hit.score);
			let sparse = text::lexical_overlap(keywords, &hit.chunk.content);
			let hybrid = (config.dense_weight * dense + config.sparse_weight * sparse) / weight_sum;

			if hybrid <= config.score_threshold {
				continue;
			}

			let mut result = RetrievalResult::from_hit(hit);

			result.score = hybrid;
			result.scoring.dense = Some(dense);
			result.scoring.sparse = Some(sparse);
			result.scoring.hybrid = Some(hybrid);

			results.push(result);
		}

		let mut results = response::finalize_results(results, config.top_k);

		if query.wants_expanded_context() {
			self.dense.expand_context(&mut results).await?;
		}

		let timings = StageTimings {
			embedding_ms: candidates.embedding_ms,
			retrieval_ms: candidates.retrieval_ms,
			reranking_ms: None,
			post_processing_ms: response::millis(post_started.elapsed()),
		};
		let explanation = format!(
			"Hybrid scoring ({:.2} dense, {:.2} keyword) over {} {} candidates kept {}.",
			config.dense_weight / weight_sum,
			config.sparse_weight / weight_sum,
			candidate_count,
			candidates.granularity,
			results.len()
		);

		Ok(response::build_response(
			query,
			ResponseParts {
				strategy: StrategyKind::Hybrid,
				top_k: config.top_k,
				granularity: response_granularity(candidates.granularity),
				results,
				candidate_count,
				timings,
				total: started.elapsed(),
				explanation,
			},
		))
	}
}
impl Retriever for HybridRetriever {
	fn kind(&self) -> StrategyKind {
		StrategyKind::Hybrid
	}

	fn retrieve<'a>(
		&'a self,
		query: &'a PreparedQuery,
		config: &'a StrategyConfig,
	) -> BoxFuture<'a, Result<RagResponse>> {
		Box::pin(self.retrieve_hybrid(query, config))
	}
}
