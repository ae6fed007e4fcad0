use std::{sync::Arc, time::Instant};

use crate::{
	BoxFuture, Error, RagResponse, RerankProvider, Result, Retriever, StrategyConfig,
	query::{PreparedQuery, response_granularity},
	response::{self, ResponseParts, RetrievalResult, StageTimings},
	retriever::DenseRetriever,
};
use quarry_config::ProviderConfig;
use quarry_domain::StrategyKind;

/// Dense recall followed by cross-encoder reranking.
#[derive(Clone)]
pub struct RerankRetriever {
	dense: DenseRetriever,
	rerank: Arc<dyn RerankProvider>,
	cfg: ProviderConfig,
}
impl RerankRetriever {
	pub fn new(dense: DenseRetriever, rerank: Arc<dyn RerankProvider>, cfg: ProviderConfig) -> Self {
		Self { dense, rerank, cfg }
	}

	async fn retrieve_reranked(
		&self,
		query: &PreparedQuery,
		config: &StrategyConfig,
	) -> Result<RagResponse> {
		let started = Instant::now();
		let depth = config.rerank_depth.max(config.top_k);
		let candidates = self.dense.candidates(query, depth, 0.0).await?;
		let candidate_count = candidates.hits.len();
		let docs: Vec<String> = candidates.hits.iter().map(|hit| hit.chunk.content.clone()).collect();
		let rerank_started = Instant::now();
		let scores = self.rerank.rerank(&self.cfg, &query.text, &docs).await?;
		let reranking_ms = response::millis(rerank_started.elapsed());

		if scores.len() != docs.len() {
			return Err(Error::Provider {
				message: format!(
					"Rerank provider returned {} scores for {} documents.",
					scores.len(),
					docs.len()
				),
			});
		}

		let post_started = Instant::now();
		let weight = config.rerank_retrieval_weight;
		let mut results = Vec::with_capacity(candidate_count);

		for (hit, rerank_score) in candidates.hits.into_iter().zip(scores) {
			let dense = response::normalize_score(hit.score);
			let rerank_score = response::normalize_score(rerank_score);
			let score = weight * dense + (1.0 - weight) * rerank_score;

			if score <= config.score_threshold {
				continue;
			}

			let mut result = RetrievalResult::from_hit(hit);

			result.score = score;
			result.scoring.dense = Some(dense);
			result.scoring.rerank = Some(rerank_score);

			results.push(result);
		}

		let mut results = response::finalize_results(results, config.top_k);

		if query.wants_expanded_context() {
			self.dense.expand_context(&mut results).await?;
		}

		let timings = StageTimings {
			embedding_ms: candidates.embedding_ms,
			retrieval_ms: candidates.retrieval_ms,
			reranking_ms: Some(reranking_ms),
			post_processing_ms: response::millis(post_started.elapsed()),
		};
		let explanation = format!(
			"Reranked {} {} candidates with {}; kept {}.",
			candidate_count,
			candidates.granularity,
			self.cfg.model,
			results.len()
		);

		Ok(response::build_response(
			query,
			ResponseParts {
				strategy: StrategyKind::TwoStageRerank,
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
impl Retriever for RerankRetriever {
	fn kind(&self) -> StrategyKind {
		StrategyKind::TwoStageRerank
	}

	fn retrieve<'a>(
		&'a self,
		query: &'a PreparedQuery,
		config: &'a StrategyConfig,
	) -> BoxFuture<'a, Result<RagResponse>> {
		Box::pin(self.retrieve_reranked(query, config))
	}
}
