use std::{sync::Arc, time::Instant};

use crate::{
	BoxFuture, EmbeddingProvider, Error, RagResponse, Result, Retriever, StrategyConfig,
	error::vector_store_error,
	query::{PreparedQuery, response_granularity},
	response::{self, ResponseParts, RetrievalResult, StageTimings},
};
use quarry_config::EmbeddingProviderConfig;
use quarry_domain::StrategyKind;
use quarry_storage::{
	VectorStore,
	models::{ChunkGranularity, ChunkHit, VectorSearch},
};

/// Dense hits for one query, before strategy-specific scoring.
#[derive(Debug, Clone)]
pub struct Candidates {
	pub hits: Vec<ChunkHit>,
	pub granularity: ChunkGranularity,
	pub embedding_ms: f64,
	pub retrieval_ms: f64,
}

/// Retrieve-then-read over the vector store.
#[derive(Clone)]
pub struct DenseRetriever {
	vectors: Arc<dyn VectorStore>,
	embedding: Arc<dyn EmbeddingProvider>,
	cfg: EmbeddingProviderConfig,
}
impl DenseRetriever {
	pub fn new(
		vectors: Arc<dyn VectorStore>,
		embedding: Arc<dyn EmbeddingProvider>,
		cfg: EmbeddingProviderConfig,
	) -> Self {
		Self { vectors, embedding, cfg }
	}

	/// Embeds the query and searches the tier it resolves to. Hits score strictly above
	/// `score_threshold`, best first.
	pub async fn candidates(
		&self,
		query: &PreparedQuery,
		limit: u32,
		score_threshold: f32,
	) -> Result<Candidates> {
		let started = Instant::now();
		let vector = self.embedding.embed_query(&self.cfg, &query.text).await?;

		if vector.len() != self.cfg.dimensions as usize {
			return Err(Error::Provider {
				message: format!(
					"Embedding has dimension {}, expected {}.",
					vector.len(),
					self.cfg.dimensions
				),
			});
		}

		let embedding_ms = response::millis(started.elapsed());
		let granularity = query.chunk_granularity();
		let request = VectorSearch {
			vector,
			top_k: limit,
			score_threshold,
			granularity,
			filters: query.filters.clone(),
		};
		let started = Instant::now();
		let mut hits = self.vectors.search(&request).await.map_err(vector_store_error)?;
		let retrieval_ms = response::millis(started.elapsed());

		hits.retain(|hit| hit.score > score_threshold);
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(limit as usize);

		tracing::debug!(
			query_id = %query.query_id,
			granularity = %granularity,
			hits = hits.len(),
			"Dense candidates retrieved."
		);

		Ok(Candidates { hits, granularity, embedding_ms, retrieval_ms })
	}

	/// Attaches the chunk itself plus its immediate neighbors as `expanded_context`.
	pub async fn expand_context(&self, results: &mut [RetrievalResult]) -> Result<()> {
		for result in results.iter_mut() {
			let (Some(index), Some(granularity)) = (result.chunk_index, result.chunk_granularity)
			else {
				continue;
			};
			let indexes = neighbor_indexes(index);
			let neighbors = self
				.vectors
				.fetch(&result.document_id, granularity, &indexes)
				.await
				.map_err(vector_store_error)?;
			let mut neighbors: Vec<_> =
				neighbors.into_iter().filter(|chunk| indexes.contains(&chunk.chunk_index)).collect();

			neighbors.sort_by_key(|chunk| chunk.chunk_index);

			if neighbors.is_empty() {
				continue;
			}

			result.expanded_context = Some(
				neighbors.iter().map(|chunk| chunk.content.as_str()).collect::<Vec<_>>().join("\n"),
			);
		}

		Ok(())
	}

	async fn retrieve_dense(
		&self,
		query: &PreparedQuery,
		config: &StrategyConfig,
	) -> Result<RagResponse> {
		let started = Instant::now();
		let candidates = self.candidates(query, config.top_k, config.score_threshold).await?;
		let post_started = Instant::now();
		let candidate_count = candidates.hits.len();
		let mut results = response::finalize_results(
			candidates.hits.into_iter().map(RetrievalResult::from_hit).collect(),
			config.top_k,
		);

		if query.wants_expanded_context() {
			self.expand_context(&mut results).await?;
		}

		let timings = StageTimings {
			embedding_ms: candidates.embedding_ms,
			retrieval_ms: candidates.retrieval_ms,
			reranking_ms: None,
			post_processing_ms: response::millis(post_started.elapsed()),
		};
		let explanation = format!(
			"Dense retrieval over {} chunks returned {} of {} candidates above {:.2}.",
			candidates.granularity,
			results.len(),
			candidate_count,
			config.score_threshold
		);

		Ok(response::build_response(
			query,
			ResponseParts {
				strategy: StrategyKind::RetrieveRead,
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
impl Retriever for DenseRetriever {
	fn kind(&self) -> StrategyKind {
		StrategyKind::RetrieveRead
	}

	fn retrieve<'a>(
		&'a self,
		query: &'a PreparedQuery,
		config: &'a StrategyConfig,
	) -> BoxFuture<'a, Result<RagResponse>> {
		Box::pin(self.retrieve_dense(query, config))
	}
}

/// `index` and whichever of its neighbors exist in the `i32` index space.
fn neighbor_indexes(index: i32) -> Vec<i32> {
	[index.checked_sub(1), Some(index), index.checked_add(1)].into_iter().flatten().collect()
}
