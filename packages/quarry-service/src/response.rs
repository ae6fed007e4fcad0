use std::{cmp::Ordering, time::Duration};

use serde::Serialize;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::{BranchFailure, query::PreparedQuery};
use quarry_domain::{Granularity, RoutingDecision, StrategyKind};
use quarry_storage::models::{ChunkGranularity, ChunkHit};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoringBreakdown {
	pub dense: Option<f32>,
	pub sparse: Option<f32>,
	pub hybrid: Option<f32>,
	pub rerank: Option<f32>,
	pub graph: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
	pub id: String,
	pub content: String,
	/// Always in `[0, 1]`.
	pub score: f32,
	/// 1-based, assigned after final ordering.
	pub rank: u32,
	pub document_id: String,
	pub chunk_id: Option<Uuid>,
	pub scoring: ScoringBreakdown,
	pub metadata: Map<String, Value>,
	pub chunk_granularity: Option<ChunkGranularity>,
	/// Neighboring chunks of the same document, in chunk order.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expanded_context: Option<String>,
	#[serde(skip)]
	pub(crate) chunk_index: Option<i32>,
}
impl RetrievalResult {
	/// Unranked result without chunk provenance.
	pub fn new(
		document_id: impl Into<String>,
		chunk_id: Option<Uuid>,
		content: impl Into<String>,
		score: f32,
	) -> Self {
		let document_id = document_id.into();

		Self {
			id: chunk_id.map(|id| id.to_string()).unwrap_or_else(|| document_id.clone()),
			content: content.into(),
			score,
			rank: 0,
			document_id,
			chunk_id,
			scoring: ScoringBreakdown::default(),
			metadata: Map::new(),
			chunk_granularity: None,
			expanded_context: None,
			chunk_index: None,
		}
	}

	pub fn from_hit(hit: ChunkHit) -> Self {
		let chunk = hit.chunk;
		let mut metadata = chunk.metadata;
		let optional = |value: Option<String>| value.map(Value::String).unwrap_or(Value::Null);

		metadata.insert("chunk_index".to_string(), Value::from(chunk.chunk_index));
		metadata.insert("title".to_string(), optional(chunk.title));
		metadata.insert("source".to_string(), optional(chunk.source));
		metadata.insert("content_type".to_string(), optional(chunk.content_type));
		metadata.insert("language".to_string(), optional(chunk.language));

		if let Some(created_at) = chunk.created_at
			&& let Ok(formatted) = created_at.format(&Rfc3339)
		{
			metadata.insert("created_at".to_string(), Value::String(formatted));
		}

		Self {
			id: chunk.chunk_id.to_string(),
			content: chunk.content,
			score: hit.score,
			rank: 0,
			document_id: chunk.document_id,
			chunk_id: Some(chunk.chunk_id),
			scoring: ScoringBreakdown { dense: Some(hit.score), ..Default::default() },
			metadata,
			chunk_granularity: Some(chunk.granularity),
			expanded_context: None,
			chunk_index: Some(chunk.chunk_index),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DebugInfo {
	pub embedding_ms: f64,
	pub retrieval_ms: f64,
	pub post_processing_ms: f64,
	pub candidate_count: usize,
	pub fallback_used: bool,
	pub fallback_from: Option<StrategyKind>,
	pub fallback_reason: Option<String>,
	pub routing: Option<RoutingDecision>,
	pub branch_failures: Vec<BranchFailure>,
	/// Input strategies of a fused response.
	pub fused_strategies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagResponse {
	pub query_id: Uuid,
	pub results: Vec<RetrievalResult>,
	pub total_latency_ms: f64,
	pub embedding_latency_ms: f64,
	pub retrieval_latency_ms: f64,
	pub reranking_latency_ms: Option<f64>,
	pub strategy: String,
	pub top_k: u32,
	pub granularity: Granularity,
	pub confidence: f32,
	pub coverage: f32,
	pub explanation: String,
	pub debug_info: DebugInfo,
}

/// Stage timings a retriever measured while serving one query.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
	pub embedding_ms: f64,
	pub retrieval_ms: f64,
	pub reranking_ms: Option<f64>,
	pub post_processing_ms: f64,
}

pub(crate) struct ResponseParts {
	pub strategy: StrategyKind,
	pub top_k: u32,
	pub granularity: Granularity,
	pub results: Vec<RetrievalResult>,
	pub candidate_count: usize,
	pub timings: StageTimings,
	pub total: Duration,
	pub explanation: String,
}

pub(crate) fn build_response(query: &PreparedQuery, parts: ResponseParts) -> RagResponse {
	let scores: Vec<f32> = parts.results.iter().map(|result| result.score).collect();

	RagResponse {
		query_id: query.query_id,
		total_latency_ms: millis(parts.total),
		embedding_latency_ms: parts.timings.embedding_ms,
		retrieval_latency_ms: parts.timings.retrieval_ms,
		reranking_latency_ms: parts.timings.reranking_ms,
		strategy: parts.strategy.to_string(),
		top_k: parts.top_k,
		granularity: parts.granularity,
		confidence: confidence(&scores),
		coverage: coverage(scores.len(), parts.top_k, &scores),
		explanation: parts.explanation,
		debug_info: DebugInfo {
			embedding_ms: parts.timings.embedding_ms,
			retrieval_ms: parts.timings.retrieval_ms,
			post_processing_ms: parts.timings.post_processing_ms,
			candidate_count: parts.candidate_count,
			..Default::default()
		},
		results: parts.results,
	}
}

/// Clamps scores into `[0, 1]`, orders best first, truncates to `top_k` and assigns ranks 1..N.
///
/// Ties are broken by `(document_id, chunk_id)` so the order is reproducible.
pub fn finalize_results(mut results: Vec<RetrievalResult>, top_k: u32) -> Vec<RetrievalResult> {
	for result in &mut results {
		result.score = normalize_score(result.score);
	}

	results.sort_by(compare_results);
	results.truncate(top_k as usize);

	for (idx, result) in results.iter_mut().enumerate() {
		result.rank = idx as u32 + 1;
	}

	results
}

pub fn normalize_score(score: f32) -> f32 {
	if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}

/// `0.7 * top + 0.3 * mean`, rounded to two decimals. Zero for an empty result set.
pub fn confidence(scores: &[f32]) -> f32 {
	if scores.is_empty() {
		return 0.0;
	}

	let top = scores.iter().copied().fold(0.0_f32, f32::max);
	let value = 0.7 * top + 0.3 * mean(scores);

	(value * 100.0).round() / 100.0
}

/// `min(count / top_k, 1) * mean`.
pub fn coverage(count: usize, top_k: u32, scores: &[f32]) -> f32 {
	if top_k == 0 || scores.is_empty() {
		return 0.0;
	}

	(count as f32 / top_k as f32).min(1.0) * mean(scores)
}

pub(crate) fn mean(values: &[f32]) -> f32 {
	if values.is_empty() {
		return 0.0;
	}

	values.iter().sum::<f32>() / values.len() as f32
}

pub(crate) fn millis(duration: Duration) -> f64 {
	duration.as_secs_f64() * 1_000.0
}

pub(crate) fn compare_results(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
	b.score
		.total_cmp(&a.score)
		.then_with(|| a.document_id.cmp(&b.document_id))
		.then_with(|| a.chunk_id.cmp(&b.chunk_id))
}
