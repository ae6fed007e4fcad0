use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{AnalyticsSink, BoxFuture, Error, RagResponse, Result, query::PreparedQuery};
use quarry_storage::models::QueryAnalytics;

/// Emits one `info` event per query.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalyticsSink;
impl AnalyticsSink for TracingAnalyticsSink {
	fn record<'a>(&'a self, record: &'a QueryAnalytics) -> BoxFuture<'a, Result<()>> {
		tracing::info!(
			query_id = %record.query_id,
			strategy = %record.strategy,
			query_type = record.query_type.as_deref().unwrap_or("-"),
			difficulty = record.difficulty.as_deref().unwrap_or("-"),
			fallback_used = record.fallback_used,
			result_count = record.result_count,
			total_latency_ms = record.total_latency_ms,
			confidence = record.confidence,
			coverage = record.coverage,
			"Query served."
		);

		Box::pin(async { Ok(()) })
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalyticsSink;
impl AnalyticsSink for NoopAnalyticsSink {
	fn record<'a>(&'a self, _record: &'a QueryAnalytics) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

/// Appends to the `query_analytics` table.
#[derive(Clone)]
pub struct PgAnalyticsSink {
	pool: PgPool,
}
impl PgAnalyticsSink {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	async fn insert(&self, record: &QueryAnalytics) -> Result<()> {
		let mut conn = self.pool.acquire().await?;

		quarry_storage::analytics::insert_query_analytics(&mut conn, record)
			.await
			.map_err(|err| Error::Storage { message: err.to_string() })
	}
}
impl AnalyticsSink for PgAnalyticsSink {
	fn record<'a>(&'a self, record: &'a QueryAnalytics) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.insert(record))
	}
}

pub(crate) fn analytics_record(query: &PreparedQuery, response: &RagResponse) -> QueryAnalytics {
	QueryAnalytics {
		query_id: response.query_id,
		session_id: query.session_id.clone(),
		client_id: query.client_id.clone(),
		query_text: query.text.clone(),
		query_type: Some(query.query_type().as_str().to_string()),
		difficulty: Some(query.difficulty().as_str().to_string()),
		intent: Some(query.analysis.intent.as_str().to_string()),
		strategy: response.strategy.clone(),
		fallback_used: response.debug_info.fallback_used,
		result_count: i32::try_from(response.results.len()).unwrap_or(i32::MAX),
		top_k: i32::try_from(response.top_k).unwrap_or(i32::MAX),
		total_latency_ms: response.total_latency_ms,
		embedding_latency_ms: response.embedding_latency_ms,
		retrieval_latency_ms: response.retrieval_latency_ms,
		reranking_latency_ms: response.reranking_latency_ms,
		confidence: response.confidence,
		coverage: response.coverage,
		metadata: query.metadata.clone(),
		created_at: OffsetDateTime::now_utc(),
	}
}
