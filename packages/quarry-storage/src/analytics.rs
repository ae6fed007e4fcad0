use sqlx::{PgConnection, types::Json};

use crate::{Result, models::QueryAnalytics};

/// Upserts by `query_id`, so a retried record replaces the earlier one.
pub async fn insert_query_analytics(
	executor: &mut PgConnection,
	record: &QueryAnalytics,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO query_analytics (
	query_id,
	session_id,
	client_id,
	query_text,
	query_type,
	difficulty,
	intent,
	strategy,
	fallback_used,
	result_count,
	top_k,
	total_latency_ms,
	embedding_latency_ms,
	retrieval_latency_ms,
	reranking_latency_ms,
	confidence,
	coverage,
	metadata,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
ON CONFLICT (query_id) DO UPDATE
SET
	strategy = EXCLUDED.strategy,
	fallback_used = EXCLUDED.fallback_used,
	result_count = EXCLUDED.result_count,
	total_latency_ms = EXCLUDED.total_latency_ms,
	embedding_latency_ms = EXCLUDED.embedding_latency_ms,
	retrieval_latency_ms = EXCLUDED.retrieval_latency_ms,
	reranking_latency_ms = EXCLUDED.reranking_latency_ms,
	confidence = EXCLUDED.confidence,
	coverage = EXCLUDED.coverage,
	metadata = EXCLUDED.metadata,
	created_at = EXCLUDED.created_at",
	)
	.bind(record.query_id)
	.bind(record.session_id.as_deref())
	.bind(record.client_id.as_deref())
	.bind(record.query_text.as_str())
	.bind(record.query_type.as_deref())
	.bind(record.difficulty.as_deref())
	.bind(record.intent.as_deref())
	.bind(record.strategy.as_str())
	.bind(record.fallback_used)
	.bind(record.result_count)
	.bind(record.top_k)
	.bind(record.total_latency_ms)
	.bind(record.embedding_latency_ms)
	.bind(record.retrieval_latency_ms)
	.bind(record.reranking_latency_ms)
	.bind(record.confidence)
	.bind(record.coverage)
	.bind(Json(&record.metadata))
	.bind(record.created_at)
	.execute(&mut *executor)
	.await?;

	Ok(())
}
