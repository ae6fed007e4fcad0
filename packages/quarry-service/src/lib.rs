pub mod analytics;
pub mod fusion;
pub mod ingest;
pub mod orchestrator;
pub mod query;
pub mod response;
pub mod retriever;
pub mod strategy;

mod error;

pub use analytics::{NoopAnalyticsSink, PgAnalyticsSink, TracingAnalyticsSink};
pub use error::{BranchFailure, Error, Result};
pub use fusion::{ENSEMBLE_STRATEGY_LABEL, EnsembleFuser, FusionMethod};
pub use orchestrator::RagService;
pub use query::{PreparedQuery, RagQuery};
pub use response::{DebugInfo, RagResponse, RetrievalResult, ScoringBreakdown};
pub use retriever::{
	DenseRetriever, GraphRetriever, HybridRetriever, RerankRetriever, RetrievalBackends, Retriever,
	RetrieverRegistry,
};
pub use strategy::{StrategyConfig, StrategyTemplates};

pub use quarry_storage::BoxFuture;

use std::sync::Arc;

use quarry_config::{EmbeddingProviderConfig, ProviderConfig};
use quarry_providers::{EmbeddingKind, embedding, rerank};
use quarry_storage::models::QueryAnalytics;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		kind: EmbeddingKind,
	) -> BoxFuture<'a, quarry_providers::Result<Vec<Vec<f32>>>>;

	fn embed_query<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, quarry_providers::Result<Vec<f32>>> {
		Box::pin(embed_one(self, cfg, text, EmbeddingKind::Query))
	}

	fn embed_document<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, quarry_providers::Result<Vec<f32>>> {
		Box::pin(embed_one(self, cfg, text, EmbeddingKind::Document))
	}
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, quarry_providers::Result<Vec<f32>>>;
}

/// Per-query telemetry. Failures are logged by the caller and never fail a retrieval.
pub trait AnalyticsSink
where
	Self: Send + Sync,
{
	fn record<'a>(&'a self, record: &'a QueryAnalytics) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, rerank: Arc<dyn RerankProvider>) -> Self {
		Self { embedding, rerank }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), rerank: provider }
	}
}

/// HTTP-backed providers.
struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		kind: EmbeddingKind,
	) -> BoxFuture<'a, quarry_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts, kind))
	}
}
impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, quarry_providers::Result<Vec<f32>>> {
		Box::pin(rerank::rerank(cfg, query, docs))
	}
}

async fn embed_one<P>(
	provider: &P,
	cfg: &EmbeddingProviderConfig,
	text: &str,
	kind: EmbeddingKind,
) -> quarry_providers::Result<Vec<f32>>
where
	P: EmbeddingProvider + ?Sized,
{
	let texts = [text.to_string()];
	let mut vectors = provider.embed(cfg, &texts, kind).await?;

	vectors.pop().ok_or_else(|| quarry_providers::Error::InvalidResponse {
		message: "Embedding provider returned no vectors.".to_string(),
	})
}
