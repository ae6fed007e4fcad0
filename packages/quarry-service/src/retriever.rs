mod dense;
mod graph;
mod hybrid;
mod rerank;

pub use dense::{Candidates, DenseRetriever};
pub use graph::GraphRetriever;
pub use hybrid::HybridRetriever;
pub use rerank::RerankRetriever;

use std::{collections::HashMap, sync::Arc};

use crate::{BoxFuture, Providers, RagResponse, Result, StrategyConfig, query::PreparedQuery};
use quarry_config::Providers as ProviderSettings;
use quarry_domain::StrategyKind;
use quarry_storage::{GraphStore, VectorStore};

/// One retrieval algorithm.
pub trait Retriever
where
	Self: Send + Sync,
{
	fn kind(&self) -> StrategyKind;

	fn retrieve<'a>(
		&'a self,
		query: &'a PreparedQuery,
		config: &'a StrategyConfig,
	) -> BoxFuture<'a, Result<RagResponse>>;
}

/// Store handles and providers the standard retrievers are built from.
#[derive(Clone)]
pub struct RetrievalBackends {
	pub vectors: Arc<dyn VectorStore>,
	pub graph: Option<Arc<dyn GraphStore>>,
	pub providers: Providers,
}

/// Strategy kind to retriever. Built once at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct RetrieverRegistry {
	retrievers: HashMap<StrategyKind, Arc<dyn Retriever>>,
}
impl RetrieverRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers every strategy the backends can serve. Two-stage rerank needs a rerank
	/// provider and graph RAG needs a graph store.
	pub fn standard(backends: &RetrievalBackends, settings: &ProviderSettings) -> Self {
		let dense = DenseRetriever::new(
			backends.vectors.clone(),
			backends.providers.embedding.clone(),
			settings.embedding.clone(),
		);
		let mut registry = Self::new();

		registry.register(Arc::new(dense.clone()));
		registry.register(Arc::new(HybridRetriever::new(dense.clone())));

		if let Some(rerank) = settings.rerank.as_ref() {
			registry.register(Arc::new(RerankRetriever::new(
				dense,
				backends.providers.rerank.clone(),
				rerank.clone(),
			)));
		}
		if let Some(graph) = backends.graph.as_ref() {
			registry.register(Arc::new(GraphRetriever::new(graph.clone())));
		}

		registry
	}

	/// Replaces any retriever already registered for the same kind.
	pub fn register(&mut self, retriever: Arc<dyn Retriever>) -> &mut Self {
		self.retrievers.insert(retriever.kind(), retriever);

		self
	}

	pub fn get(&self, kind: StrategyKind) -> Option<Arc<dyn Retriever>> {
		self.retrievers.get(&kind).cloned()
	}

	pub fn contains(&self, kind: StrategyKind) -> bool {
		self.retrievers.contains_key(&kind)
	}

	pub fn kinds(&self) -> Vec<StrategyKind> {
		let mut kinds: Vec<StrategyKind> = self.retrievers.keys().copied().collect();

		kinds.sort();

		kinds
	}
}
