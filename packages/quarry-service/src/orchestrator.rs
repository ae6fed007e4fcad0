use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{task::JoinSet, time};

use crate::{
	AnalyticsSink, BranchFailure, EnsembleFuser, Error, NoopAnalyticsSink, PgAnalyticsSink,
	Providers, RagQuery, RagResponse, Result, Retriever, RetrievalBackends, RetrieverRegistry,
	StrategyConfig, StrategyTemplates, TracingAnalyticsSink, analytics,
	error::{storage_error, vector_store_error},
	query::PreparedQuery,
};
use quarry_config::{Config, Retrieval, StrategyOverrides};
use quarry_domain::{
	DatabaseRouter, QueryAnalyzer, QueryContext, RoutingDecision, StoreKind, StrategyKind,
};
use quarry_storage::{GraphStore, db::Db, graph::PgGraphStore, qdrant::QdrantStore};

const DEFAULT_ANALYTICS_TIMEOUT_MS: u64 = 500;

struct Branch {
	kind: StrategyKind,
	retriever: Arc<dyn Retriever>,
	config: StrategyConfig,
}

/// What one serve attempt dispatches.
enum Plan {
	Strategy(StrategyKind),
	Routed(RoutingDecision),
}
impl Plan {
	/// Primary first.
	fn strategies(&self) -> Vec<StrategyKind> {
		match self {
			Self::Strategy(kind) => vec![*kind],
			Self::Routed(decision) => decision.stores().into_iter().map(store_strategy).collect(),
		}
	}

	/// False when the plan dispatches the fallback strategy alone.
	fn can_fall_back(&self) -> bool {
		!matches!(self.strategies().as_slice(), [StrategyKind::FALLBACK])
	}
}

/// Top-level retrieval entry point. Holds no per-query state between calls.
pub struct RagService {
	analyzer: QueryAnalyzer,
	router: DatabaseRouter,
	registry: Arc<RetrieverRegistry>,
	templates: StrategyTemplates,
	fuser: EnsembleFuser,
	analytics: Arc<dyn AnalyticsSink>,
	analytics_timeout: Duration,
	default_strategy: StrategyKind,
}
impl RagService {
	pub fn new(
		analyzer: QueryAnalyzer,
		router: DatabaseRouter,
		registry: RetrieverRegistry,
		fuser: EnsembleFuser,
		analytics: Arc<dyn AnalyticsSink>,
		cfg: &Retrieval,
	) -> Result<Self> {
		let templates = StrategyTemplates::from_config(cfg)?;
		let default_strategy: StrategyKind = cfg
			.default_strategy
			.parse()
			.map_err(|err: quarry_domain::Error| Error::Configuration { message: err.to_string() })?;

		if !registry.contains(StrategyKind::FALLBACK) {
			return Err(Error::Configuration {
				message: format!(
					"The {} retriever must be registered; it is the fallback strategy.",
					StrategyKind::FALLBACK
				),
			});
		}
		if default_strategy != StrategyKind::Adaptive && !registry.contains(default_strategy) {
			return Err(Error::Configuration {
				message: format!("Default strategy {default_strategy} has no registered retriever."),
			});
		}

		Ok(Self {
			analyzer,
			router,
			registry: Arc::new(registry),
			templates,
			fuser,
			analytics,
			analytics_timeout: Duration::from_millis(DEFAULT_ANALYTICS_TIMEOUT_MS),
			default_strategy,
		})
	}

	/// Bounds each analytics write. Retrieval never waits on the sink longer than this.
	pub fn with_analytics_timeout(mut self, timeout: Duration) -> Self {
		self.analytics_timeout = timeout;

		self
	}

	/// Builds the standard retrievers over `backends`.
	pub fn from_backends(
		cfg: &Config,
		backends: &RetrievalBackends,
		analytics: Arc<dyn AnalyticsSink>,
	) -> Result<Self> {
		let router = DatabaseRouter::from_config(&cfg.routing)
			.map_err(|err| Error::Configuration { message: err.to_string() })?;

		let service = Self::new(
			QueryAnalyzer::new(),
			router,
			RetrieverRegistry::standard(backends, &cfg.providers),
			EnsembleFuser::from_config(&cfg.retrieval.ensemble)?,
			analytics,
			&cfg.retrieval,
		)?;

		Ok(service.with_analytics_timeout(Duration::from_millis(cfg.analytics.timeout_ms)))
	}

	/// Connects Qdrant, and Postgres when configured, then builds the service with HTTP
	/// providers.
	pub async fn connect(cfg: &Config) -> Result<Self> {
		let qdrant = QdrantStore::new(&cfg.storage.qdrant).map_err(vector_store_error)?;

		qdrant.ensure_collection().await.map_err(vector_store_error)?;

		let db = match cfg.storage.postgres.as_ref() {
			Some(postgres) => {
				let db = Db::connect(postgres).await.map_err(storage_error)?;

				db.ensure_schema().await.map_err(storage_error)?;

				Some(db)
			},
			None => None,
		};
		let graph = db
			.as_ref()
			.map(|db| Arc::new(PgGraphStore::new(db.pool.clone())) as Arc<dyn GraphStore>);
		let analytics: Arc<dyn AnalyticsSink> =
			match (cfg.analytics.enabled, cfg.analytics.sink.as_str(), db.as_ref()) {
				(false, _, _) => Arc::new(NoopAnalyticsSink),
				(true, "postgres", Some(db)) => Arc::new(PgAnalyticsSink::new(db.pool.clone())),
				(true, "postgres", None) => {
					return Err(Error::Configuration {
						message: "The postgres analytics sink requires storage.postgres."
							.to_string(),
					});
				},
				(true, _, _) => Arc::new(TracingAnalyticsSink),
			};
		let backends =
			RetrievalBackends { vectors: Arc::new(qdrant), graph, providers: Providers::default() };

		Self::from_backends(cfg, &backends, analytics)
	}

	pub fn analyzer(&self) -> &QueryAnalyzer {
		&self.analyzer
	}

	pub fn router(&self) -> &DatabaseRouter {
		&self.router
	}

	pub fn registry(&self) -> &RetrieverRegistry {
		&self.registry
	}

	/// Serves `query` with its own strategy, else the analyzer's suggestion.
	pub async fn retrieve(&self, query: RagQuery) -> Result<RagResponse> {
		let requested = query.strategy;
		let prepared = self.prepare(query)?;
		let strategy = match requested {
			Some(strategy) => strategy,
			None => self.suggested_strategy(&prepared),
		};

		self.serve(prepared, strategy, None).await
	}

	/// Serves `query` with `strategy`; the analyzer is not consulted for the choice.
	pub async fn retrieve_with_strategy(
		&self,
		query: RagQuery,
		strategy: StrategyKind,
		overrides: Option<&StrategyOverrides>,
	) -> Result<RagResponse> {
		let prepared = self.prepare(query)?;

		self.serve(prepared, strategy, overrides).await
	}

	pub async fn adaptive_retrieve(&self, mut query: RagQuery) -> Result<RagResponse> {
		query.strategy = Some(StrategyKind::Adaptive);

		self.retrieve(query).await
	}

	/// Runs every strategy concurrently and fuses the successes. Failed branches are recorded
	/// on the response; the call fails only when every branch fails.
	pub async fn ensemble_retrieve(
		&self,
		query: RagQuery,
		strategies: &[StrategyKind],
	) -> Result<RagResponse> {
		let mut unique: Vec<StrategyKind> = Vec::with_capacity(strategies.len());

		for strategy in strategies {
			if !unique.contains(strategy) {
				unique.push(*strategy);
			}
		}

		match unique.as_slice() {
			[] => Err(Error::InvalidRequest {
				message: "Ensemble retrieval needs at least one strategy.".to_string(),
			}),
			[single] => self.retrieve_with_strategy(query, *single, None).await,
			_ => {
				if unique.contains(&StrategyKind::Adaptive) {
					return Err(Error::InvalidRequest {
						message: "The adaptive strategy cannot be an ensemble member.".to_string(),
					});
				}

				let prepared = Arc::new(self.prepare(query)?);
				let response = self.run_ensemble(&prepared, &unique).await?;

				self.record(&prepared, &response).await;

				Ok(response)
			},
		}
	}

	fn prepare(&self, query: RagQuery) -> Result<PreparedQuery> {
		let analysis = self.analyzer.analyze(&query.text);

		PreparedQuery::prepare(query, analysis, self.templates.max_top_k())
	}

	fn suggested_strategy(&self, query: &PreparedQuery) -> StrategyKind {
		let suggested = query.analysis.suggested_strategy;

		if self.registry.contains(suggested) {
			return suggested;
		}

		tracing::debug!(
			query_id = %query.query_id,
			suggested = %suggested,
			default = %self.default_strategy,
			"Suggested strategy is not registered; using the default strategy."
		);

		self.default_strategy
	}

	async fn serve(
		&self,
		query: PreparedQuery,
		strategy: StrategyKind,
		overrides: Option<&StrategyOverrides>,
	) -> Result<RagResponse> {
		let query = Arc::new(query);
		let plan = self.plan(&query, strategy);
		let response = match self.execute(&query, &plan, overrides).await {
			Ok(response) => response,
			Err(err) if plan.can_fall_back() && err.is_fallback_eligible() => {
				tracing::warn!(
					query_id = %query.query_id,
					strategy = %strategy,
					fallback = %StrategyKind::FALLBACK,
					error = %err,
					"Strategy failed; retrying with the fallback strategy."
				);

				let mut response = self
					.execute(&query, &Plan::Strategy(StrategyKind::FALLBACK), overrides)
					.await
					.map_err(|err| err.with_context(StrategyKind::FALLBACK.as_str(), query.query_id))?;

				response.debug_info.fallback_used = true;
				response.debug_info.fallback_from = Some(strategy);
				response.debug_info.fallback_reason = Some(err.to_string());

				response
			},
			Err(err) => return Err(err.with_context(strategy.as_str(), query.query_id)),
		};

		self.record(&query, &response).await;

		Ok(response)
	}

	fn plan(&self, query: &PreparedQuery, strategy: StrategyKind) -> Plan {
		if strategy != StrategyKind::Adaptive {
			return Plan::Strategy(strategy);
		}

		let context = QueryContext::from_analysis(&query.text, &query.analysis);

		Plan::Routed(self.router.route(&context, None))
	}

	async fn execute(
		&self,
		query: &Arc<PreparedQuery>,
		plan: &Plan,
		overrides: Option<&StrategyOverrides>,
	) -> Result<RagResponse> {
		let strategy = match plan {
			Plan::Strategy(strategy) => *strategy,
			Plan::Routed(decision) => return self.execute_adaptive(query, decision, overrides).await,
		};
		let branch = self.branch(query, strategy, overrides)?;

		run_branch(branch.retriever, query.clone(), branch.config, query.timeout_ms).await
	}

	async fn execute_adaptive(
		&self,
		query: &Arc<PreparedQuery>,
		decision: &RoutingDecision,
		overrides: Option<&StrategyOverrides>,
	) -> Result<RagResponse> {
		let mut branches = Vec::new();

		for store in decision.stores() {
			let kind = store_strategy(store);

			if !self.registry.contains(kind) {
				return Err(Error::Configuration {
					message: format!(
						"Routing selected the {} store but no {kind} retriever is registered.",
						store.as_str()
					),
				});
			}

			branches.push(self.branch(query, kind, overrides)?);
		}

		let mut response = match branches.len() {
			1 => {
				let Some(branch) = branches.pop() else {
					return Err(Error::Configuration {
						message: "Routing produced no stores.".to_string(),
					});
				};

				run_branch(branch.retriever, query.clone(), branch.config, query.timeout_ms).await?
			},
			_ => self.fuse_routed(query, branches).await?,
		};

		response.strategy = StrategyKind::Adaptive.to_string();
		response.explanation = format!("{} {}", decision.reasoning, response.explanation);
		response.debug_info.routing = Some(decision.clone());

		Ok(response)
	}

	/// Multi-store routing. The primary store's error surfaces when every store fails.
	async fn fuse_routed(
		&self,
		query: &Arc<PreparedQuery>,
		branches: Vec<Branch>,
	) -> Result<RagResponse> {
		let top_k = branches.iter().map(|branch| branch.config.top_k).max().unwrap_or(1);
		let mut successes = Vec::new();
		let mut failures = Vec::new();
		let mut primary_error = None;

		for (kind, outcome) in fan_out(query, branches).await {
			match outcome {
				Ok(response) => successes.push(response),
				Err(err) => {
					tracing::warn!(
						query_id = %query.query_id,
						strategy = %kind,
						error = %err,
						"Routed store branch failed."
					);

					failures.push(BranchFailure { strategy: kind.to_string(), error: err.to_string() });

					if primary_error.is_none() {
						primary_error = Some(err);
					}
				},
			}
		}

		if successes.is_empty() {
			return Err(primary_error.unwrap_or_else(|| Error::Configuration {
				message: "Routing produced no stores.".to_string(),
			}));
		}

		let mut response = self.fuser.fuse(&successes, top_k)?;

		response.debug_info.branch_failures = failures;

		Ok(response)
	}

	async fn run_ensemble(
		&self,
		query: &Arc<PreparedQuery>,
		strategies: &[StrategyKind],
	) -> Result<RagResponse> {
		let branches = strategies
			.iter()
			.map(|kind| self.branch(query, *kind, None))
			.collect::<Result<Vec<_>>>()?;
		let top_k = branches.iter().map(|branch| branch.config.top_k).max().unwrap_or(1);
		let mut successes = Vec::new();
		let mut failures = Vec::new();

		for (kind, outcome) in fan_out(query, branches).await {
			match outcome {
				Ok(response) => successes.push(response),
				Err(err) => {
					tracing::warn!(
						query_id = %query.query_id,
						strategy = %kind,
						error = %err,
						"Ensemble branch failed."
					);

					failures.push(BranchFailure { strategy: kind.to_string(), error: err.to_string() });
				},
			}
		}

		if successes.is_empty() {
			return Err(Error::AllStrategiesFailed { query_id: query.query_id, failures });
		}

		let mut response = self.fuser.fuse(&successes, top_k)?;

		response.debug_info.branch_failures = failures;

		Ok(response)
	}

	fn branch(
		&self,
		query: &PreparedQuery,
		kind: StrategyKind,
		overrides: Option<&StrategyOverrides>,
	) -> Result<Branch> {
		let retriever = self.registry.get(kind).ok_or_else(|| Error::Configuration {
			message: format!("No retriever is registered for strategy {kind}."),
		})?;
		let config = self.templates.resolve(kind, query.top_k, overrides)?;

		Ok(Branch { kind, retriever, config })
	}

	async fn record(&self, query: &PreparedQuery, response: &RagResponse) {
		let record = analytics::analytics_record(query, response);

		match time::timeout(self.analytics_timeout, self.analytics.record(&record)).await {
			Ok(Ok(())) => {},
			Ok(Err(err)) => {
				tracing::warn!(
					query_id = %query.query_id,
					error = %err,
					"Failed to record query analytics."
				);
			},
			Err(_) => {
				tracing::warn!(
					query_id = %query.query_id,
					timeout_ms = self.analytics_timeout.as_millis() as u64,
					"Query analytics write timed out; the record is dropped."
				);
			},
		}
	}
}

fn store_strategy(store: StoreKind) -> StrategyKind {
	match store {
		StoreKind::Vector => StrategyKind::RetrieveRead,
		StoreKind::Graph => StrategyKind::GraphRag,
	}
}

/// One strategy invocation bounded by the query's deadline, else the strategy's.
async fn run_branch(
	retriever: Arc<dyn Retriever>,
	query: Arc<PreparedQuery>,
	config: StrategyConfig,
	timeout_ms: Option<u64>,
) -> Result<RagResponse> {
	let timeout_ms = timeout_ms.unwrap_or(config.timeout_ms);

	match time::timeout(Duration::from_millis(timeout_ms), retriever.retrieve(&query, &config)).await
	{
		Ok(result) => result,
		Err(_) => Err(Error::Timeout { strategy: config.kind.to_string(), timeout_ms }),
	}
}

/// Runs branches on a `JoinSet` and returns their outcomes in input order. Dropping the
/// returned future aborts the branches still running.
async fn fan_out(
	query: &Arc<PreparedQuery>,
	branches: Vec<Branch>,
) -> Vec<(StrategyKind, Result<RagResponse>)> {
	let mut set = JoinSet::new();
	let mut slots = HashMap::new();

	for (idx, branch) in branches.into_iter().enumerate() {
		let query = query.clone();
		let timeout_ms = query.timeout_ms;
		let handle = set.spawn(run_branch(branch.retriever, query, branch.config, timeout_ms));

		slots.insert(handle.id(), (idx, branch.kind));
	}

	let mut outcomes = Vec::with_capacity(slots.len());

	while let Some(joined) = set.join_next_with_id().await {
		let (id, outcome) = match joined {
			Ok((id, outcome)) => (id, outcome),
			Err(err) => (
				err.id(),
				Err(Error::Provider { message: format!("Retrieval branch task failed: {err}.") }),
			),
		};

		if let Some((idx, kind)) = slots.get(&id) {
			outcomes.push((*idx, *kind, outcome));
		}
	}

	outcomes.sort_by_key(|(idx, _, _)| *idx);

	outcomes.into_iter().map(|(_, kind, outcome)| (kind, outcome)).collect()
}
