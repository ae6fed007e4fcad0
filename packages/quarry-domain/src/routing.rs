use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
	Error, Result,
	analyzer::QueryAnalysis,
	query::QueryType,
	text,
};

const VECTOR_LATENCY_MS: u64 = 50;
const GRAPH_BASE_LATENCY_MS: u64 = 80;
const GRAPH_PER_HOP_LATENCY_MS: u64 = 40;
const HYBRID_MERGE_LATENCY_MS: u64 = 25;

const GRAPH_ANALYTICS_WORDS: &[&str] =
	&["centrality", "community", "communities", "cluster", "clusters", "influential", "pagerank"];
const RELATIONSHIP_WORDS: &[&str] = &[
	"related",
	"relationship",
	"relationships",
	"connected",
	"connection",
	"between",
	"path",
	"linked",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
	Vector,
	Graph,
}
impl StoreKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Vector => "vector",
			Self::Graph => "graph",
		}
	}
}
impl fmt::Display for StoreKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingQueryType {
	EntityLookup,
	RelationshipTraversal,
	SemanticSearch,
	HybridSearch,
	GraphAnalytics,
}
impl RoutingQueryType {
	pub const ALL: [Self; 5] = [
		Self::EntityLookup,
		Self::RelationshipTraversal,
		Self::SemanticSearch,
		Self::HybridSearch,
		Self::GraphAnalytics,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::EntityLookup => "entity_lookup",
			Self::RelationshipTraversal => "relationship_traversal",
			Self::SemanticSearch => "semantic_search",
			Self::HybridSearch => "hybrid_search",
			Self::GraphAnalytics => "graph_analytics",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
	Low,
	Medium,
	High,
}
impl Complexity {
	pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

	/// Bands a `[0, 1]` complexity score.
	pub fn from_score(score: f32) -> Self {
		if score < 0.34 {
			Self::Low
		} else if score < 0.67 {
			Self::Medium
		} else {
			Self::High
		}
	}
}

/// Query shape as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
	pub query_type: RoutingQueryType,
	pub complexity: Complexity,
	pub expected_traversal_depth: Option<u32>,
	#[serde(default)]
	pub requires_graph_analytics: bool,
}
impl QueryContext {
	pub fn new(query_type: RoutingQueryType, complexity: Complexity) -> Self {
		Self {
			query_type,
			complexity,
			expected_traversal_depth: None,
			requires_graph_analytics: false,
		}
	}

	pub fn with_depth(mut self, depth: u32) -> Self {
		self.expected_traversal_depth = Some(depth);

		self
	}

	pub fn from_analysis(text: &str, analysis: &QueryAnalysis) -> Self {
		let complexity = Complexity::from_score(analysis.complexity);

		if text::contains_any_word(text, GRAPH_ANALYTICS_WORDS) {
			let mut context = Self::new(RoutingQueryType::GraphAnalytics, complexity);

			context.requires_graph_analytics = true;

			return context;
		}
		if text::contains_any_word(text, RELATIONSHIP_WORDS) {
			let depth = if analysis.entities.len() >= 2 { 2 } else { 1 };

			return Self::new(RoutingQueryType::RelationshipTraversal, complexity).with_depth(depth);
		}
		if analysis.query_type == QueryType::Analytical && analysis.entities.is_empty() {
			return Self::new(RoutingQueryType::HybridSearch, complexity);
		}
		if analysis.entities.len() == 1 {
			return Self::new(RoutingQueryType::EntityLookup, complexity);
		}

		Self::new(RoutingQueryType::SemanticSearch, complexity)
	}

	fn depth(&self) -> u32 {
		self.expected_traversal_depth.unwrap_or(1)
	}

	fn needs_graph_analytics(&self) -> bool {
		self.requires_graph_analytics || self.query_type == RoutingQueryType::GraphAnalytics
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
	pub primary_store: StoreKind,
	pub secondary_store: Option<StoreKind>,
	pub use_hybrid: bool,
	pub reasoning: String,
	/// Observability only.
	pub estimated_latency_ms: Option<u64>,
}
impl RoutingDecision {
	fn single(store: StoreKind, depth: u32, reasoning: impl Into<String>) -> Self {
		Self {
			primary_store: store,
			secondary_store: None,
			use_hybrid: false,
			reasoning: reasoning.into(),
			estimated_latency_ms: Some(store_latency(store, depth)),
		}
	}

	fn hybrid(
		primary: StoreKind,
		secondary: StoreKind,
		depth: u32,
		reasoning: impl Into<String>,
	) -> Self {
		let latency = store_latency(primary, depth).max(store_latency(secondary, depth))
			+ HYBRID_MERGE_LATENCY_MS;

		Self {
			primary_store: primary,
			secondary_store: Some(secondary),
			use_hybrid: true,
			reasoning: reasoning.into(),
			estimated_latency_ms: Some(latency),
		}
	}

	/// Stores in dispatch order.
	pub fn stores(&self) -> Vec<StoreKind> {
		let mut stores = vec![self.primary_store];

		if let Some(secondary) = self.secondary_store
			&& secondary != self.primary_store
		{
			stores.push(secondary);
		}

		stores
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
	VectorFirst,
	GraphFirst,
	#[default]
	Adaptive,
}
impl RoutingPolicy {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::VectorFirst => "vector_first",
			Self::GraphFirst => "graph_first",
			Self::Adaptive => "adaptive",
		}
	}
}
impl fmt::Display for RoutingPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for RoutingPolicy {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_lowercase().as_str() {
			"vector_first" => Ok(Self::VectorFirst),
			"graph_first" => Ok(Self::GraphFirst),
			"adaptive" => Ok(Self::Adaptive),
			other => Err(Error::UnknownRoutingPolicy { name: other.to_string() }),
		}
	}
}

/// Stateless store selection. Every decision is logged and returned; nothing is cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseRouter {
	default_policy: RoutingPolicy,
}
impl DatabaseRouter {
	pub fn new(default_policy: RoutingPolicy) -> Self {
		Self { default_policy }
	}

	pub fn from_config(cfg: &quarry_config::Routing) -> Result<Self> {
		Ok(Self::new(cfg.default_policy.parse()?))
	}

	pub fn default_policy(&self) -> RoutingPolicy {
		self.default_policy
	}

	pub fn route(&self, context: &QueryContext, policy: Option<RoutingPolicy>) -> RoutingDecision {
		let policy = policy.unwrap_or(self.default_policy);
		let decision = match policy {
			RoutingPolicy::VectorFirst => route_vector_first(context),
			RoutingPolicy::GraphFirst => route_graph_first(context),
			RoutingPolicy::Adaptive => route_adaptive(context),
		};

		tracing::debug!(
			policy = policy.as_str(),
			query_type = context.query_type.as_str(),
			primary_store = decision.primary_store.as_str(),
			secondary_store = decision.secondary_store.map(StoreKind::as_str),
			use_hybrid = decision.use_hybrid,
			reasoning = %decision.reasoning,
			"Routing decision made."
		);

		decision
	}

	/// Resolves a policy by name before routing. Unknown names are rejected.
	pub fn route_named(
		&self,
		context: &QueryContext,
		policy_name: Option<&str>,
	) -> Result<RoutingDecision> {
		let policy = policy_name.map(str::parse::<RoutingPolicy>).transpose()?;

		Ok(self.route(context, policy))
	}
}

fn route_vector_first(context: &QueryContext) -> RoutingDecision {
	let depth = context.depth();

	if context.needs_graph_analytics() {
		return RoutingDecision::single(
			StoreKind::Graph,
			depth,
			"Vector-first policy escalated to the graph store for graph analytics.",
		);
	}
	if depth > 2 || context.query_type == RoutingQueryType::RelationshipTraversal {
		return RoutingDecision::hybrid(
			StoreKind::Graph,
			StoreKind::Vector,
			depth,
			format!(
				"Vector-first policy escalated to the graph store for {} at depth {depth}.",
				context.query_type.as_str()
			),
		);
	}

	RoutingDecision::single(
		StoreKind::Vector,
		depth,
		format!("Vector-first policy kept {} on the vector store.", context.query_type.as_str()),
	)
}

fn route_graph_first(context: &QueryContext) -> RoutingDecision {
	let depth = context.depth();

	if context.query_type == RoutingQueryType::SemanticSearch
		&& depth <= 1
		&& !context.needs_graph_analytics()
	{
		return RoutingDecision::single(
			StoreKind::Vector,
			depth,
			"Graph-first policy used the vector store for shallow semantic search.",
		);
	}

	match context.query_type {
		RoutingQueryType::SemanticSearch
		| RoutingQueryType::HybridSearch
		| RoutingQueryType::EntityLookup
			if !context.needs_graph_analytics() =>
			RoutingDecision::hybrid(
				StoreKind::Graph,
				StoreKind::Vector,
				depth,
				format!(
					"Graph-first policy used the graph store with vector support for {}.",
					context.query_type.as_str()
				),
			),
		_ => RoutingDecision::single(
			StoreKind::Graph,
			depth,
			format!("Graph-first policy used the graph store for {}.", context.query_type.as_str()),
		),
	}
}

fn route_adaptive(context: &QueryContext) -> RoutingDecision {
	let depth = context.depth();

	if context.needs_graph_analytics() {
		return RoutingDecision::single(
			StoreKind::Graph,
			depth,
			"Graph analytics require the graph store.",
		);
	}

	match context.query_type {
		RoutingQueryType::SemanticSearch if context.complexity == Complexity::Low =>
			RoutingDecision::single(
				StoreKind::Vector,
				depth,
				"Simple semantic search takes the vector store fast path.",
			),
		RoutingQueryType::RelationshipTraversal if depth <= 1 => RoutingDecision::hybrid(
			StoreKind::Vector,
			StoreKind::Graph,
			depth,
			"Shallow relationship traversal combines vector similarity with direct graph neighbors.",
		),
		RoutingQueryType::RelationshipTraversal => RoutingDecision::single(
			StoreKind::Graph,
			depth,
			format!("Relationship traversal at depth {depth} requires the graph store."),
		),
		RoutingQueryType::HybridSearch => RoutingDecision::hybrid(
			StoreKind::Vector,
			StoreKind::Graph,
			depth,
			"Hybrid search uses the vector store first and enriches from the graph store.",
		),
		RoutingQueryType::EntityLookup => RoutingDecision::single(
			StoreKind::Vector,
			depth,
			"Entity lookup is served by the vector store.",
		),
		_ => RoutingDecision::single(
			StoreKind::Vector,
			depth,
			"Defaulted to the vector store.",
		),
	}
}

fn store_latency(store: StoreKind, depth: u32) -> u64 {
	match store {
		StoreKind::Vector => VECTOR_LATENCY_MS,
		StoreKind::Graph => GRAPH_BASE_LATENCY_MS + GRAPH_PER_HOP_LATENCY_MS * u64::from(depth),
	}
}
