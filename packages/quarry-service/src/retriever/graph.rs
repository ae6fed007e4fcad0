use std::{collections::HashMap, sync::Arc, time::Instant};

use serde_json::Value;
use uuid::Uuid;

use crate::{
	BoxFuture, RagResponse, Result, Retriever, StrategyConfig,
	error::graph_store_error,
	query::PreparedQuery,
	response::{self, ResponseParts, RetrievalResult, ScoringBreakdown, StageTimings},
};
use quarry_domain::StrategyKind;
use quarry_storage::{
	GraphStore,
	models::{GraphPath, GraphTraversal, TraversalDirection},
};

const KEYWORD_SEEDS: usize = 3;
const PATHS_PER_RESULT: u32 = 4;

/// Entity traversal over the graph store. Each path ends in one candidate.
#[derive(Clone)]
pub struct GraphRetriever {
	graph: Arc<dyn GraphStore>,
}
impl GraphRetriever {
	pub fn new(graph: Arc<dyn GraphStore>) -> Self {
		Self { graph }
	}

	async fn retrieve_graph(
		&self,
		query: &PreparedQuery,
		config: &StrategyConfig,
	) -> Result<RagResponse> {
		let started = Instant::now();
		let seeds = seed_entities(query);
		let mut paths = Vec::new();

		for seed in &seeds {
			let request = GraphTraversal {
				start: seed.clone(),
				max_depth: config.max_graph_hops,
				relationship_types: config.relationship_types.clone(),
				direction: TraversalDirection::Both,
				limit: config.top_k.saturating_mul(PATHS_PER_RESULT),
			};

			paths.extend(self.graph.traverse(&request).await.map_err(graph_store_error)?);
		}

		let retrieval_ms = response::millis(started.elapsed());
		let post_started = Instant::now();
		let candidate_count = paths.len();
		let mut best: HashMap<(String, Option<Uuid>), RetrievalResult> = HashMap::new();

		for path in &paths {
			let Some(result) = path_result(path, config.hop_decay) else { continue };

			if result.score <= config.score_threshold {
				continue;
			}

			let key = (result.document_id.clone(), result.chunk_id);

			if best.get(&key).is_none_or(|existing| result.score > existing.score) {
				best.insert(key, result);
			}
		}

		let results = response::finalize_results(best.into_values().collect(), config.top_k);
		let timings = StageTimings {
			embedding_ms: 0.0,
			retrieval_ms,
			reranking_ms: None,
			post_processing_ms: response::millis(post_started.elapsed()),
		};
		let explanation = if seeds.is_empty() {
			"No entities or keywords to start a graph traversal from.".to_string()
		} else {
			format!(
				"Traversed up to {} hops from {}; {} paths produced {} results.",
				config.max_graph_hops,
				seeds.join(", "),
				candidate_count,
				results.len()
			)
		};

		Ok(response::build_response(
			query,
			ResponseParts {
				strategy: StrategyKind::GraphRag,
				top_k: config.top_k,
				granularity: query.granularity,
				results,
				candidate_count,
				timings,
				total: started.elapsed(),
				explanation,
			},
		))
	}
}
impl Retriever for GraphRetriever {
	fn kind(&self) -> StrategyKind {
		StrategyKind::GraphRag
	}

	fn retrieve<'a>(
		&'a self,
		query: &'a PreparedQuery,
		config: &'a StrategyConfig,
	) -> BoxFuture<'a, Result<RagResponse>> {
		Box::pin(self.retrieve_graph(query, config))
	}
}

/// Analyzer entities, else the leading keywords.
fn seed_entities(query: &PreparedQuery) -> Vec<String> {
	if !query.analysis.entities.is_empty() {
		return query.analysis.entities.clone();
	}

	query.analysis.keywords.iter().take(KEYWORD_SEEDS).cloned().collect()
}

fn path_result(path: &GraphPath, hop_decay: f32) -> Option<RetrievalResult> {
	let node = path.terminal()?;
	let score = hop_decay.powi(path.length.saturating_sub(1) as i32);
	let document_id = node.document_id.clone().unwrap_or_else(|| format!("graph:{}", node.node_id));
	let content = node.content.clone().unwrap_or_else(|| node.name.clone());
	let mut metadata = serde_json::Map::new();

	metadata.insert("node_id".to_string(), Value::String(node.node_id.to_string()));
	metadata.insert("label".to_string(), Value::String(node.label.clone()));
	metadata.insert("hops".to_string(), Value::from(path.length));
	metadata.insert("path".to_string(), Value::String(describe_path(path)));

	if !node.properties.is_null() {
		metadata.insert("properties".to_string(), node.properties.clone());
	}

	Some(RetrievalResult {
		id: node.chunk_id.map(|id| id.to_string()).unwrap_or_else(|| node.node_id.to_string()),
		content,
		score,
		rank: 0,
		document_id,
		chunk_id: node.chunk_id,
		scoring: ScoringBreakdown { graph: Some(score), ..Default::default() },
		metadata,
		chunk_granularity: None,
		expanded_context: None,
		chunk_index: None,
	})
}

/// `Alan Turing -[worked_at]- Bletchley Park`
fn describe_path(path: &GraphPath) -> String {
	let mut out = String::new();

	for (idx, node) in path.nodes.iter().enumerate() {
		if idx > 0 {
			let relation = path.relationships.get(idx - 1).map(|edge| edge.relation.as_str());

			out.push_str(&format!(" -[{}]- ", relation.unwrap_or("?")));
		}

		out.push_str(&node.name);
	}

	out
}
