use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::Error;

const CHUNK_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_2d4e_9a7c_4e0b_8f3d_51a2_c9e8_7d10);

/// Stored chunk tier. Queries may ask for `adaptive`, which resolves to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkGranularity {
	Coarse,
	Fine,
}
impl ChunkGranularity {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Coarse => "coarse",
			Self::Fine => "fine",
		}
	}
}
impl fmt::Display for ChunkGranularity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for ChunkGranularity {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"coarse" => Ok(Self::Coarse),
			"fine" => Ok(Self::Fine),
			other => Err(Error::Malformed(format!("Unknown chunk granularity {other:?}."))),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
	pub chunk_id: Uuid,
	pub document_id: String,
	pub chunk_index: i32,
	pub granularity: ChunkGranularity,
	pub content: String,
	pub title: Option<String>,
	pub source: Option<String>,
	pub content_type: Option<String>,
	pub language: Option<String>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub created_at: Option<OffsetDateTime>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}
impl ChunkRecord {
	/// Deterministic id so re-ingesting a document overwrites its previous points.
	pub fn chunk_id_for(document_id: &str, granularity: ChunkGranularity, chunk_index: i32) -> Uuid {
		let name = format!("{document_id}:{}:{chunk_index}", granularity.as_str());

		Uuid::new_v5(&CHUNK_ID_NAMESPACE, name.as_bytes())
	}
}

/// A chunk with its cosine similarity to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHit {
	pub chunk: ChunkRecord,
	pub score: f32,
}

/// Conjunctive predicates. Empty lists and `None` bounds do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
	#[serde(with = "time::serde::rfc3339::option")]
	pub created_after: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub created_before: Option<OffsetDateTime>,
	pub sources: Vec<String>,
	pub content_types: Vec<String>,
	pub languages: Vec<String>,
}
impl SearchFilters {
	pub fn is_empty(&self) -> bool {
		self.created_after.is_none()
			&& self.created_before.is_none()
			&& self.sources.is_empty()
			&& self.content_types.is_empty()
			&& self.languages.is_empty()
	}

	pub fn matches(&self, chunk: &ChunkRecord) -> bool {
		if (self.created_after.is_some() || self.created_before.is_some())
			&& chunk.created_at.is_none()
		{
			return false;
		}
		if let (Some(after), Some(created_at)) = (self.created_after, chunk.created_at)
			&& created_at <= after
		{
			return false;
		}
		if let (Some(before), Some(created_at)) = (self.created_before, chunk.created_at)
			&& created_at >= before
		{
			return false;
		}

		list_matches(&self.sources, chunk.source.as_deref())
			&& list_matches(&self.content_types, chunk.content_type.as_deref())
			&& list_matches(&self.languages, chunk.language.as_deref())
	}
}

fn list_matches(allowed: &[String], value: Option<&str>) -> bool {
	if allowed.is_empty() {
		return true;
	}

	value.is_some_and(|value| allowed.iter().any(|candidate| candidate == value))
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearch {
	pub vector: Vec<f32>,
	pub top_k: u32,
	/// Hits must score strictly above this value.
	pub score_threshold: f32,
	pub granularity: ChunkGranularity,
	pub filters: SearchFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GraphNode {
	pub node_id: Uuid,
	pub label: String,
	pub name: String,
	pub document_id: Option<String>,
	pub chunk_id: Option<Uuid>,
	pub content: Option<String>,
	pub properties: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GraphRelationship {
	pub edge_id: Uuid,
	pub source_id: Uuid,
	pub target_id: Uuid,
	pub relation: String,
	pub weight: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalDirection {
	#[default]
	Outgoing,
	Incoming,
	Both,
}
impl TraversalDirection {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Outgoing => "outgoing",
			Self::Incoming => "incoming",
			Self::Both => "both",
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphTraversal {
	/// Entity name; matched case- and whitespace-insensitively.
	pub start: String,
	pub max_depth: u32,
	/// Empty means any relation.
	pub relationship_types: Vec<String>,
	pub direction: TraversalDirection,
	pub limit: u32,
}

/// `nodes[0]` is the start node; `relationships[i]` connects `nodes[i]` and `nodes[i + 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphPath {
	pub nodes: Vec<GraphNode>,
	pub relationships: Vec<GraphRelationship>,
	pub length: u32,
}
impl GraphPath {
	pub fn terminal(&self) -> Option<&GraphNode> {
		self.nodes.last()
	}
}

/// One row per completed retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnalytics {
	pub query_id: Uuid,
	pub session_id: Option<String>,
	pub client_id: Option<String>,
	pub query_text: String,
	pub query_type: Option<String>,
	pub difficulty: Option<String>,
	pub intent: Option<String>,
	pub strategy: String,
	pub fallback_used: bool,
	pub result_count: i32,
	pub top_k: i32,
	pub total_latency_ms: f64,
	pub embedding_latency_ms: f64,
	pub retrieval_latency_ms: f64,
	pub reranking_latency_ms: Option<f64>,
	pub confidence: f32,
	pub coverage: f32,
	pub metadata: Map<String, Value>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
