use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
	BoxFuture, Error, GraphStore, Result,
	models::{GraphNode, GraphPath, GraphRelationship, GraphTraversal},
};

const GRAPH_NODE_NAMESPACE: Uuid = Uuid::from_u128(0x2c84_90e1_5f3a_4b6d_a1c7_0e9b_34d2_f861);
const GRAPH_EDGE_NAMESPACE: Uuid = Uuid::from_u128(0x91d7_3b0a_c2e4_4f18_b6a5_7d3e_08c1_52af);

#[derive(Debug, Clone, Deserialize)]
pub struct GraphNodeInput {
	pub label: String,
	pub name: String,
	pub document_id: Option<String>,
	pub chunk_id: Option<Uuid>,
	pub content: Option<String>,
	#[serde(default)]
	pub properties: Value,
}

/// Endpoints are node names, resolved against the nodes of the same import. A name shared by
/// nodes of several labels needs the endpoint's label.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphEdgeInput {
	pub source: String,
	#[serde(default)]
	pub source_label: Option<String>,
	pub target: String,
	#[serde(default)]
	pub target_label: Option<String>,
	pub relation: String,
	#[serde(default = "default_edge_weight")]
	pub weight: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphImport {
	#[serde(default)]
	pub nodes: Vec<GraphNodeInput>,
	#[serde(default)]
	pub edges: Vec<GraphEdgeInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphImportReport {
	pub nodes: usize,
	pub edges: usize,
}

/// Node ids of one import, by normalized name then label.
#[derive(Debug, Default)]
struct ImportedNodes {
	by_name: HashMap<String, Vec<(String, Uuid)>>,
}
impl ImportedNodes {
	fn insert(&mut self, label: &str, name: &str, node_id: Uuid) {
		let label = label.trim().to_lowercase();
		let entries = self.by_name.entry(normalize_entity_name(name)).or_default();

		match entries.iter_mut().find(|(existing, _)| *existing == label) {
			Some(entry) => entry.1 = node_id,
			None => entries.push((label, node_id)),
		}
	}

	fn resolve(&self, name: &str, label: Option<&str>) -> Result<Uuid> {
		let entries =
			self.by_name.get(&normalize_entity_name(name)).map(Vec::as_slice).unwrap_or_default();

		if let Some(label) = label {
			let wanted = label.trim().to_lowercase();

			return entries
				.iter()
				.find(|(existing, _)| *existing == wanted)
				.map(|(_, node_id)| *node_id)
				.ok_or_else(|| {
					Error::NotFound(format!("graph node {label}:{name:?} is not in the import"))
				});
		}

		match entries {
			[] => Err(Error::NotFound(format!("graph node {name:?} is not in the import"))),
			[(_, node_id)] => Ok(*node_id),
			_ => Err(Error::InvalidArgument(format!(
				"graph node {name:?} exists under {} labels; the edge must name its label",
				entries.len()
			))),
		}
	}
}

#[derive(Clone)]
pub struct PgGraphStore {
	pub pool: PgPool,
}
impl PgGraphStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	async fn traverse_pooled(&self, request: &GraphTraversal) -> Result<Vec<GraphPath>> {
		let mut conn = self.pool.acquire().await?;

		traverse(&mut conn, request).await
	}
}
impl GraphStore for PgGraphStore {
	fn traverse<'a>(&'a self, request: &'a GraphTraversal) -> BoxFuture<'a, Result<Vec<GraphPath>>> {
		Box::pin(self.traverse_pooled(request))
	}
}

pub fn normalize_entity_name(input: &str) -> String {
	input.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn node_id_for(label: &str, name: &str) -> Uuid {
	let key = format!("{}:{}", label.trim().to_lowercase(), normalize_entity_name(name));

	Uuid::new_v5(&GRAPH_NODE_NAMESPACE, key.as_bytes())
}

pub async fn upsert_node(executor: &mut PgConnection, node: &GraphNodeInput) -> Result<Uuid> {
	let name = node.name.trim();

	if name.is_empty() {
		return Err(Error::InvalidArgument("graph node name must not be empty".to_string()));
	}
	if node.label.trim().is_empty() {
		return Err(Error::InvalidArgument("graph node label must not be empty".to_string()));
	}

	let properties = if node.properties.is_null() {
		Value::Object(Default::default())
	} else {
		node.properties.clone()
	};
	let node_id: Uuid = sqlx::query_scalar(
		"\
INSERT INTO graph_nodes (
	node_id,
	label,
	name,
	name_norm,
	document_id,
	chunk_id,
	content,
	properties
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (label, name_norm) DO UPDATE
SET
	name = EXCLUDED.name,
	document_id = COALESCE(EXCLUDED.document_id, graph_nodes.document_id),
	chunk_id = COALESCE(EXCLUDED.chunk_id, graph_nodes.chunk_id),
	content = COALESCE(EXCLUDED.content, graph_nodes.content),
	properties = graph_nodes.properties || EXCLUDED.properties,
	updated_at = now()
RETURNING node_id",
	)
	.bind(node_id_for(&node.label, name))
	.bind(node.label.trim())
	.bind(name)
	.bind(normalize_entity_name(name))
	.bind(node.document_id.as_deref())
	.bind(node.chunk_id)
	.bind(node.content.as_deref())
	.bind(properties)
	.fetch_one(&mut *executor)
	.await?;

	Ok(node_id)
}

pub async fn insert_edge(
	executor: &mut PgConnection,
	source_id: Uuid,
	target_id: Uuid,
	relation: &str,
	weight: f32,
) -> Result<Uuid> {
	let relation = relation.trim();

	if relation.is_empty() {
		return Err(Error::InvalidArgument("graph edge relation must not be empty".to_string()));
	}

	let key = format!("{source_id}:{target_id}:{relation}");
	let edge_id: Uuid = sqlx::query_scalar(
		"\
INSERT INTO graph_edges (edge_id, source_id, target_id, relation, weight)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (source_id, target_id, relation) DO UPDATE
SET weight = EXCLUDED.weight
RETURNING edge_id",
	)
	.bind(Uuid::new_v5(&GRAPH_EDGE_NAMESPACE, key.as_bytes()))
	.bind(source_id)
	.bind(target_id)
	.bind(relation)
	.bind(weight)
	.fetch_one(&mut *executor)
	.await?;

	Ok(edge_id)
}

/// Imports nodes then edges in one transaction.
pub async fn import_graph(pool: &PgPool, import: &GraphImport) -> Result<GraphImportReport> {
	let mut tx = pool.begin().await?;
	let mut nodes = ImportedNodes::default();

	for node in &import.nodes {
		let node_id = upsert_node(&mut *tx, node).await?;

		nodes.insert(&node.label, &node.name, node_id);
	}

	for edge in &import.edges {
		let source_id = nodes.resolve(&edge.source, edge.source_label.as_deref())?;
		let target_id = nodes.resolve(&edge.target, edge.target_label.as_deref())?;

		insert_edge(&mut *tx, source_id, target_id, &edge.relation, edge.weight).await?;
	}

	tx.commit().await?;

	Ok(GraphImportReport { nodes: import.nodes.len(), edges: import.edges.len() })
}

/// Cycle-free paths from every node whose normalized name matches `request.start`, shortest
/// first.
pub async fn traverse(
	executor: &mut PgConnection,
	request: &GraphTraversal,
) -> Result<Vec<GraphPath>> {
	if request.max_depth == 0 {
		return Err(Error::InvalidArgument("max_depth must be greater than zero".to_string()));
	}
	if request.limit == 0 {
		return Ok(Vec::new());
	}

	let start = normalize_entity_name(&request.start);

	if start.is_empty() {
		return Ok(Vec::new());
	}

	let max_depth = i32::try_from(request.max_depth)
		.map_err(|_| Error::InvalidArgument("max_depth is too large".to_string()))?;
	let rows: Vec<(Vec<Uuid>, Vec<Uuid>, i32)> = sqlx::query_as(
		"\
WITH RECURSIVE walk(node_ids, edge_ids, depth) AS (
	SELECT ARRAY[n.node_id], ARRAY[]::uuid[], 0
	FROM graph_nodes n
	WHERE n.name_norm = $1
	UNION ALL
	SELECT
		w.node_ids || (
			CASE
				WHEN $3 <> 'incoming' AND e.source_id = w.node_ids[cardinality(w.node_ids)]
					THEN e.target_id
				ELSE e.source_id
			END
		),
		w.edge_ids || e.edge_id,
		w.depth + 1
	FROM walk w
	JOIN graph_edges e
		ON (
			($3 <> 'incoming' AND e.source_id = w.node_ids[cardinality(w.node_ids)])
			OR ($3 <> 'outgoing' AND e.target_id = w.node_ids[cardinality(w.node_ids)])
		)
	WHERE w.depth < $2
		AND (cardinality($4::text[]) = 0 OR e.relation = ANY($4::text[]))
		AND NOT (
			CASE
				WHEN $3 <> 'incoming' AND e.source_id = w.node_ids[cardinality(w.node_ids)]
					THEN e.target_id
				ELSE e.source_id
			END
		) = ANY(w.node_ids)
)
SELECT node_ids, edge_ids, depth
FROM walk
WHERE depth > 0
ORDER BY depth, node_ids
LIMIT $5",
	)
	.bind(start.as_str())
	.bind(max_depth)
	.bind(request.direction.as_str())
	.bind(&request.relationship_types)
	.bind(i64::from(request.limit))
	.fetch_all(&mut *executor)
	.await?;

	if rows.is_empty() {
		return Ok(Vec::new());
	}

	let mut node_ids: Vec<Uuid> = rows.iter().flat_map(|(nodes, _, _)| nodes.iter().copied()).collect();
	let mut edge_ids: Vec<Uuid> = rows.iter().flat_map(|(_, edges, _)| edges.iter().copied()).collect();

	node_ids.sort_unstable();
	node_ids.dedup();
	edge_ids.sort_unstable();
	edge_ids.dedup();

	let nodes: HashMap<Uuid, GraphNode> = sqlx::query_as::<_, GraphNode>(
		"\
SELECT node_id, label, name, document_id, chunk_id, content, properties
FROM graph_nodes
WHERE node_id = ANY($1::uuid[])",
	)
	.bind(&node_ids)
	.fetch_all(&mut *executor)
	.await?
	.into_iter()
	.map(|node| (node.node_id, node))
	.collect();
	let edges: HashMap<Uuid, GraphRelationship> = sqlx::query_as::<_, GraphRelationship>(
		"\
SELECT edge_id, source_id, target_id, relation, weight
FROM graph_edges
WHERE edge_id = ANY($1::uuid[])",
	)
	.bind(&edge_ids)
	.fetch_all(&mut *executor)
	.await?
	.into_iter()
	.map(|edge| (edge.edge_id, edge))
	.collect();
	let mut paths = Vec::with_capacity(rows.len());

	for (path_nodes, path_edges, depth) in rows {
		let nodes: Option<Vec<GraphNode>> =
			path_nodes.iter().map(|id| nodes.get(id).cloned()).collect();
		let relationships: Option<Vec<GraphRelationship>> =
			path_edges.iter().map(|id| edges.get(id).cloned()).collect();
		let (Some(nodes), Some(relationships)) = (nodes, relationships) else {
			tracing::warn!("Graph path references a row that disappeared mid-traversal.");

			continue;
		};

		paths.push(GraphPath { nodes, relationships, length: depth.max(0) as u32 });
	}

	Ok(paths)
}

fn default_edge_weight() -> f32 {
	1.0
}
