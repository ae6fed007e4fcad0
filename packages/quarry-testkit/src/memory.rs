use std::{
	collections::HashSet,
	sync::{
		Mutex, MutexGuard,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::Value;
use uuid::Uuid;

use quarry_storage::{
	BoxFuture, Error, GraphStore, Result, VectorStore,
	graph::{node_id_for, normalize_entity_name},
	models::{
		ChunkGranularity, ChunkHit, ChunkRecord, GraphNode, GraphPath, GraphRelationship,
		GraphTraversal, TraversalDirection, VectorSearch,
	},
};

/// Brute-force cosine search over chunks held in memory.
#[derive(Default)]
pub struct MemoryVectorStore {
	points: Mutex<Vec<(ChunkRecord, Vec<f32>)>>,
	failure: Mutex<Option<String>>,
	searches: AtomicUsize,
}
impl MemoryVectorStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces any point with the same chunk id.
	pub fn insert(&self, record: ChunkRecord, vector: Vec<f32>) {
		let mut points = lock(&self.points);

		points.retain(|(existing, _)| existing.chunk_id != record.chunk_id);
		points.push((record, vector));
	}

	pub fn len(&self) -> usize {
		lock(&self.points).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Every later call fails with `Error::Unavailable`.
	pub fn fail_with(&self, message: impl Into<String>) {
		*lock(&self.failure) = Some(message.into());
	}

	pub fn search_count(&self) -> usize {
		self.searches.load(Ordering::SeqCst)
	}

	fn check_available(&self) -> Result<()> {
		match lock(&self.failure).as_ref() {
			Some(message) => Err(Error::Unavailable(message.clone())),
			None => Ok(()),
		}
	}

	fn search_points(&self, request: &VectorSearch) -> Result<Vec<ChunkHit>> {
		self.searches.fetch_add(1, Ordering::SeqCst);
		self.check_available()?;

		let points = lock(&self.points);
		let mut hits: Vec<ChunkHit> = points
			.iter()
			.filter(|(chunk, _)| {
				chunk.granularity == request.granularity && request.filters.matches(chunk)
			})
			.map(|(chunk, vector)| ChunkHit {
				chunk: chunk.clone(),
				score: cosine(&request.vector, vector),
			})
			.filter(|hit| hit.score > request.score_threshold)
			.collect();

		hits.sort_by(|a, b| {
			b.score.total_cmp(&a.score).then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
		});
		hits.truncate(request.top_k as usize);

		Ok(hits)
	}

	fn fetch_points(
		&self,
		document_id: &str,
		granularity: ChunkGranularity,
		chunk_indexes: &[i32],
	) -> Result<Vec<ChunkRecord>> {
		self.check_available()?;

		let mut chunks: Vec<ChunkRecord> = lock(&self.points)
			.iter()
			.map(|(chunk, _)| chunk)
			.filter(|chunk| {
				chunk.document_id == document_id
					&& chunk.granularity == granularity
					&& chunk_indexes.contains(&chunk.chunk_index)
			})
			.cloned()
			.collect();

		chunks.sort_by_key(|chunk| chunk.chunk_index);

		Ok(chunks)
	}
}
impl VectorStore for MemoryVectorStore {
	fn search<'a>(&'a self, request: &'a VectorSearch) -> BoxFuture<'a, Result<Vec<ChunkHit>>> {
		let result = self.search_points(request);

		Box::pin(async move { result })
	}

	fn fetch<'a>(
		&'a self,
		document_id: &'a str,
		granularity: ChunkGranularity,
		chunk_indexes: &'a [i32],
	) -> BoxFuture<'a, Result<Vec<ChunkRecord>>> {
		let result = self.fetch_points(document_id, granularity, chunk_indexes);

		Box::pin(async move { result })
	}
}

/// Adjacency lists with the same traversal semantics as the Postgres store.
#[derive(Default)]
pub struct MemoryGraphStore {
	nodes: Mutex<Vec<GraphNode>>,
	edges: Mutex<Vec<GraphRelationship>>,
	failure: Mutex<Option<String>>,
}
impl MemoryGraphStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_node(
		&self,
		label: &str,
		name: &str,
		document_id: Option<&str>,
		content: Option<&str>,
	) -> Uuid {
		let node_id = node_id_for(label, name);
		let mut nodes = lock(&self.nodes);

		nodes.retain(|node| node.node_id != node_id);
		nodes.push(GraphNode {
			node_id,
			label: label.to_string(),
			name: name.to_string(),
			document_id: document_id.map(str::to_string),
			chunk_id: None,
			content: content.map(str::to_string),
			properties: Value::Null,
		});

		node_id
	}

	pub fn add_edge(&self, source_id: Uuid, target_id: Uuid, relation: &str) -> Uuid {
		let edge_id = Uuid::new_v4();

		lock(&self.edges).push(GraphRelationship {
			edge_id,
			source_id,
			target_id,
			relation: relation.to_string(),
			weight: 1.0,
		});

		edge_id
	}

	pub fn fail_with(&self, message: impl Into<String>) {
		*lock(&self.failure) = Some(message.into());
	}

	fn walk(&self, request: &GraphTraversal) -> Result<Vec<GraphPath>> {
		if let Some(message) = lock(&self.failure).as_ref() {
			return Err(Error::Unavailable(message.clone()));
		}
		if request.max_depth == 0 {
			return Err(Error::InvalidArgument("max_depth must be greater than zero".to_string()));
		}

		let nodes = lock(&self.nodes).clone();
		let edges = lock(&self.edges).clone();
		let start = normalize_entity_name(&request.start);
		let relations: HashSet<&str> =
			request.relationship_types.iter().map(String::as_str).collect();
		let mut frontier: Vec<(Vec<Uuid>, Vec<GraphRelationship>)> = nodes
			.iter()
			.filter(|node| normalize_entity_name(&node.name) == start)
			.map(|node| (vec![node.node_id], Vec::new()))
			.collect();
		let mut paths = Vec::new();

		for _ in 0..request.max_depth {
			let mut next = Vec::new();

			for (path_nodes, path_edges) in &frontier {
				let Some(&tip) = path_nodes.last() else { continue };

				for edge in &edges {
					if !relations.is_empty() && !relations.contains(edge.relation.as_str()) {
						continue;
					}

					let Some(neighbor) = step(edge, tip, request.direction) else { continue };

					if path_nodes.contains(&neighbor) {
						continue;
					}

					let mut extended_nodes = path_nodes.clone();
					let mut extended_edges = path_edges.clone();

					extended_nodes.push(neighbor);
					extended_edges.push(edge.clone());
					next.push((extended_nodes, extended_edges));
				}
			}

			for (path_nodes, path_edges) in &next {
				let resolved: Option<Vec<GraphNode>> = path_nodes
					.iter()
					.map(|id| nodes.iter().find(|node| node.node_id == *id).cloned())
					.collect();

				if let Some(resolved) = resolved {
					paths.push(GraphPath {
						nodes: resolved,
						relationships: path_edges.clone(),
						length: path_edges.len() as u32,
					});
				}
			}

			frontier = next;
		}

		paths.truncate(request.limit as usize);

		Ok(paths)
	}
}
impl GraphStore for MemoryGraphStore {
	fn traverse<'a>(&'a self, request: &'a GraphTraversal) -> BoxFuture<'a, Result<Vec<GraphPath>>> {
		let result = self.walk(request);

		Box::pin(async move { result })
	}
}

/// Cosine similarity. Zero when either vector has no magnitude.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() {
		return 0.0;
	}

	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	dot / (norm_a * norm_b)
}

fn step(edge: &GraphRelationship, tip: Uuid, direction: TraversalDirection) -> Option<Uuid> {
	let outgoing = edge.source_id == tip && direction != TraversalDirection::Incoming;
	let incoming = edge.target_id == tip && direction != TraversalDirection::Outgoing;

	if outgoing {
		Some(edge.target_id)
	} else if incoming {
		Some(edge.source_id)
	} else {
		None
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}
