pub mod analytics;
pub mod db;
pub mod graph;
pub mod models;
pub mod qdrant;
pub mod schema;

mod error;

pub use error::Error;

use std::{future::Future, pin::Pin};

use models::{ChunkGranularity, ChunkHit, ChunkRecord, GraphPath, GraphTraversal, VectorSearch};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Similarity search over stored chunks.
pub trait VectorStore
where
	Self: Send + Sync,
{
	/// Hits scoring strictly above `score_threshold`, best first, at most `top_k`.
	fn search<'a>(&'a self, request: &'a VectorSearch) -> BoxFuture<'a, Result<Vec<ChunkHit>>>;

	/// Chunks of one document at one granularity, ordered by chunk index. Missing indexes are
	/// skipped.
	fn fetch<'a>(
		&'a self,
		document_id: &'a str,
		granularity: ChunkGranularity,
		chunk_indexes: &'a [i32],
	) -> BoxFuture<'a, Result<Vec<ChunkRecord>>>;
}

pub trait GraphStore
where
	Self: Send + Sync,
{
	fn traverse<'a>(&'a self, request: &'a GraphTraversal) -> BoxFuture<'a, Result<Vec<GraphPath>>>;
}
