use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Named retrieval algorithms known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
	/// Dense retrieve-then-read.
	RetrieveRead,
	/// Dense candidates re-scored with lexical keyword overlap.
	Hybrid,
	/// Dense candidates re-scored by a cross-encoder rerank provider.
	TwoStageRerank,
	/// Entity traversal over the graph store.
	GraphRag,
	/// Store selection delegated to the database router.
	Adaptive,
}
impl StrategyKind {
	pub const ALL: [Self; 5] =
		[Self::RetrieveRead, Self::Hybrid, Self::TwoStageRerank, Self::GraphRag, Self::Adaptive];
	/// Strategy every other strategy falls back to.
	pub const FALLBACK: Self = Self::RetrieveRead;

	pub fn as_str(self) -> &'static str {
		match self {
			Self::RetrieveRead => "retrieve_read",
			Self::Hybrid => "hybrid",
			Self::TwoStageRerank => "two_stage_rerank",
			Self::GraphRag => "graph_rag",
			Self::Adaptive => "adaptive",
		}
	}
}
impl fmt::Display for StrategyKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for StrategyKind {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let normalized = s.trim().to_lowercase();

		Self::ALL
			.into_iter()
			.find(|kind| kind.as_str() == normalized)
			.ok_or(Error::UnknownStrategy { name: normalized })
	}
}
