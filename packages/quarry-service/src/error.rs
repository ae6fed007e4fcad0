use serde::Serialize;
use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Vector store error: {message}")]
	VectorStore { message: String },
	#[error("Graph store error: {message}")]
	GraphStore { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Strategy {strategy} timed out after {timeout_ms} ms.")]
	Timeout { strategy: String, timeout_ms: u64 },
	#[error("All {} ensemble strategies failed for query {query_id}.", failures.len())]
	AllStrategiesFailed { query_id: Uuid, failures: Vec<BranchFailure> },
	#[error("Strategy {strategy} failed for query {query_id}: {source}")]
	Retrieval {
		strategy: String,
		query_id: Uuid,
		#[source]
		source: Box<Error>,
	},
}
impl Error {
	/// Whether the orchestrator may retry the query with the fallback strategy.
	pub fn is_fallback_eligible(&self) -> bool {
		match self {
			Self::Provider { .. }
			| Self::VectorStore { .. }
			| Self::GraphStore { .. }
			| Self::Storage { .. }
			| Self::Timeout { .. }
			| Self::AllStrategiesFailed { .. } => true,
			Self::Retrieval { source, .. } => source.is_fallback_eligible(),
			Self::InvalidRequest { .. } | Self::Configuration { .. } => false,
		}
	}

	/// Strips context wrappers.
	pub fn root_cause(&self) -> &Error {
		match self {
			Self::Retrieval { source, .. } => source.root_cause(),
			other => other,
		}
	}

	pub(crate) fn with_context(self, strategy: &str, query_id: Uuid) -> Self {
		match self {
			Self::InvalidRequest { .. }
			| Self::Configuration { .. }
			| Self::AllStrategiesFailed { .. }
			| Self::Retrieval { .. } => self,
			other => Self::Retrieval {
				strategy: strategy.to_string(),
				query_id,
				source: Box::new(other),
			},
		}
	}
}
impl From<quarry_providers::Error> for Error {
	fn from(err: quarry_providers::Error) -> Self {
		match err {
			quarry_providers::Error::InvalidConfig { message } => Self::Configuration { message },
			other => Self::Provider { message: other.to_string() },
		}
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<quarry_domain::Error> for Error {
	fn from(err: quarry_domain::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}

/// One failed ensemble branch. Recorded on the fused response, not raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchFailure {
	pub strategy: String,
	pub error: String,
}

pub(crate) fn vector_store_error(err: quarry_storage::Error) -> Error {
	Error::VectorStore { message: err.to_string() }
}

pub(crate) fn storage_error(err: quarry_storage::Error) -> Error {
	Error::Storage { message: err.to_string() }
}

pub(crate) fn graph_store_error(err: quarry_storage::Error) -> Error {
	Error::GraphStore { message: err.to_string() }
}
