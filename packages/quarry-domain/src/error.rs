pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("Unknown retrieval strategy {name:?}.")]
	UnknownStrategy { name: String },
	#[error("Unknown routing policy {name:?}.")]
	UnknownRoutingPolicy { name: String },
	#[error("Unknown granularity {name:?}.")]
	UnknownGranularity { name: String },
}
