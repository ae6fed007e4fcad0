pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Provider request failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("Provider payload could not be decoded: {0}")]
	Decode(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl Error {
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Http(err) if err.is_timeout())
	}
}
