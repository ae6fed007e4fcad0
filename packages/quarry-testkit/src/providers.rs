use std::sync::{
	Mutex,
	atomic::{AtomicUsize, Ordering},
};

use quarry_config::{EmbeddingProviderConfig, ProviderConfig};
use quarry_domain::text;
use quarry_providers::{EmbeddingKind, Error, Result};
use quarry_service::{BoxFuture, EmbeddingProvider, RerankProvider};

/// Deterministic bag-of-words vectors: each keyword hashes to one signed dimension.
pub struct HashEmbedding {
	dimensions: usize,
	failure: Mutex<Option<String>>,
	calls: AtomicUsize,
}
impl HashEmbedding {
	pub fn new(dimensions: u32) -> Self {
		Self {
			dimensions: dimensions.max(1) as usize,
			failure: Mutex::new(None),
			calls: AtomicUsize::new(0),
		}
	}

	/// Unit-length vector for `text`; all zeros when it has no keywords.
	pub fn vector(&self, text: &str) -> Vec<f32> {
		let mut vector = vec![0.0_f32; self.dimensions];

		for keyword in text::tokenize_keywords(text) {
			let hash = blake3::hash(keyword.as_bytes());
			let bytes = hash.as_bytes();
			let mut head = [0_u8; 8];

			head.copy_from_slice(&bytes[..8]);

			let slot = (u64::from_le_bytes(head) % self.dimensions as u64) as usize;
			let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

			vector[slot] += sign;
		}

		let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();

		if norm > 0.0 {
			for value in &mut vector {
				*value /= norm;
			}
		}

		vector
	}

	pub fn fail_with(&self, message: impl Into<String>) {
		*self.failure.lock().unwrap_or_else(|err| err.into_inner()) = Some(message.into());
	}

	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		if let Some(message) = self.failure.lock().unwrap_or_else(|err| err.into_inner()).as_ref() {
			return Err(Error::InvalidResponse { message: message.clone() });
		}

		Ok(texts.iter().map(|text| self.vector(text)).collect())
	}
}
impl EmbeddingProvider for HashEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		_kind: EmbeddingKind,
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		let result = self.embed_all(texts);

		Box::pin(async move { result })
	}
}

/// Scores each document by the share of query keywords it contains.
#[derive(Default)]
pub struct OverlapRerank {
	failure: Mutex<Option<String>>,
	calls: AtomicUsize,
}
impl OverlapRerank {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn fail_with(&self, message: impl Into<String>) {
		*self.failure.lock().unwrap_or_else(|err| err.into_inner()) = Some(message.into());
	}

	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	fn score_all(&self, query: &str, docs: &[String]) -> Result<Vec<f32>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		if let Some(message) = self.failure.lock().unwrap_or_else(|err| err.into_inner()).as_ref() {
			return Err(Error::InvalidResponse { message: message.clone() });
		}

		let keywords = text::tokenize_keywords(query);

		Ok(docs.iter().map(|doc| text::lexical_overlap(&keywords, doc)).collect())
	}
}
impl RerankProvider for OverlapRerank {
	fn rerank<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		let result = self.score_all(query, docs);

		Box::pin(async move { result })
	}
}
