use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Side of an instruction-tuned embedding model's query/document asymmetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
	Query,
	Document,
}

/// Applies the configured query or document instruction, if any.
pub fn instruct(
	cfg: &quarry_config::EmbeddingProviderConfig,
	kind: EmbeddingKind,
	text: &str,
) -> String {
	let instruction = match kind {
		EmbeddingKind::Query => cfg.query_instruction.as_deref(),
		EmbeddingKind::Document => cfg.document_instruction.as_deref(),
	};

	match instruction {
		Some(instruction) => format!("{} {text}", instruction.trim_end()),
		None => text.to_string(),
	}
}

pub async fn embed(
	cfg: &quarry_config::EmbeddingProviderConfig,
	texts: &[String],
	kind: EmbeddingKind,
) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let input: Vec<String> = texts.iter().map(|text| instruct(cfg, kind, text)).collect();
	let body = serde_json::json!({
		"model": cfg.model,
		"input": input,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;
	let vectors = parse_embedding_response(json)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding provider returned {} vectors for {} inputs.",
				vectors.len(),
				texts.len()
			),
		});
	}
	if let Some(vector) = vectors.iter().find(|vector| vector.len() != cfg.dimensions as usize) {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding dimension mismatch. Expected {}, got {}.",
				cfg.dimensions,
				vector.len()
			),
		});
	}

	tracing::debug!(provider_id = %cfg.provider_id, count = vectors.len(), "Embedded texts.");

	Ok(vectors)
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse {
				message: "Embedding item is missing embedding array.".to_string(),
			}
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
