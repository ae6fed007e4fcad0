mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Analytics, Chunking, Config, EmbeddingProviderConfig, Ensemble, Postgres, ProviderConfig,
	Providers, Qdrant, Retrieval, Routing, Service, Storage, StrategyOverrides,
};

use std::{fs, path::Path};

pub const STRATEGY_NAMES: [&str; 5] =
	["retrieve_read", "hybrid", "two_stage_rerank", "graph_rag", "adaptive"];
pub const ROUTING_POLICY_NAMES: [&str; 3] = ["vector_first", "graph_first", "adaptive"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}

	let mut keys = vec![("embedding", &cfg.providers.embedding.api_key)];

	if let Some(rerank) = cfg.providers.rerank.as_ref() {
		keys.push(("rerank", &rerank.api_key));
	}

	for (label, key) in keys {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	validate_retrieval(cfg)?;

	if !ROUTING_POLICY_NAMES.contains(&cfg.routing.default_policy.as_str()) {
		return Err(Error::Validation {
			message:
				"routing.default_policy must be one of vector_first, graph_first, or adaptive."
					.to_string(),
		});
	}
	if !matches!(cfg.analytics.sink.as_str(), "tracing" | "postgres") {
		return Err(Error::Validation {
			message: "analytics.sink must be one of tracing or postgres.".to_string(),
		});
	}
	if cfg.analytics.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "analytics.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.analytics.enabled && cfg.analytics.sink == "postgres" && cfg.storage.postgres.is_none()
	{
		return Err(Error::Validation {
			message: "storage.postgres is required when analytics.sink is postgres.".to_string(),
		});
	}
	if let Some(postgres) = cfg.storage.postgres.as_ref()
		&& postgres.pool_max_conns == 0
	{
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	validate_chunking(cfg)?;

	Ok(())
}

fn validate_retrieval(cfg: &Config) -> Result<()> {
	let retrieval = &cfg.retrieval;

	if !STRATEGY_NAMES.contains(&retrieval.default_strategy.as_str()) {
		return Err(Error::Validation {
			message: format!(
				"retrieval.default_strategy must be one of {}.",
				STRATEGY_NAMES.join(", ")
			),
		});
	}
	if retrieval.max_top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.max_top_k must be greater than zero.".to_string(),
		});
	}
	if retrieval.top_k == 0 || retrieval.top_k > retrieval.max_top_k {
		return Err(Error::Validation {
			message: "retrieval.top_k must be between 1 and retrieval.max_top_k.".to_string(),
		});
	}

	validate_unit_interval("retrieval.score_threshold", retrieval.score_threshold)?;

	if retrieval.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "retrieval.timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (name, overrides) in &retrieval.strategies {
		if !STRATEGY_NAMES.contains(&name.as_str()) {
			return Err(Error::Validation {
				message: format!("retrieval.strategies.{name} is not a known strategy."),
			});
		}

		validate_overrides(name, overrides, retrieval.max_top_k)?;
	}

	if !matches!(retrieval.ensemble.fusion_method.as_str(), "max_score" | "reciprocal_rank") {
		return Err(Error::Validation {
			message: "retrieval.ensemble.fusion_method must be one of max_score or reciprocal_rank."
				.to_string(),
		});
	}
	if retrieval.ensemble.rrf_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.ensemble.rrf_k must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_overrides(name: &str, overrides: &StrategyOverrides, max_top_k: u32) -> Result<()> {
	if let Some(top_k) = overrides.top_k
		&& (top_k == 0 || top_k > max_top_k)
	{
		return Err(Error::Validation {
			message: format!(
				"retrieval.strategies.{name}.top_k must be between 1 and retrieval.max_top_k."
			),
		});
	}
	if let Some(threshold) = overrides.score_threshold {
		validate_unit_interval(&format!("retrieval.strategies.{name}.score_threshold"), threshold)?;
	}
	if overrides.timeout_ms == Some(0) {
		return Err(Error::Validation {
			message: format!("retrieval.strategies.{name}.timeout_ms must be greater than zero."),
		});
	}

	for (label, weight) in [
		("dense_weight", overrides.dense_weight),
		("sparse_weight", overrides.sparse_weight),
	] {
		let Some(weight) = weight else { continue };

		if !weight.is_finite() || weight < 0.0 {
			return Err(Error::Validation {
				message: format!(
					"retrieval.strategies.{name}.{label} must be a finite number of zero or greater."
				),
			});
		}
	}

	if let (Some(dense), Some(sparse)) = (overrides.dense_weight, overrides.sparse_weight)
		&& dense + sparse <= 0.0
	{
		return Err(Error::Validation {
			message: format!(
				"retrieval.strategies.{name}.dense_weight and sparse_weight must not both be zero."
			),
		});
	}
	if overrides.candidate_multiplier == Some(0) {
		return Err(Error::Validation {
			message: format!(
				"retrieval.strategies.{name}.candidate_multiplier must be greater than zero."
			),
		});
	}
	if overrides.rerank_depth == Some(0) {
		return Err(Error::Validation {
			message: format!("retrieval.strategies.{name}.rerank_depth must be greater than zero."),
		});
	}
	if let Some(weight) = overrides.rerank_retrieval_weight {
		validate_unit_interval(
			&format!("retrieval.strategies.{name}.rerank_retrieval_weight"),
			weight,
		)?;
	}
	if overrides.max_graph_hops == Some(0) {
		return Err(Error::Validation {
			message: format!("retrieval.strategies.{name}.max_graph_hops must be greater than zero."),
		});
	}
	if let Some(decay) = overrides.hop_decay {
		validate_unit_interval(&format!("retrieval.strategies.{name}.hop_decay"), decay)?;
	}

	Ok(())
}

fn validate_chunking(cfg: &Config) -> Result<()> {
	let chunking = &cfg.chunking;

	if chunking.fine_max_words == 0 {
		return Err(Error::Validation {
			message: "chunking.fine_max_words must be greater than zero.".to_string(),
		});
	}
	if chunking.fine_max_words >= chunking.coarse_max_words {
		return Err(Error::Validation {
			message: "chunking.fine_max_words must be less than chunking.coarse_max_words."
				.to_string(),
		});
	}
	if chunking.overlap_words >= chunking.fine_max_words {
		return Err(Error::Validation {
			message: "chunking.overlap_words must be less than chunking.fine_max_words."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_unit_interval(label: &str, value: f32) -> Result<()> {
	if !value.is_finite() {
		return Err(Error::Validation { message: format!("{label} must be a finite number.") });
	}
	if !(0.0..=1.0).contains(&value) {
		return Err(Error::Validation {
			message: format!("{label} must be in the range 0.0-1.0."),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let embedding = &mut cfg.providers.embedding;

	if embedding.query_instruction.as_deref().map(|s| s.trim().is_empty()).unwrap_or(false) {
		embedding.query_instruction = None;
	}
	if embedding.document_instruction.as_deref().map(|s| s.trim().is_empty()).unwrap_or(false) {
		embedding.document_instruction = None;
	}

	cfg.retrieval.default_strategy = cfg.retrieval.default_strategy.trim().to_lowercase();
	cfg.routing.default_policy = cfg.routing.default_policy.trim().to_lowercase();
}
