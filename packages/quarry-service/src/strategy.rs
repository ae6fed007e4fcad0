use std::collections::HashMap;

use serde::Serialize;

use crate::{Error, Result};
use quarry_config::{Retrieval, StrategyOverrides};
use quarry_domain::StrategyKind;

const DENSE_WEIGHT: f32 = 0.7;
const SPARSE_WEIGHT: f32 = 0.3;
const CANDIDATE_MULTIPLIER: u32 = 3;
const RERANK_DEPTH: u32 = 50;
const RERANK_RETRIEVAL_WEIGHT: f32 = 0.3;
const MAX_GRAPH_HOPS: u32 = 2;
const HOP_DECAY: f32 = 0.8;

/// Tunables for one strategy invocation. Resolved per call from a read-only template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyConfig {
	pub kind: StrategyKind,
	pub top_k: u32,
	/// Results must score strictly above this value.
	pub score_threshold: f32,
	pub timeout_ms: u64,
	pub dense_weight: f32,
	pub sparse_weight: f32,
	pub candidate_multiplier: u32,
	pub rerank_depth: u32,
	/// Share of the final two-stage score taken from the dense score.
	pub rerank_retrieval_weight: f32,
	pub max_graph_hops: u32,
	/// Empty means any relation.
	pub relationship_types: Vec<String>,
	pub hop_decay: f32,
}
impl StrategyConfig {
	fn base(kind: StrategyKind, cfg: &Retrieval) -> Self {
		Self {
			kind,
			top_k: cfg.top_k,
			score_threshold: cfg.score_threshold,
			timeout_ms: cfg.timeout_ms,
			dense_weight: DENSE_WEIGHT,
			sparse_weight: SPARSE_WEIGHT,
			candidate_multiplier: CANDIDATE_MULTIPLIER,
			rerank_depth: RERANK_DEPTH,
			rerank_retrieval_weight: RERANK_RETRIEVAL_WEIGHT,
			max_graph_hops: MAX_GRAPH_HOPS,
			relationship_types: Vec::new(),
			hop_decay: HOP_DECAY,
		}
	}

	/// Returns a copy with every `Some` field of `overrides` applied.
	pub fn merged(&self, overrides: &StrategyOverrides) -> Self {
		let mut merged = self.clone();

		if let Some(top_k) = overrides.top_k {
			merged.top_k = top_k;
		}
		if let Some(threshold) = overrides.score_threshold {
			merged.score_threshold = threshold;
		}
		if let Some(timeout_ms) = overrides.timeout_ms {
			merged.timeout_ms = timeout_ms;
		}
		if let Some(weight) = overrides.dense_weight {
			merged.dense_weight = weight;
		}
		if let Some(weight) = overrides.sparse_weight {
			merged.sparse_weight = weight;
		}
		if let Some(multiplier) = overrides.candidate_multiplier {
			merged.candidate_multiplier = multiplier;
		}
		if let Some(depth) = overrides.rerank_depth {
			merged.rerank_depth = depth;
		}
		if let Some(weight) = overrides.rerank_retrieval_weight {
			merged.rerank_retrieval_weight = weight;
		}
		if let Some(hops) = overrides.max_graph_hops {
			merged.max_graph_hops = hops;
		}
		if let Some(types) = overrides.relationship_types.as_ref() {
			merged.relationship_types = types.clone();
		}
		if let Some(decay) = overrides.hop_decay {
			merged.hop_decay = decay;
		}

		merged
	}

	pub fn validate(&self) -> Result<()> {
		let invalid = |message: &str| Err(Error::InvalidRequest { message: message.to_string() });

		if self.top_k == 0 {
			return invalid("top_k must be greater than zero.");
		}
		if !(0.0..=1.0).contains(&self.score_threshold) {
			return invalid("score_threshold must be in the range 0.0-1.0.");
		}
		if self.timeout_ms == 0 {
			return invalid("timeout_ms must be greater than zero.");
		}
		if !self.dense_weight.is_finite()
			|| !self.sparse_weight.is_finite()
			|| self.dense_weight < 0.0
			|| self.sparse_weight < 0.0
			|| self.dense_weight + self.sparse_weight <= 0.0
		{
			return invalid("dense_weight and sparse_weight must be non-negative and not both zero.");
		}
		if self.candidate_multiplier == 0 || self.rerank_depth == 0 || self.max_graph_hops == 0 {
			return invalid(
				"candidate_multiplier, rerank_depth and max_graph_hops must be greater than zero.",
			);
		}
		if !(0.0..=1.0).contains(&self.rerank_retrieval_weight)
			|| !(0.0..=1.0).contains(&self.hop_decay)
		{
			return invalid("rerank_retrieval_weight and hop_decay must be in the range 0.0-1.0.");
		}

		Ok(())
	}
}

/// Per-strategy templates built once from configuration.
#[derive(Debug, Clone)]
pub struct StrategyTemplates {
	templates: HashMap<StrategyKind, StrategyConfig>,
	max_top_k: u32,
}
impl StrategyTemplates {
	pub fn from_config(cfg: &Retrieval) -> Result<Self> {
		let mut templates: HashMap<StrategyKind, StrategyConfig> = StrategyKind::ALL
			.into_iter()
			.map(|kind| (kind, StrategyConfig::base(kind, cfg)))
			.collect();

		for (name, overrides) in &cfg.strategies {
			let kind: StrategyKind = name.parse().map_err(|err: quarry_domain::Error| {
				Error::Configuration { message: err.to_string() }
			})?;
			let template = templates.get(&kind).map(|template| template.merged(overrides));

			if let Some(template) = template {
				template.validate().map_err(|err| Error::Configuration {
					message: format!("retrieval.strategies.{name}: {err}"),
				})?;
				templates.insert(kind, template);
			}
		}

		Ok(Self { templates, max_top_k: cfg.max_top_k })
	}

	pub fn max_top_k(&self) -> u32 {
		self.max_top_k
	}

	/// Template, then caller overrides, then the query's `top_k`.
	pub fn resolve(
		&self,
		kind: StrategyKind,
		top_k: Option<u32>,
		overrides: Option<&StrategyOverrides>,
	) -> Result<StrategyConfig> {
		let template = self.templates.get(&kind).ok_or_else(|| Error::Configuration {
			message: format!("No configuration template for strategy {kind}."),
		})?;
		let mut config = match overrides {
			Some(overrides) => template.merged(overrides),
			None => template.clone(),
		};

		if let Some(top_k) = top_k {
			config.top_k = top_k;
		}

		config.top_k = config.top_k.min(self.max_top_k);

		config.validate()?;

		Ok(config)
	}
}
