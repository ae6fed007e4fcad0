use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::{
	query::{Difficulty, QueryIntent, QueryType},
	strategy::StrategyKind,
	text,
};

pub const ANALYTICAL_VERBS: &[&str] = &[
	"analyze",
	"analyse",
	"analyzes",
	"analyzed",
	"analyzing",
	"compare",
	"compares",
	"compared",
	"comparing",
	"comparison",
	"synthesize",
	"synthesise",
	"synthesizing",
	"synthesis",
	"evaluate",
	"evaluates",
	"evaluated",
	"evaluating",
	"evaluation",
];

const HARD_WORD_COUNT: usize = 20;
const MEDIUM_WORD_COUNT: usize = 10;
const COMPLEXITY_WORD_SCALE: f32 = 10.0;

const COMPARATIVE_WORDS: &[&str] = &["versus", "vs", "difference", "differences", "differ"];
const PROCEDURAL_WORDS: &[&str] = &["steps", "procedure", "install", "configure", "setup"];
const PROCEDURAL_PHRASES: &[&str] = &["how to", "how do", "how can", "step by step"];
const TROUBLESHOOTING_WORDS: &[&str] =
	&["error", "errors", "problem", "fix", "failing", "fails", "broken", "crash", "debug"];
const CREATIVE_WORDS: &[&str] = &["create", "generate", "design", "draft", "brainstorm", "invent"];
const FACTUAL_OPENERS: &[&str] = &[
	"what is", "what are", "what was", "who is", "who was", "when did", "when was", "where is",
	"define", "explain",
];
const ENTITY_LEADING_NOISE: &[&str] =
	&["define", "describe", "explain", "find", "give", "list", "show", "tell"];

static ENTITY_SPAN: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(r"\b\p{Lu}[\p{L}\p{N}'\-]*(?:\s+\p{Lu}[\p{L}\p{N}'\-]*)+").ok()
});

/// Rule-based classification of one query text. Recomputed per query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnalysis {
	pub query_type: QueryType,
	pub difficulty: Difficulty,
	/// In `[0, 1]`.
	pub complexity: f32,
	pub word_count: usize,
	pub entities: Vec<String>,
	pub keywords: Vec<String>,
	pub intent: QueryIntent,
	pub suggested_strategy: StrategyKind,
	pub confidence: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryAnalyzer;
impl QueryAnalyzer {
	pub fn new() -> Self {
		Self
	}

	/// Never fails. Blank input produces an easy factual analysis with low confidence.
	pub fn analyze(&self, text: &str) -> QueryAnalysis {
		let trimmed = text.trim();
		let word_count = trimmed.split_whitespace().count();

		if word_count == 0 {
			return QueryAnalysis {
				query_type: QueryType::Factual,
				difficulty: Difficulty::Easy,
				complexity: 0.0,
				word_count: 0,
				entities: Vec::new(),
				keywords: Vec::new(),
				intent: QueryIntent::Factual,
				suggested_strategy: StrategyKind::RetrieveRead,
				confidence: 0.1,
			};
		}

		let query_type = classify_query_type(trimmed);
		let analytical = query_type == QueryType::Analytical;
		let difficulty = if word_count > HARD_WORD_COUNT || analytical {
			Difficulty::Hard
		} else if word_count > MEDIUM_WORD_COUNT {
			Difficulty::Medium
		} else {
			Difficulty::Easy
		};
		let complexity = (word_count as f32 / COMPLEXITY_WORD_SCALE).min(1.0);
		let suggested_strategy =
			if analytical { StrategyKind::TwoStageRerank } else { StrategyKind::RetrieveRead };
		let confidence = if analytical {
			0.9
		} else if has_factual_opener(trimmed) {
			0.8
		} else {
			0.6
		};

		QueryAnalysis {
			query_type,
			difficulty,
			complexity,
			word_count,
			entities: extract_entities(trimmed),
			keywords: text::tokenize_keywords(trimmed),
			intent: classify_intent(trimmed, analytical),
			suggested_strategy,
			confidence,
		}
	}
}

pub fn classify_query_type(text: &str) -> QueryType {
	if text::contains_any_word(text, ANALYTICAL_VERBS) {
		QueryType::Analytical
	} else {
		QueryType::Factual
	}
}

/// Capitalized multi-word spans, stripped of leading question words and imperative verbs.
pub fn extract_entities(text: &str) -> Vec<String> {
	let Some(pattern) = ENTITY_SPAN.as_ref() else { return Vec::new() };
	let mut out: Vec<String> = Vec::new();

	for found in pattern.find_iter(text) {
		let words: Vec<&str> = found.as_str().split_whitespace().collect();
		let start = words
			.iter()
			.position(|word| !is_entity_noise(word))
			.unwrap_or(words.len());
		let kept = &words[start..];

		if kept.len() < 2 {
			continue;
		}

		let entity = kept.join(" ");

		if !out.contains(&entity) {
			out.push(entity);
		}
	}

	out
}

fn is_entity_noise(word: &str) -> bool {
	let lowered = word.to_lowercase();

	text::is_stop_word(&lowered)
		|| ANALYTICAL_VERBS.contains(&lowered.as_str())
		|| ENTITY_LEADING_NOISE.contains(&lowered.as_str())
}

fn classify_intent(text: &str, analytical: bool) -> QueryIntent {
	if analytical {
		return QueryIntent::Analytical;
	}
	if text::contains_any_word(text, COMPARATIVE_WORDS) {
		return QueryIntent::Comparative;
	}

	let lowered = text.to_lowercase();

	if PROCEDURAL_PHRASES.iter().any(|phrase| lowered.contains(phrase))
		|| text::contains_any_word(text, PROCEDURAL_WORDS)
	{
		return QueryIntent::Procedural;
	}
	if text::contains_any_word(text, TROUBLESHOOTING_WORDS) {
		return QueryIntent::Troubleshooting;
	}
	if text::contains_any_word(text, CREATIVE_WORDS) {
		return QueryIntent::Creative;
	}

	QueryIntent::Factual
}

fn has_factual_opener(text: &str) -> bool {
	let lowered = text.to_lowercase();

	FACTUAL_OPENERS.iter().any(|opener| lowered.starts_with(opener))
}
