use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

pub const STOP_WORDS: &[&str] = &[
	"a", "about", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by",
	"can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "how", "i", "if",
	"in", "into", "is", "it", "its", "me", "my", "no", "not", "of", "on", "or", "our", "should",
	"so", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
	"those", "to", "was", "we", "were", "what", "when", "where", "which", "who", "whom", "why",
	"will", "with", "would", "you", "your",
];

pub fn is_stop_word(word: &str) -> bool {
	STOP_WORDS.contains(&word)
}

/// Lowercased content words longer than two characters, in first-seen order.
pub fn tokenize_keywords(text: &str) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for word in text.unicode_words() {
		let lowered = word.to_lowercase();

		if lowered.chars().count() <= 2 || is_stop_word(&lowered) {
			continue;
		}
		if seen.insert(lowered.clone()) {
			out.push(lowered);
		}
	}

	out
}

/// Fraction of `keywords` that occur as whole words in `text`.
pub fn lexical_overlap(keywords: &[String], text: &str) -> f32 {
	if keywords.is_empty() {
		return 0.0;
	}

	let words: HashSet<String> = text.unicode_words().map(str::to_lowercase).collect();

	if words.is_empty() {
		return 0.0;
	}

	let hits = keywords.iter().filter(|keyword| words.contains(keyword.as_str())).count();

	hits as f32 / keywords.len() as f32
}

/// Whole-word, case-insensitive membership check against a vocabulary.
pub fn contains_any_word(text: &str, vocabulary: &[&str]) -> bool {
	text.unicode_words().any(|word| vocabulary.contains(&word.to_lowercase().as_str()))
}
