use unicode_segmentation::UnicodeSegmentation;

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub max_words: u32,
	pub overlap_words: u32,
}
impl ChunkingConfig {
	pub fn coarse(cfg: &quarry_config::Chunking) -> Self {
		Self { max_words: cfg.coarse_max_words, overlap_words: cfg.overlap_words }
	}

	pub fn fine(cfg: &quarry_config::Chunking) -> Self {
		Self { max_words: cfg.fine_max_words, overlap_words: cfg.overlap_words }
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
	pub chunk_index: i32,
	/// Byte offsets into the source text.
	pub start_offset: usize,
	pub end_offset: usize,
	pub text: String,
}

/// One document split at both stored granularities.
#[derive(Clone, Debug)]
pub struct GranularChunks {
	pub coarse: Vec<Chunk>,
	pub fine: Vec<Chunk>,
}

pub fn split_granularities(text: &str, cfg: &quarry_config::Chunking) -> GranularChunks {
	let chunks = GranularChunks {
		coarse: split_text(text, &ChunkingConfig::coarse(cfg)),
		fine: split_text(text, &ChunkingConfig::fine(cfg)),
	};

	tracing::debug!(
		coarse = chunks.coarse.len(),
		fine = chunks.fine.len(),
		"Split document into chunks."
	);

	chunks
}

/// Packs whole sentences into chunks of at most `max_words` words. A single sentence longer
/// than the budget becomes its own chunk. Consecutive chunks share `overlap_words` trailing words.
pub fn split_text(text: &str, cfg: &ChunkingConfig) -> Vec<Chunk> {
	let max_words = cfg.max_words.max(1) as usize;
	let mut chunks = Vec::new();
	let mut current = String::new();
	let mut current_words = 0_usize;
	let mut current_start = 0_usize;
	let mut last_end = 0_usize;
	let mut chunk_index = 0_i32;

	for (idx, sentence) in text.split_sentence_bound_indices() {
		let sentence_words = word_count(sentence);

		if current_words > 0 && current_words + sentence_words > max_words {
			chunks.push(Chunk {
				chunk_index,
				start_offset: current_start,
				end_offset: last_end,
				text: current.clone(),
			});

			chunk_index += 1;

			let tail = overlap_tail(&current, cfg.overlap_words as usize);

			current_start = last_end - tail.len();
			current = tail.to_string();
			current_words = word_count(&current);
		}
		if current.is_empty() {
			current_start = idx;
		}

		current.push_str(sentence);

		current_words += sentence_words;
		last_end = idx + sentence.len();
	}

	if current_words > 0 {
		chunks.push(Chunk {
			chunk_index,
			start_offset: current_start,
			end_offset: last_end,
			text: current,
		});
	}

	chunks
}

fn word_count(text: &str) -> usize {
	text.unicode_words().count()
}

fn overlap_tail(text: &str, overlap_words: usize) -> &str {
	if overlap_words == 0 {
		return "";
	}

	let starts: Vec<usize> = text.unicode_word_indices().map(|(idx, _)| idx).collect();

	match starts.len().checked_sub(overlap_words) {
		Some(first) => &text[starts[first]..],
		None => text,
	}
}
