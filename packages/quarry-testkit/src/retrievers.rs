use std::{
	sync::atomic::{AtomicUsize, Ordering},
	time::Duration,
};

use quarry_domain::StrategyKind;
use quarry_service::{
	BoxFuture, DebugInfo, Error, PreparedQuery, RagResponse, Result, RetrievalResult, Retriever,
	StrategyConfig, response,
};

enum Script {
	Results(Vec<RetrievalResult>),
	Fail(String),
	Stall(Duration),
}

/// A retriever with a fixed outcome that counts its invocations and the calls that ran to
/// completion.
pub struct ScriptedRetriever {
	kind: StrategyKind,
	script: Script,
	calls: AtomicUsize,
	completions: AtomicUsize,
}
impl ScriptedRetriever {
	/// Returns one result per `(document_id, score)` pair.
	pub fn returning(kind: StrategyKind, results: &[(&str, f32)]) -> Self {
		let results = results
			.iter()
			.map(|(document_id, score)| {
				RetrievalResult::new(*document_id, None, format!("{kind} result for {document_id}"), *score)
			})
			.collect();

		Self::with_script(kind, Script::Results(results))
	}

	/// Fails every call with a provider error.
	pub fn failing(kind: StrategyKind, message: impl Into<String>) -> Self {
		Self::with_script(kind, Script::Fail(message.into()))
	}

	/// Sleeps for `delay` before returning nothing.
	pub fn stalling(kind: StrategyKind, delay: Duration) -> Self {
		Self::with_script(kind, Script::Stall(delay))
	}

	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Calls that returned. A call dropped mid-stall is not counted.
	pub fn completed_count(&self) -> usize {
		self.completions.load(Ordering::SeqCst)
	}

	fn with_script(kind: StrategyKind, script: Script) -> Self {
		Self { kind, script, calls: AtomicUsize::new(0), completions: AtomicUsize::new(0) }
	}

	async fn run(&self, query: &PreparedQuery, config: &StrategyConfig) -> Result<RagResponse> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let results = match &self.script {
			Script::Results(results) => response::finalize_results(results.clone(), config.top_k),
			Script::Fail(message) => {
				self.completions.fetch_add(1, Ordering::SeqCst);

				return Err(Error::Provider { message: message.clone() });
			},
			Script::Stall(delay) => {
				tokio::time::sleep(*delay).await;

				Vec::new()
			},
		};

		self.completions.fetch_add(1, Ordering::SeqCst);
		let scores: Vec<f32> = results.iter().map(|result| result.score).collect();

		Ok(RagResponse {
			query_id: query.query_id,
			total_latency_ms: 1.0,
			embedding_latency_ms: 0.0,
			retrieval_latency_ms: 1.0,
			reranking_latency_ms: None,
			strategy: self.kind.to_string(),
			top_k: config.top_k,
			granularity: query.granularity,
			confidence: response::confidence(&scores),
			coverage: response::coverage(scores.len(), config.top_k, &scores),
			explanation: format!("Scripted {} results.", self.kind),
			debug_info: DebugInfo { candidate_count: results.len(), ..Default::default() },
			results,
		})
	}
}
impl Retriever for ScriptedRetriever {
	fn kind(&self) -> StrategyKind {
		self.kind
	}

	fn retrieve<'a>(
		&'a self,
		query: &'a PreparedQuery,
		config: &'a StrategyConfig,
	) -> BoxFuture<'a, Result<RagResponse>> {
		Box::pin(self.run(query, config))
	}
}
