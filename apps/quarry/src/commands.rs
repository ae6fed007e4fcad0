use std::{fs, path::Path};

use color_eyre::eyre;
use serde::Serialize;
use serde_json::json;

use crate::QueryArgs;
use quarry_config::Config;
use quarry_domain::{DatabaseRouter, QueryAnalyzer, QueryContext, RoutingPolicy, StrategyKind};
use quarry_service::{
	Providers, RagService,
	ingest::{self, DocumentInput},
};
use quarry_storage::{
	db::Db,
	graph::{self, GraphImport},
	qdrant::QdrantStore,
};

pub fn analyze(text: &str) -> color_eyre::Result<()> {
	print_json(&QueryAnalyzer::new().analyze(text))
}

pub fn route(cfg: &Config, text: &str, policy: Option<RoutingPolicy>) -> color_eyre::Result<()> {
	let analysis = QueryAnalyzer::new().analyze(text);
	let context = QueryContext::from_analysis(text, &analysis);
	let router = DatabaseRouter::from_config(&cfg.routing)?;
	let decision = router.route(&context, policy);

	print_json(&json!({ "context": context, "decision": decision }))
}

pub async fn query(
	cfg: &Config,
	args: QueryArgs,
	strategy: Option<StrategyKind>,
) -> color_eyre::Result<()> {
	let service = RagService::connect(cfg).await?;
	let query = args.into_query();
	let response = match strategy {
		Some(StrategyKind::Adaptive) => service.adaptive_retrieve(query).await?,
		Some(strategy) => service.retrieve_with_strategy(query, strategy, None).await?,
		None => service.retrieve(query).await?,
	};

	print_json(&response)
}

pub async fn ensemble(
	cfg: &Config,
	args: QueryArgs,
	strategies: &[StrategyKind],
) -> color_eyre::Result<()> {
	let service = RagService::connect(cfg).await?;
	let response = service.ensemble_retrieve(args.into_query(), strategies).await?;

	print_json(&response)
}

/// One `DocumentInput` JSON object per line. Blank lines are skipped.
pub async fn ingest(cfg: &Config, path: &Path) -> color_eyre::Result<()> {
	let raw = fs::read_to_string(path)?;
	let mut docs = Vec::new();

	for (idx, line) in raw.lines().enumerate() {
		if line.trim().is_empty() {
			continue;
		}

		let doc: DocumentInput = serde_json::from_str(line)
			.map_err(|err| eyre::eyre!("Line {} of {} is not a document: {err}.", idx + 1, path.display()))?;

		docs.push(doc);
	}

	let store = QdrantStore::new(&cfg.storage.qdrant)?;

	store.ensure_collection().await?;

	let providers = Providers::default();

	for doc in &docs {
		let report = ingest::ingest_document(
			providers.embedding.as_ref(),
			&cfg.providers.embedding,
			&cfg.chunking,
			&store,
			doc,
		)
		.await?;

		print_json(&json!({ "document_id": doc.document_id, "report": report }))?;
	}

	tracing::info!(documents = docs.len(), path = %path.display(), "Ingestion finished.");

	Ok(())
}

pub async fn import_graph(cfg: &Config, path: &Path) -> color_eyre::Result<()> {
	let Some(postgres) = cfg.storage.postgres.as_ref() else {
		return Err(eyre::eyre!("storage.postgres is required to import a graph."));
	};
	let import: GraphImport = serde_json::from_str(&fs::read_to_string(path)?)?;
	let db = Db::connect(postgres).await?;

	db.ensure_schema().await?;

	let report = graph::import_graph(&db.pool, &import).await?;

	print_json(&json!({ "nodes": report.nodes, "edges": report.edges }))
}

fn print_json<T>(value: &T) -> color_eyre::Result<()>
where
	T: ?Sized + Serialize,
{
	println!("{}", serde_json::to_string_pretty(value)?);

	Ok(())
}
