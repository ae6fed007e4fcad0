pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use quarry_domain::{Granularity, RoutingPolicy, StrategyKind};
use quarry_service::RagQuery;

#[derive(Debug, Parser)]
#[command(
	version = quarry_cli::VERSION,
	rename_all = "kebab",
	styles = quarry_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Classify a query. Touches no store.
	Analyze { text: String },
	/// Show the store routing decision for a query.
	Route {
		text: String,
		/// Overrides routing.default_policy.
		#[arg(long, value_name = "POLICY")]
		policy: Option<RoutingPolicy>,
	},
	/// Retrieve with one strategy, or with the analyzer's suggestion when none is given.
	Query {
		#[command(flatten)]
		query: QueryArgs,
		#[arg(long, value_name = "STRATEGY")]
		strategy: Option<StrategyKind>,
	},
	/// Run several strategies concurrently and fuse their results.
	Ensemble {
		#[command(flatten)]
		query: QueryArgs,
		#[arg(long, value_name = "STRATEGY", value_delimiter = ',', required = true)]
		strategies: Vec<StrategyKind>,
	},
	/// Chunk, embed, and index documents from a JSON Lines file.
	Ingest {
		#[arg(value_name = "FILE")]
		path: PathBuf,
	},
	/// Load nodes and edges from a JSON file into the Postgres graph store.
	ImportGraph {
		#[arg(value_name = "FILE")]
		path: PathBuf,
	},
}

#[derive(Debug, clap::Args)]
pub struct QueryArgs {
	pub text: String,
	#[arg(long, value_name = "N")]
	pub top_k: Option<u32>,
	#[arg(long, value_name = "GRANULARITY", default_value = "coarse")]
	pub granularity: Granularity,
	#[arg(long, value_name = "ID")]
	pub session_id: Option<String>,
	#[arg(long, value_name = "MS")]
	pub timeout_ms: Option<u64>,
	#[arg(long)]
	pub include_metadata: bool,
}
impl QueryArgs {
	pub fn into_query(self) -> RagQuery {
		RagQuery {
			top_k: self.top_k,
			granularity: self.granularity,
			session_id: self.session_id,
			client_id: Some("quarry-cli".to_string()),
			timeout_ms: self.timeout_ms,
			include_metadata: self.include_metadata,
			..RagQuery::new(self.text)
		}
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = quarry_config::load(&args.config)?;

	quarry_cli::init_tracing(&config.service.log_level);

	match args.command {
		Command::Analyze { text } => commands::analyze(&text),
		Command::Route { text, policy } => commands::route(&config, &text, policy),
		Command::Query { query, strategy } => commands::query(&config, query, strategy).await,
		Command::Ensemble { query, strategies } =>
			commands::ensemble(&config, query, &strategies).await,
		Command::Ingest { path } => commands::ingest(&config, &path).await,
		Command::ImportGraph { path } => commands::import_graph(&config, &path).await,
	}
}
