use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = quarry::Args::parse();

	quarry::run(args).await
}
