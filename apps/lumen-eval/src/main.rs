use clap::Parser;

use lumen_eval::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	lumen_eval::run(args).await
}
