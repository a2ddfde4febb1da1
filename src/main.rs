use anyhow::Result;
use prstat::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    prstat::logging::init(cli.common.verbose)?;
    cli.execute().await
}
