use anyhow::Result;
use clap::Parser;
use log::info;
use tssc_e2e::cli::Cli;
use tssc_e2e::output;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting tssc-e2e");
    cli.execute().await?;

    Ok(())
}
