mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Scan {
            registry,
            json,
            files,
        } => cli::scan::run(config, &registry, json, &files).await,
        Commands::Match {
            registry,
            threshold,
            name,
        } => cli::match_name::run(config, &registry, threshold, &name).await,
        Commands::Extract { file } => cli::extract::run(config, &file).await,
    }
}
