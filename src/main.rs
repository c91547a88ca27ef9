use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod backend;
mod cli;
mod core;
mod federation;
mod genes;
mod matching;
mod ontology;
mod services;
mod trust;
mod web;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("pheno_match=debug,info")
    } else {
        EnvFilter::new("pheno_match=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let backend = Arc::new(backend::MemoryBackend::open(&cli.datastore)?);
    let services = services::Services::new(backend);

    match cli.command {
        cli::Commands::Ingest(args) => {
            cli::ingest::run(&args, &services)?;
        }
        cli::Commands::Auth(args) => {
            cli::auth::run(&args, &services)?;
        }
        cli::Commands::Serve(args) => {
            web::server::run(&args, services)?;
        }
    }

    Ok(())
}
