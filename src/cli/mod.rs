//! Command-line interface for pheno-match.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **ingest**: Load an ontology, gene crosswalk, or patient file into the
//!   datastore
//! - **auth**: Add, remove, or list partner trust entries
//! - **serve**: Start the match API server
//!
//! ## Usage
//!
//! ```text
//! # Load vocabularies, then patients (patients must come last)
//! pheno-match ingest hpo hp.obo
//! pheno-match ingest genes genes.tsv
//! pheno-match ingest patients patients.json
//!
//! # Authorize an inbound client (key is generated and printed)
//! pheno-match auth add other-server in
//!
//! # Authorize an outbound partner
//! pheno-match auth add other-server out --base-url https://other.example.com/api
//!
//! # Start the server
//! pheno-match serve --port 8000
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod auth;
pub mod ingest;

#[derive(Parser)]
#[command(name = "pheno-match")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Federated rare-disease patient matching by phenotype and candidate gene")]
#[command(
    long_about = "pheno-match normalizes clinical case submissions against an ontology and a gene-alias crosswalk, ranks candidate matches from the local corpus, and federates queries across a trust-managed network of partner servers."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the datastore snapshot file
    #[arg(long, global = true, default_value = "datastore.json")]
    pub datastore: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load an ontology, gene crosswalk, or patient file
    Ingest(ingest::IngestArgs),

    /// Manage partner trust entries
    Auth(auth::AuthArgs),

    /// Start the match API server
    Serve(ServeArgs),
}

#[derive(clap::Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    pub port: u16,

    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1")]
    pub address: String,
}
