use std::path::PathBuf;

use clap::Args;

use crate::matching::Normalizer;
use crate::services::Services;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum IngestSource {
    /// Ontology definition file (OBO format)
    Hpo,
    /// Gene-alias crosswalk (HGNC TSV export)
    Genes,
    /// Patient records (JSON array of wire-format submissions)
    Patients,
}

#[derive(Args)]
pub struct IngestArgs {
    /// What kind of data the file holds
    #[arg(value_enum)]
    pub source: IngestSource,

    /// Path to the source file
    pub file: PathBuf,
}

/// Execute ingest subcommand
///
/// # Errors
///
/// Returns an error if the source file is malformed; nothing is committed
/// in that case.
pub fn run(args: &IngestArgs, services: &Services) -> anyhow::Result<()> {
    let n = match args.source {
        IngestSource::Hpo => services.ontology.ingest_file(&args.file)?,
        IngestSource::Genes => services.genes.ingest_file(&args.file)?,
        IngestSource::Patients => {
            // Vocabularies must be ingested first for references to resolve
            let normalizer = Normalizer::new(&services.ontology, &services.genes);
            services.patients.ingest_file(&args.file, &normalizer)?
        }
    };

    println!("Indexed {n} records from {}", args.file.display());
    Ok(())
}
