//! Read-only diagnostic tool for a built vocabulary index directory:
//! concept counts per system, a sample of normalized terms, and (given a
//! code) the stored concept record.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use medterm_core::{MappingConfig, System, VocabularyStore};

#[derive(Parser)]
#[command(about = "Inspect a built SNOMED/LOINC/RxNorm index directory")]
struct Args {
    /// Directory holding `*.fst`/`*.redb`/`mapping_config.json`.
    #[arg(long, default_value = "data/terminology")]
    index_dir: PathBuf,

    /// Restrict to one system; defaults to all systems present in
    /// `mapping_config.json`.
    #[arg(long)]
    system: Option<System>,

    /// Number of sample normalized terms to print per system.
    #[arg(long, default_value_t = 5)]
    sample: usize,

    /// Look up and print the full concept record for this code (combine
    /// with `--system`).
    #[arg(long, requires = "system")]
    code: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = MappingConfig::load(&args.index_dir)?;
    println!("index dir: {}", args.index_dir.display());
    println!("systems in mapping_config.json:");
    for descriptor in &config.systems {
        println!("  {} -> {}", descriptor.name, descriptor.display_uri);
    }
    println!();

    let systems: Vec<System> = match args.system {
        Some(s) => vec![s],
        None => System::ALL.to_vec(),
    };

    for system in systems {
        let store = match VocabularyStore::open(system, &args.index_dir) {
            Ok(store) => store,
            Err(err) => {
                println!("{system}: unavailable ({err})");
                continue;
            }
        };

        println!("{system}: {} fuzzy-index entries", store.concept_count());
        println!("  sample normalized terms:");
        for term in store.iter_terms().take(args.sample) {
            println!("    {term}");
        }

        if let Some(code) = &args.code {
            match store.get_by_code(code)? {
                Some(concept) => println!("  concept {code}: {concept:#?}"),
                None => println!("  concept {code}: not found"),
            }
        }
        println!();
    }

    Ok(())
}
