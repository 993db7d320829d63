//! Offline vocabulary index builder.
//!
//! Reads per-system vocabulary source files — a JSON array of concept
//! records `{code, display, attributes, normalized_forms[]}` — and emits
//! the embedded index artifacts `medterm-core`'s `VocabularyStore` expects
//! to open at runtime: one `<system>.fst` (normalized term -> bucket id)
//! plus one `<system>.redb` (code -> bincode `Concept`, bucket id ->
//! bincode `Vec<code>`) per system, and a shared `mapping_config.json`.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use fst::MapBuilder;
use redb::{Database, TableDefinition};
use serde::Deserialize;

use medterm_core::{Concept, MappingConfig, System, SystemDescriptor};

const CONCEPTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("concepts");
const BUCKETS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("normalized_buckets");

#[derive(Parser)]
#[command(about = "Build embedded SNOMED/LOINC/RxNorm index artifacts")]
struct Args {
    /// Directory containing `<system>.json` source files (e.g. `snomed.json`).
    /// Any of `snomed.json`, `loinc.json`, `rxnorm.json` present are built;
    /// missing ones are skipped with a warning.
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Build a single system from an explicit input file, instead of
    /// scanning `--source-dir`.
    #[arg(long, requires = "input")]
    system: Option<System>,

    /// Source JSON file for `--system`.
    #[arg(long, requires = "system")]
    input: Option<PathBuf>,

    /// Output directory for the built index (`*.fst`, `*.redb`,
    /// `mapping_config.json`).
    #[arg(long, default_value = "data/terminology")]
    out_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SourceConcept {
    code: String,
    display: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default)]
    normalized_forms: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating output dir {}", args.out_dir.display()))?;

    let mut built = Vec::new();

    if let (Some(system), Some(input)) = (args.system, &args.input) {
        build_system(system, input, &args.out_dir)?;
        built.push(system);
    } else if let Some(source_dir) = &args.source_dir {
        for system in System::ALL {
            let candidate = source_dir.join(format!("{}.json", system.slug()));
            if candidate.exists() {
                build_system(system, &candidate, &args.out_dir)?;
                built.push(system);
            } else {
                tracing::warn!(%system, path = %candidate.display(), "source file not found, skipping");
            }
        }
    } else {
        anyhow::bail!("either --source-dir or --system/--input must be given");
    }

    if built.is_empty() {
        anyhow::bail!("no systems were built; nothing to write to mapping_config.json");
    }

    write_mapping_config(&args.out_dir, &built)?;
    tracing::info!(systems = ?built, out_dir = %args.out_dir.display(), "index build complete");
    Ok(())
}

fn build_system(system: System, input: &Path, out_dir: &Path) -> Result<()> {
    tracing::info!(%system, input = %input.display(), "building index");

    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let reader = BufReader::new(file);
    let records: Vec<SourceConcept> = serde_json::from_reader(reader)
        .with_context(|| format!("parsing {} as a concept list", input.display()))?;

    if records.is_empty() {
        anyhow::bail!("{} contains no concept records", input.display());
    }

    // Collect every (normalized_text -> code) pair, deduplicating bucket
    // keys so repeated synonyms across concepts share one fst entry.
    let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut concepts: Vec<(String, Concept)> = Vec::with_capacity(records.len());

    for record in records {
        if record.code.is_empty() || record.normalized_forms.is_empty() {
            tracing::warn!(code = %record.code, "skipping concept with empty code or no normalized forms");
            continue;
        }
        for normalized in &record.normalized_forms {
            let codes = buckets.entry(normalized.clone()).or_default();
            if !codes.contains(&record.code) {
                codes.push(record.code.clone());
            }
        }
        let concept = Concept::new(record.code.clone(), system, record.display)
            .with_normalized_forms(record.normalized_forms);
        let concept = record
            .attributes
            .into_iter()
            .fold(concept, |c, (k, v)| c.with_attribute(k, v));
        concepts.push((record.code, concept));
    }

    let fst_path = out_dir.join(format!("{}.fst", system.slug()));
    let db_path = out_dir.join(format!("{}.redb", system.slug()));
    if db_path.exists() {
        std::fs::remove_file(&db_path)
            .with_context(|| format!("removing stale {}", db_path.display()))?;
    }

    // fst requires keys inserted in sorted order; `buckets` is a BTreeMap
    // so iteration is already sorted.
    let mut fst_builder = MapBuilder::memory();
    let mut bucket_codes: Vec<Vec<String>> = Vec::with_capacity(buckets.len());
    for (bucket_id, (normalized_text, codes)) in buckets.into_iter().enumerate() {
        fst_builder
            .insert(&normalized_text, bucket_id as u64)
            .with_context(|| format!("inserting fst key {normalized_text:?}"))?;
        bucket_codes.push(codes);
    }
    let fst_bytes = fst_builder.into_inner()?;
    File::create(&fst_path)
        .with_context(|| format!("creating {}", fst_path.display()))?
        .write_all(&fst_bytes)?;

    let db = Database::create(&db_path).with_context(|| format!("creating {}", db_path.display()))?;
    let write = db.begin_write()?;
    {
        let mut concepts_table = write.open_table(CONCEPTS_TABLE)?;
        for (code, concept) in &concepts {
            let bytes = bincode::serialize(concept)?;
            concepts_table.insert(code.as_str(), bytes.as_slice())?;
        }

        let mut buckets_table = write.open_table(BUCKETS_TABLE)?;
        for (bucket_id, codes) in bucket_codes.iter().enumerate() {
            let bytes = bincode::serialize(codes)?;
            buckets_table.insert(&(bucket_id as u64), bytes.as_slice())?;
        }
    }
    write.commit()?;

    tracing::info!(
        %system,
        concepts = concepts.len(),
        fst = %fst_path.display(),
        db = %db_path.display(),
        "wrote index artifacts"
    );
    Ok(())
}

fn write_mapping_config(out_dir: &Path, built: &[System]) -> Result<()> {
    let config = MappingConfig {
        systems: built
            .iter()
            .map(|system| SystemDescriptor {
                name: system.as_str().to_string(),
                display_uri: default_display_uri(*system).to_string(),
            })
            .collect(),
    };
    let path = out_dir.join("mapping_config.json");
    let content = serde_json::to_string_pretty(&config)?;
    std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn default_display_uri(system: System) -> &'static str {
    match system {
        System::Snomed => "http://snomed.info/sct",
        System::Loinc => "http://loinc.org",
        System::RxNorm => "http://www.nlm.nih.gov/research/umls/rxnorm",
    }
}
