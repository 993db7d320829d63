use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use medterm_core::{build_coordinator, Config, TermRequest};

use super::{parse_algorithms, parse_systems};
use crate::output::print_mapping_result;

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// File with one term per line, or a JSON array of strings.
    #[arg(long)]
    input: PathBuf,

    #[arg(long)]
    systems: Option<String>,

    #[arg(long, default_value_t = 0.7)]
    threshold: f32,

    #[arg(long)]
    algorithms: Option<String>,

    #[arg(long, default_value_t = 10)]
    max_results: usize,
}

#[derive(Serialize)]
struct BatchEntry<'a> {
    term: &'a str,
    error: Option<String>,
}

pub fn run(config: Config, args: BatchArgs, json: bool) -> Result<()> {
    let terms = read_terms(&args.input)?;
    if terms.is_empty() {
        anyhow::bail!("{} contains no terms", args.input.display());
    }

    let systems = parse_systems(&args.systems)?;
    let algorithms = parse_algorithms(&args.algorithms)?;

    let requests: Vec<TermRequest> = terms
        .iter()
        .map(|text| TermRequest {
            text: text.clone(),
            systems: systems.clone(),
            threshold: args.threshold,
            algorithms: algorithms.clone(),
            max_results_per_system: args.max_results,
            context: None,
        })
        .collect();

    let coordinator = build_coordinator(config).map_err(|e| anyhow::anyhow!("{e}"))?;
    let batch = coordinator.map_terms_batch(requests);

    if json {
        let entries: Vec<_> = batch
            .results
            .iter()
            .zip(&terms)
            .map(|(r, term)| match r {
                Ok(result) => serde_json::to_value(result).unwrap_or_default(),
                Err(e) => serde_json::to_value(BatchEntry {
                    term,
                    error: Some(e.to_string()),
                })
                .unwrap_or_default(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (term, result) in terms.iter().zip(&batch.results) {
            match result {
                Ok(mapping) => print_mapping_result(mapping, false)?,
                Err(e) => println!("term: {term}\n  error: {e}"),
            }
            println!();
        }
        println!(
            "batch summary: {} succeeded, {} failed, {:.2}ms total",
            batch.success_count, batch.failure_count, batch.total_time_ms
        );
    }
    Ok(())
}

fn read_terms(path: &PathBuf) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        let terms: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("parsing {} as a JSON array of strings", path.display()))?;
        Ok(terms)
    } else {
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}
