use anyhow::Result;
use clap::Args;

use medterm_core::{build_coordinator, Config, ContextInput, TermRequest};

use super::{parse_algorithms, parse_systems};
use crate::output::print_mapping_result;

#[derive(Args, Debug)]
pub struct MapArgs {
    /// The term to map, e.g. "htn" or "shortness of breath".
    text: String,

    /// Comma-separated systems to search (snomed,loinc,rxnorm); default all.
    #[arg(long)]
    systems: Option<String>,

    /// Minimum confidence to keep a candidate.
    #[arg(long, default_value_t = 0.7)]
    threshold: f32,

    /// Comma-separated fuzzy algorithms to run; default all.
    #[arg(long)]
    algorithms: Option<String>,

    /// Maximum candidates returned per system.
    #[arg(long, default_value_t = 10)]
    max_results: usize,

    /// Free-text surrounding the term, analyzed for negation/uncertainty/
    /// domain cues.
    #[arg(long)]
    context: Option<String>,

    /// Clinical domain hint (e.g. CARDIOLOGY) to bias scope-sensitive rules.
    #[arg(long)]
    domain_hint: Option<String>,
}

pub fn run(config: Config, args: MapArgs, json: bool) -> Result<()> {
    let coordinator = build_coordinator(config).map_err(|e| anyhow::anyhow!("{e}"))?;

    let context = if args.context.is_some() || args.domain_hint.is_some() {
        let domain_hint = args
            .domain_hint
            .as_deref()
            .map(|s| s.parse().map_err(|bad| anyhow::anyhow!("unrecognized domain '{bad}'")))
            .transpose()?;
        Some(ContextInput {
            surrounding_text: args.context.clone(),
            domain_hint,
            metadata: Default::default(),
        })
    } else {
        None
    };

    let request = TermRequest {
        text: args.text,
        systems: parse_systems(&args.systems)?,
        threshold: args.threshold,
        algorithms: parse_algorithms(&args.algorithms)?,
        max_results_per_system: args.max_results,
        context,
    };

    let result = coordinator.map_term(request).map_err(|e| anyhow::anyhow!("{e}"))?;
    print_mapping_result(&result, json)
}
