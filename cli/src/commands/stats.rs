use anyhow::Result;
use clap::Args;

use medterm_core::{build_coordinator, Config, TermRequest};

use crate::output::print_stats;

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Run these terms through the coordinator first, so the printed
    /// snapshot reflects at least one pass (cache hit rate etc.).
    #[arg(long)]
    warm_up: Vec<String>,
}

pub fn run(config: Config, args: StatsArgs, json: bool) -> Result<()> {
    let coordinator = build_coordinator(config).map_err(|e| anyhow::anyhow!("{e}"))?;

    for term in args.warm_up {
        let _ = coordinator.map_term(TermRequest::new(term));
    }

    print_stats(&coordinator.stats_snapshot(), json)
}
