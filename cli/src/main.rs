//! `medterm`: a command-line consumer that exercises the mapping engine
//! end-to-end — single-term mapping, batch mapping from a file, custom
//! rules management, and engine/system introspection. It does not
//! implement REST/HTTP framing; this is the local driver, not a server.

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medterm_core::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "medterm",
    about = "Map free-text medical terms to SNOMED CT, LOINC, and RxNorm codes",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML configuration file. Falls back to `Config::default()`
    /// plus `--data-dir`/`--rules-db` overrides when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `data_dir` (embedded vocabulary index directory).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override `rules_db` (custom rules store path).
    #[arg(long, global = true)]
    rules_db: Option<PathBuf>,

    /// Emit JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (repeatable); otherwise controlled by `RUST_LOG`.
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Map a single term to coded candidates.
    Map(commands::map::MapArgs),
    /// Map every term in a file (one per line, or a JSON array of strings),
    /// preserving input order in the output.
    Batch(commands::batch::BatchArgs),
    /// Manage custom mapping rules.
    Rules {
        #[command(subcommand)]
        command: commands::rules::RulesCommand,
    },
    /// Print configured systems and their concept counts.
    Info,
    /// Print coordinator throughput/cache statistics, optionally after
    /// warming up with a set of terms.
    Stats(commands::stats::StatsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Map(args) => commands::map::run(config, args, cli.json),
        Commands::Batch(args) => commands::batch::run(config, args, cli.json),
        Commands::Rules { command } => commands::rules::run(config, command, cli.json),
        Commands::Info => commands::info::run(config, cli.json),
        Commands::Stats(args) => commands::stats::run(config, args, cli.json),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "medterm=info,medterm_core=info",
        1 => "medterm=debug,medterm_core=debug",
        _ => "medterm=trace,medterm_core=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_toml(path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(rules_db) = &cli.rules_db {
        config.rules_db = rules_db.clone();
    }
    Ok(config)
}
