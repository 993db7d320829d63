use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};

use medterm_core::{
    BulkMappingImport, Config, CustomRule, CustomRulesEngine, Priority, RuleConditions, RuleTarget,
    RuleType, System,
};

use crate::output::print_rules;

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// Add a new rule.
    Add(AddArgs),
    /// List rules.
    List(ListArgs),
    /// Deactivate a rule by id (soft delete; keeps history for audit).
    Deactivate(DeactivateArgs),
    /// Export all rules as a JSON document.
    Export(ExportArgs),
    /// Import rules from a previously exported JSON document.
    Import(ImportArgs),
    /// Import a bulk custom-mapping/synonym JSON document.
    ImportBulk(ImportBulkArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Term this rule matches against (meaning depends on `--rule-type`).
    #[arg(long)]
    source_term: String,

    #[arg(long, value_enum)]
    rule_type: RuleTypeArg,

    #[arg(long, value_enum, default_value = "medium")]
    priority: PriorityArg,

    #[arg(long)]
    system: System,

    #[arg(long)]
    code: String,

    #[arg(long)]
    display: String,

    /// Regex pattern, required for `pattern-match` rules.
    #[arg(long)]
    pattern: Option<String>,

    /// Clinical domain, required for `domain-specific` rules.
    #[arg(long)]
    domain: Option<String>,

    /// `key=value` context requirement, repeatable, required for
    /// `context-dependent` rules (e.g. `--required-context domain=CARDIOLOGY`).
    #[arg(long = "required-context", value_parser = parse_key_value)]
    required_context: Vec<(String, String)>,

    #[arg(long, default_value = "cli")]
    created_by: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    active_only: bool,
}

#[derive(Args, Debug)]
pub struct DeactivateArgs {
    rule_id: String,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Write to this file instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ImportBulkArgs {
    file: PathBuf,

    #[arg(long, default_value = "cli")]
    created_by: String,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum RuleTypeArg {
    ExactMatch,
    PatternMatch,
    ContextDependent,
    DomainSpecific,
    ManualOverride,
}

impl From<RuleTypeArg> for RuleType {
    fn from(v: RuleTypeArg) -> Self {
        match v {
            RuleTypeArg::ExactMatch => RuleType::ExactMatch,
            RuleTypeArg::PatternMatch => RuleType::PatternMatch,
            RuleTypeArg::ContextDependent => RuleType::ContextDependent,
            RuleTypeArg::DomainSpecific => RuleType::DomainSpecific,
            RuleTypeArg::ManualOverride => RuleType::ManualOverride,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PriorityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<PriorityArg> for Priority {
    fn from(v: PriorityArg) -> Self {
        match v {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::High => Priority::High,
            PriorityArg::Critical => Priority::Critical,
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

pub fn run(config: Config, command: RulesCommand, json: bool) -> Result<()> {
    let engine = CustomRulesEngine::open(&config.rules_db).map_err(|e| anyhow::anyhow!("{e}"))?;

    match command {
        RulesCommand::Add(args) => add(&engine, args),
        RulesCommand::List(args) => {
            let rules = engine.list(args.active_only).map_err(|e| anyhow::anyhow!("{e}"))?;
            print_rules(&rules, json)
        }
        RulesCommand::Deactivate(args) => {
            engine.deactivate(&args.rule_id).map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("deactivated {}", args.rule_id);
            Ok(())
        }
        RulesCommand::Export(args) => export(&engine, args),
        RulesCommand::Import(args) => import(&engine, args),
        RulesCommand::ImportBulk(args) => import_bulk(&engine, args),
    }
}

fn add(engine: &CustomRulesEngine, args: AddArgs) -> Result<()> {
    let now = Utc::now();
    let rule = CustomRule {
        rule_id: uuid::Uuid::new_v4().to_string(),
        rule_type: args.rule_type.into(),
        priority: args.priority.into(),
        source_term: args.source_term,
        target: RuleTarget {
            code: args.code,
            system: args.system,
            display: args.display,
        },
        conditions: RuleConditions {
            pattern: args.pattern,
            required_context: args.required_context.into_iter().collect(),
            domain: args.domain,
        },
        metadata: Default::default(),
        created_at: now,
        updated_at: now,
        created_by: args.created_by,
        is_active: true,
    };
    let rule_id = rule.rule_id.clone();
    engine.add(rule).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("added rule {rule_id}");
    Ok(())
}

fn export(engine: &CustomRulesEngine, args: ExportArgs) -> Result<()> {
    let json = engine.export_json().map_err(|e| anyhow::anyhow!("{e}"))?;
    match args.out {
        Some(path) => {
            std::fs::write(&path, &json).with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn import(engine: &CustomRulesEngine, args: ImportArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let count = engine.import_json(&content).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("imported {count} rule(s)");
    Ok(())
}

fn import_bulk(engine: &CustomRulesEngine, args: ImportBulkArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let import: BulkMappingImport = serde_json::from_str(&content)
        .with_context(|| format!("parsing {} as a bulk mapping import", args.file.display()))?;
    let count = engine
        .import_bulk_mappings(import, &args.created_by)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("imported {count} rule(s) from bulk mappings/synonyms");
    Ok(())
}
