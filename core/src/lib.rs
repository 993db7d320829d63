//! Mapping engine that codes free-text medical terms against SNOMED CT,
//! LOINC, and RxNorm (see `SPEC_FULL.md` at the workspace root).
//!
//! The public surface is the Mapping Coordinator (`map_term`,
//! `map_terms_batch`) plus the building blocks callers assemble it from:
//! the vocabulary store, normalizer, fuzzy matcher, context analyzer,
//! custom rules engine, cache layer, and configuration.

pub mod cache;
pub mod candidate;
pub mod concept;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod fuzzy;
pub mod normalizer;
pub mod phonetic;
pub mod query_optimizer;
pub mod rules;
pub mod system;
pub mod tfidf;
pub mod vocabulary;

pub use candidate::{
    AlgorithmSelector, Candidate, ContextInput, ContextOut, MappingResult, MatchType, Modifier,
    RuleApplication, Source, SystemSelector, TermRequest,
};
pub use concept::Concept;
pub use config::Config;
pub use context::{ContextAnalyzer, ModifierType};
pub use coordinator::{BatchResult, MappingCoordinator, StatsSnapshot};
pub use error::{MapperError, MapperResult};
pub use fuzzy::{FuzzyAlgorithm, FuzzyMatcher};
pub use normalizer::{Normalized, Normalizer};
pub use rules::{
    BulkMapping, BulkMappingImport, BulkSynonymSet, CustomRule, CustomRulesEngine, Priority,
    RuleConditions, RuleMatch, RuleTarget, RuleType,
};
pub use system::{Domain, System};
pub use vocabulary::{MappingConfig, SystemDescriptor, VocabularyRegistry, VocabularyStore};

/// Build a ready-to-use coordinator from a `Config`: opens the vocabulary
/// registry, the rules store, and wires up the cache and executor.
///
/// Vocabulary open failures are non-fatal: a degraded system
/// contributes zero candidates rather than preventing startup.
pub fn build_coordinator(config: Config) -> MapperResult<MappingCoordinator> {
    let normalizer = Normalizer::default();
    let vocabulary = VocabularyRegistry::open_all(&config.data_dir);
    let rules = CustomRulesEngine::open(&config.rules_db)?;
    Ok(MappingCoordinator::new(config, normalizer, vocabulary, rules))
}
