//! Mapping candidates and results.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::system::System;

/// How a candidate was produced. Drives the tie-break source rank in
/// `Candidate::cmp_for_ranking` (custom_rule > exact > normalized > fuzzy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    Exact,
    Normalized,
    Abbreviation,
    Synonym,
    FuzzyRatio,
    FuzzyTokenSet,
    Phonetic,
    Cosine,
    CustomRule,
}

impl MatchType {
    /// Source rank used for ranking ties, highest first.
    fn rank(&self) -> u8 {
        match self {
            MatchType::CustomRule => 0,
            MatchType::Exact => 1,
            MatchType::Normalized => 2,
            MatchType::Abbreviation | MatchType::Synonym => 3,
            MatchType::FuzzyRatio
            | MatchType::FuzzyTokenSet
            | MatchType::Phonetic
            | MatchType::Cosine => 4,
        }
    }
}

/// Where a candidate's data came from, independent of how it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Vocabulary,
    CustomRule,
    ExternalApi,
}

/// A single scored mapping from the input term to a coded concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub system: System,
    pub display: String,
    pub confidence: f32,
    pub match_type: MatchType,
    /// All provenances contributing to this candidate; a rule/vocabulary
    /// collision on the same `(system, code)` collapses into one entry with
    /// both sources recorded here.
    pub sources: Vec<Source>,
    pub explanation: String,
    /// Ids of custom rules that produced or touched this candidate.
    pub applied_rule_ids: Vec<String>,
}

impl Candidate {
    pub fn new(
        code: impl Into<String>,
        system: System,
        display: impl Into<String>,
        confidence: f32,
        match_type: MatchType,
        source: Source,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            system,
            display: display.into(),
            confidence: confidence.clamp(0.0, 1.0),
            match_type,
            sources: vec![source],
            explanation: explanation.into(),
            applied_rule_ids: Vec::new(),
        }
    }

    pub fn key(&self) -> (System, &str) {
        (self.system, self.code.as_str())
    }

    /// Merge another candidate representing the same `(system, code)`:
    /// keep the higher confidence, union the provenances and rule ids, and
    /// prefer the higher-ranked match type.
    pub fn merge_duplicate(&mut self, other: Candidate) {
        debug_assert_eq!(self.key(), (other.system, other.code.as_str()));
        if other.confidence > self.confidence {
            self.confidence = other.confidence;
        }
        if other.match_type.rank() < self.match_type.rank() {
            self.match_type = other.match_type;
            self.explanation = other.explanation;
        }
        for s in other.sources {
            if !self.sources.contains(&s) {
                self.sources.push(s);
            }
        }
        for id in other.applied_rule_ids {
            if !self.applied_rule_ids.contains(&id) {
                self.applied_rule_ids.push(id);
            }
        }
    }

    /// Total order used to sort a per-system candidate list: descending confidence, then source rank, then shorter
    /// display, then lexicographic code.
    pub fn cmp_for_ranking(&self, other: &Candidate) -> Ordering {
        other
            .confidence
            .partial_cmp(&self.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.match_type.rank().cmp(&other.match_type.rank()))
            .then_with(|| self.display.len().cmp(&other.display.len()))
            .then_with(|| self.code.cmp(&other.code))
    }
}

/// A modifier span detected by the context analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modifier {
    #[serde(rename = "type")]
    pub modifier_type: crate::context::ModifierType,
    pub text: String,
    pub span: (usize, usize),
    pub confidence: f32,
    pub scope_span: (usize, usize),
}

/// Detected clinical context for the target term span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextOut {
    pub detected_domain: crate::system::Domain,
    pub modifiers: Vec<Modifier>,
    pub is_negated: bool,
    pub negation_confidence: f32,
    pub negation_cue: Option<String>,
}

/// `systems: set<System> | ALL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemSelector {
    All,
    Only(Vec<System>),
}

impl SystemSelector {
    pub fn resolve(&self, available: &[System]) -> Vec<System> {
        match self {
            SystemSelector::All => available.to_vec(),
            SystemSelector::Only(systems) => systems
                .iter()
                .filter(|s| available.contains(s))
                .copied()
                .collect(),
        }
    }
}

/// `algorithms: set<FuzzyAlg> | ALL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlgorithmSelector {
    All,
    Only(Vec<crate::fuzzy::FuzzyAlgorithm>),
}

impl AlgorithmSelector {
    pub fn resolve(&self) -> Vec<crate::fuzzy::FuzzyAlgorithm> {
        match self {
            AlgorithmSelector::All => crate::fuzzy::FuzzyAlgorithm::all().to_vec(),
            AlgorithmSelector::Only(algos) => algos.clone(),
        }
    }
}

/// A single term to map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermRequest {
    pub text: String,
    #[serde(default = "default_systems")]
    pub systems: SystemSelector,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_algorithms")]
    pub algorithms: AlgorithmSelector,
    #[serde(default = "default_max_results")]
    pub max_results_per_system: usize,
    #[serde(default)]
    pub context: Option<ContextInput>,
}

fn default_systems() -> SystemSelector {
    SystemSelector::All
}

fn default_threshold() -> f32 {
    0.7
}

fn default_algorithms() -> AlgorithmSelector {
    AlgorithmSelector::All
}

fn default_max_results() -> usize {
    10
}

impl TermRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            systems: default_systems(),
            threshold: default_threshold(),
            algorithms: default_algorithms(),
            max_results_per_system: default_max_results(),
            context: None,
        }
    }
}

/// Caller-supplied context for a single mapping request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextInput {
    pub surrounding_text: Option<String>,
    pub domain_hint: Option<crate::system::Domain>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Record of a custom rule firing against a given term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleApplication {
    pub rule_id: String,
    pub rule_type: crate::rules::RuleType,
    pub match_score: f32,
}

/// The full result of mapping one term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingResult {
    pub term: String,
    pub per_system: HashMap<System, Vec<Candidate>>,
    pub total_matches: usize,
    pub processing_time_ms: f64,
    pub context: Option<ContextOut>,
    pub applied_rules: Vec<RuleApplication>,
    pub processing_metadata: HashMap<String, String>,
}

impl MappingResult {
    /// Convenience accessor for the single best candidate in a system
    ///.
    pub fn top_candidate(&self, system: System) -> Option<&Candidate> {
        self.per_system.get(&system).and_then(|v| v.first())
    }
}
