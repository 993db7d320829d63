//! Mapping Coordinator: orchestrates normalization, vocabulary
//! and rule lookups, context analysis, ranking, and caching for one term or
//! a batch. Stateless and reentrant per call; all mutable state lives in
//! the components it holds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::cache::{cache_key, context_fingerprint, CacheLayer};
use crate::candidate::{
    Candidate, ContextOut, MappingResult, RuleApplication, Source, TermRequest,
};
use crate::config::Config;
use crate::context::{ContextAnalyzer, ModifierType};
use crate::error::{MapperError, MapperResult};
use crate::executor::{CancellationToken, ParallelExecutor, TaskOutcome};
use crate::fuzzy::FuzzyMatcher;
use crate::normalizer::Normalizer;
use crate::query_optimizer::QueryOptimizer;
use crate::rules::CustomRulesEngine;
use crate::system::System;
use crate::vocabulary::VocabularyRegistry;

/// Soft per-term deadline.
const DEFAULT_TERM_DEADLINE_MS: u128 = 1000;

#[derive(Default)]
pub struct Stats {
    pub terms_processed: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub total_processing_time_ms: AtomicU64,
}

/// Snapshot of the optimizer's throughput/cache counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSnapshot {
    pub terms_processed: u64,
    pub cache_hit_rate: f64,
    pub mean_processing_time_ms: f64,
    pub degraded_systems: Vec<String>,
}

enum WorkItem<'a> {
    FuzzySystem(System),
    Rules(&'a str, &'a ContextOut),
}

enum WorkOutput {
    FuzzySystem(System, Vec<Candidate>),
    Rules(Vec<crate::rules::RuleMatch>),
}

pub struct MappingCoordinator {
    normalizer: Normalizer,
    vocabulary: VocabularyRegistry,
    rules: CustomRulesEngine,
    cache: CacheLayer,
    #[allow(dead_code)]
    query_optimizer: QueryOptimizer,
    executor: ParallelExecutor,
    context_analyzer: ContextAnalyzer,
    config: Config,
    stats: Stats,
}

impl MappingCoordinator {
    pub fn new(
        config: Config,
        normalizer: Normalizer,
        vocabulary: VocabularyRegistry,
        rules: CustomRulesEngine,
    ) -> Self {
        let cache = CacheLayer::open(&config.cache);
        let executor = ParallelExecutor::new(config.resolved_worker_count());
        Self {
            normalizer,
            vocabulary,
            rules,
            cache,
            query_optimizer: QueryOptimizer::default(),
            executor,
            context_analyzer: ContextAnalyzer::new(),
            config,
            stats: Stats::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rules(&self) -> &CustomRulesEngine {
        &self.rules
    }

    pub fn vocabulary(&self) -> &VocabularyRegistry {
        &self.vocabulary
    }

    /// `map_term`.
    pub fn map_term(&self, request: TermRequest) -> MapperResult<MappingResult> {
        let started = Instant::now();

        if request.text.trim().is_empty() {
            return Ok(empty_result(&request.text));
        }
        let threshold = request.threshold.clamp(0.0, 1.0);

        let normalized = self.normalizer.normalize(&request.text);
        if normalized.is_empty() {
            return Ok(empty_result(&request.text));
        }

        let available = self.vocabulary.available_systems();
        let systems = request.systems.resolve(&available);
        let algorithms = request.algorithms.resolve();

        // Context analysis depends only on surrounding text, never on
        // candidates, so it is safe to run ahead of the cache probe — its
        // fingerprint is part of the cache key.
        let context_out = request
            .context
            .as_ref()
            .map(|ctx_in| self.context_analyzer.analyze(ctx_in, (0, request.text.len())));

        let modifier_types: Vec<ModifierType> = context_out
            .as_ref()
            .map(|c| c.modifiers.iter().map(|m| m.modifier_type).collect())
            .unwrap_or_default();
        let fingerprint = context_out
            .as_ref()
            .map(|c| context_fingerprint(c.detected_domain, &modifier_types))
            .unwrap_or(0);

        let rules_version = self.rules.rules_version();
        let key = cache_key(
            &normalized.canonical,
            &systems,
            threshold,
            &algorithms,
            fingerprint,
            rules_version,
        );

        if let Some(cached) = self.cache.get(&key) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let cancel = CancellationToken::new();
        let mut work: Vec<WorkItem> = systems.iter().map(|s| WorkItem::FuzzySystem(*s)).collect();
        let default_context = ContextOut {
            detected_domain: crate::system::Domain::General,
            modifiers: Vec::new(),
            is_negated: false,
            negation_confidence: 0.0,
            negation_cue: None,
        };
        let context_ref = context_out.as_ref().unwrap_or(&default_context);
        work.push(WorkItem::Rules(&normalized.canonical, context_ref));

        let outcomes = self.executor.run(work, &cancel, |item| {
            self.run_work_item(item, &normalized.canonical, &normalized.variants, &algorithms, threshold, request.max_results_per_system)
        });

        let mut per_system: HashMap<System, Vec<Candidate>> = HashMap::new();
        let mut rule_matches = Vec::new();
        let mut degraded = Vec::new();
        let mut timed_out = false;

        for outcome in outcomes {
            match outcome {
                TaskOutcome::Success(WorkOutput::FuzzySystem(system, candidates)) => {
                    per_system.insert(system, candidates);
                }
                TaskOutcome::Success(WorkOutput::Rules(matches)) => {
                    rule_matches = matches;
                }
                TaskOutcome::Failed(err) => {
                    tracing::warn!(error = %err, "per-system task failed, degrading that contribution");
                }
                TaskOutcome::Cancelled => {
                    timed_out = true;
                }
            }
        }
        if started.elapsed().as_millis() > self.config.term_deadline_ms.unwrap_or(DEFAULT_TERM_DEADLINE_MS) {
            timed_out = true;
        }
        for system in &systems {
            per_system.entry(*system).or_default();
        }
        for system in self.vocabulary.degraded_systems() {
            degraded.push(system.to_string());
        }

        let base_candidate_count: usize = per_system.values().map(|v| v.len()).sum();

        let mut applied_rules: Vec<RuleApplication> = Vec::new();
        for system in &systems {
            let base = per_system.remove(system).unwrap_or_default();
            let system_rule_matches: Vec<crate::rules::RuleMatch> = rule_matches
                .iter()
                .filter(|m| m.rule.target.system == *system)
                .cloned()
                .collect();
            let (mut merged, applications) = self.rules.apply(&system_rule_matches, base);
            applied_rules.extend(applications);

            if let Some(context) = &context_out {
                for candidate in &mut merged {
                    apply_context_adjustment(candidate, context, *system);
                }
            }

            merged.sort_by(|a, b| a.cmp_for_ranking(b));
            merged.truncate(request.max_results_per_system);
            per_system.insert(*system, merged);
        }

        let final_candidate_count: usize = per_system.values().map(|v| v.len()).sum();
        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.stats
            .total_processing_time_ms
            .fetch_add(processing_time_ms.round() as u64, Ordering::Relaxed);
        self.stats.terms_processed.fetch_add(1, Ordering::Relaxed);

        let mut processing_metadata = HashMap::new();
        processing_metadata.insert("cache_status".to_string(), "miss".to_string());
        processing_metadata.insert("rules_applied_count".to_string(), applied_rules.len().to_string());
        processing_metadata.insert("base_candidate_count".to_string(), base_candidate_count.to_string());
        processing_metadata.insert("final_candidate_count".to_string(), final_candidate_count.to_string());
        processing_metadata.insert("timed_out".to_string(), timed_out.to_string());
        if !degraded.is_empty() {
            processing_metadata.insert("degraded_systems".to_string(), degraded.join(","));
        }

        let result = MappingResult {
            term: request.text.clone(),
            total_matches: final_candidate_count,
            per_system,
            processing_time_ms,
            context: context_out,
            applied_rules,
            processing_metadata,
        };

        self.cache.put(&key, &result);
        Ok(result)
    }

    fn run_work_item(
        &self,
        item: WorkItem,
        canonical: &str,
        variants: &[String],
        algorithms: &[crate::fuzzy::FuzzyAlgorithm],
        threshold: f32,
        max_results: usize,
    ) -> Result<WorkOutput, MapperError> {
        match item {
            WorkItem::FuzzySystem(system) => {
                let store = self.vocabulary.get(system).ok_or_else(|| {
                    MapperError::vocabulary_unavailable(
                        format!("system {system} is not loaded"),
                        anyhow::anyhow!("vocabulary store missing"),
                    )
                })?;

                let mut candidates: HashMap<String, Candidate> = HashMap::new();
                // The normalized index gives an O(1) exact hit on the canonical
                // form, and on any generated variant (abbreviation expansion,
                // reverse abbreviation, synonym, punctuation-less form). A hit
                // on the canonical form ranks as Exact; a hit on any other
                // variant still skips fuzzy scoring but ranks one tier lower.
                for (i, variant) in variants.iter().enumerate() {
                    let hits = store.lookup_normalized(variant).unwrap_or_default();
                    if hits.is_empty() {
                        continue;
                    }
                    let match_type = if i == 0 {
                        crate::candidate::MatchType::Exact
                    } else {
                        crate::candidate::MatchType::Normalized
                    };
                    for concept in hits {
                        let candidate = Candidate::new(
                            concept.code.clone(),
                            system,
                            concept.display.clone(),
                            1.0,
                            match_type,
                            Source::Vocabulary,
                            format!("normalized index hit on \"{variant}\""),
                        );
                        candidates
                            .entry(concept.code)
                            .and_modify(|existing| existing.merge_duplicate(candidate.clone()))
                            .or_insert(candidate);
                    }
                }

                let matcher = FuzzyMatcher::new(store.vectorizer());
                for fuzzy_candidate in matcher.search(
                    system,
                    variants,
                    store.fuzzy_terms(),
                    algorithms,
                    threshold,
                    max_results * 2,
                ) {
                    candidates
                        .entry(fuzzy_candidate.code.clone())
                        .and_modify(|existing| existing.merge_duplicate(fuzzy_candidate.clone()))
                        .or_insert(fuzzy_candidate);
                }

                let mut candidates: Vec<Candidate> = candidates.into_values().collect();
                candidates.sort_by(|a, b| a.cmp_for_ranking(b));
                candidates.truncate(max_results * 2);

                let _ = canonical;
                Ok(WorkOutput::FuzzySystem(system, candidates))
            }
            WorkItem::Rules(term, context) => {
                let matches = self.rules.find_matches(term, context)?;
                Ok(WorkOutput::Rules(matches))
            }
        }
    }

    /// `map_terms_batch`: validates, dispatches through the
    /// executor, and aggregates summary statistics.
    pub fn map_terms_batch(&self, requests: Vec<TermRequest>) -> BatchResult {
        let started = Instant::now();
        let cancel = CancellationToken::new();
        let outcomes = self.executor.run(requests, &cancel, |req| self.map_term(req));

        let mut results = Vec::with_capacity(outcomes.len());
        let mut success_count = 0;
        let mut failure_count = 0;
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Success(result) => {
                    success_count += 1;
                    results.push(Ok(result));
                }
                TaskOutcome::Failed(err) => {
                    failure_count += 1;
                    results.push(Err(err));
                }
                TaskOutcome::Cancelled => {
                    failure_count += 1;
                    results.push(Err(MapperError::timeout("batch cancelled before this term ran")));
                }
            }
        }

        BatchResult {
            results,
            success_count,
            failure_count,
            total_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        let terms = self.stats.terms_processed.load(Ordering::Relaxed);
        let hits = self.stats.cache_hits.load(Ordering::Relaxed);
        let misses = self.stats.cache_misses.load(Ordering::Relaxed);
        let total_time = self.stats.total_processing_time_ms.load(Ordering::Relaxed);
        let total_probes = hits + misses;

        StatsSnapshot {
            terms_processed: terms,
            cache_hit_rate: if total_probes == 0 {
                0.0
            } else {
                hits as f64 / total_probes as f64
            },
            mean_processing_time_ms: if terms == 0 {
                0.0
            } else {
                total_time as f64 / terms as f64
            },
            degraded_systems: self
                .vocabulary
                .degraded_systems()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

pub struct BatchResult {
    pub results: Vec<Result<MappingResult, MapperError>>,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_time_ms: f64,
}

fn empty_result(term: &str) -> MappingResult {
    MappingResult {
        term: term.to_string(),
        per_system: HashMap::new(),
        total_matches: 0,
        processing_time_ms: 0.0,
        context: None,
        applied_rules: Vec::new(),
        processing_metadata: HashMap::new(),
    }
}

/// Context confidence adjustment policy, applied after base
/// mapping and rule merge, before the final re-sort.
fn apply_context_adjustment(candidate: &mut Candidate, context: &ContextOut, system: System) {
    if context.is_negated {
        candidate.confidence *= 0.3;
    }
    let has_uncertainty = context
        .modifiers
        .iter()
        .any(|m| m.modifier_type == ModifierType::Uncertainty);
    if has_uncertainty {
        candidate.confidence *= 0.85;
    }
    let has_family_history = context
        .modifiers
        .iter()
        .any(|m| m.modifier_type == ModifierType::FamilyHistory);
    if has_family_history {
        candidate.confidence *= 0.7;
    }
    if context.detected_domain.aligns_with_system(system) {
        candidate.confidence = (candidate.confidence * 1.1).min(1.0);
    }
    candidate.confidence = candidate.confidence.clamp(0.0, 1.0);
}

#[cfg(test)]
mod tests {
    use super::apply_context_adjustment;
    use crate::candidate::{Candidate, ContextOut, MatchType, Source};
    use crate::context::ModifierType;
    use crate::system::{Domain, System};

    fn candidate() -> Candidate {
        Candidate::new("1", System::Snomed, "Asthma", 0.9, MatchType::Exact, Source::Vocabulary, "")
    }

    #[test]
    fn negation_reduces_but_never_removes_confidence() {
        let mut c = candidate();
        let ctx = ContextOut {
            detected_domain: Domain::General,
            modifiers: Vec::new(),
            is_negated: true,
            negation_confidence: 0.9,
            negation_cue: Some("no".to_string()),
        };
        apply_context_adjustment(&mut c, &ctx, System::Snomed);
        assert!(c.confidence > 0.0);
        assert!((c.confidence - 0.27).abs() < 1e-6);
    }

    #[test]
    fn domain_alignment_boosts_capped_at_one() {
        let mut c = Candidate::new("1", System::Loinc, "Glucose", 0.95, MatchType::Exact, Source::Vocabulary, "");
        let ctx = ContextOut {
            detected_domain: Domain::Laboratory,
            modifiers: Vec::new(),
            is_negated: false,
            negation_confidence: 0.0,
            negation_cue: None,
        };
        apply_context_adjustment(&mut c, &ctx, System::Loinc);
        assert!(c.confidence <= 1.0);
    }

    #[test]
    fn family_history_modifier_applies_factor() {
        let mut c = candidate();
        let ctx = ContextOut {
            detected_domain: Domain::General,
            modifiers: vec![crate::candidate::Modifier {
                modifier_type: ModifierType::FamilyHistory,
                text: "mother".to_string(),
                span: (0, 6),
                confidence: 0.8,
                scope_span: (0, 10),
            }],
            is_negated: false,
            negation_confidence: 0.0,
            negation_cue: None,
        };
        apply_context_adjustment(&mut c, &ctx, System::Snomed);
        assert!((c.confidence - 0.63).abs() < 1e-6);
    }
}
