//! Custom Rules Engine: a persistent, ACID-backed store of
//! term-mapping overrides, backed by `redb` the same way the vocabulary
//! store's concept table is.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, TableDefinition};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::candidate::{Candidate, MatchType, Source};
use crate::error::{MapperError, MapperResult};
use crate::system::System;

const RULES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("rules");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleType {
    ExactMatch,
    PatternMatch,
    ContextDependent,
    DomainSpecific,
    ManualOverride,
}

impl RuleType {
    /// Base match score before any context or rule-merge adjustment.
    fn match_score(&self) -> f32 {
        match self {
            RuleType::ExactMatch | RuleType::ManualOverride => 1.0,
            RuleType::ContextDependent => 0.9,
            RuleType::PatternMatch => 0.8,
            RuleType::DomainSpecific => 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTarget {
    pub code: String,
    pub system: System,
    pub display: String,
}

/// Rule-type-specific matching conditions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConditions {
    pub pattern: Option<String>,
    pub required_context: HashMap<String, String>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRule {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub priority: Priority,
    pub source_term: String,
    pub target: RuleTarget,
    pub conditions: RuleConditions,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub is_active: bool,
}

impl CustomRule {
    /// Validation on write: non-empty identifying fields, regex
    /// compiles for PATTERN_MATCH, required context keys present for
    /// CONTEXT_DEPENDENT.
    fn validate(&self) -> MapperResult<()> {
        if self.rule_id.trim().is_empty() {
            return Err(MapperError::rule_validation("rule_id must not be empty"));
        }
        if self.source_term.trim().is_empty() {
            return Err(MapperError::rule_validation("source_term must not be empty"));
        }
        if self.target.code.trim().is_empty() || self.target.display.trim().is_empty() {
            return Err(MapperError::rule_validation("target.code/display must not be empty"));
        }
        match self.rule_type {
            RuleType::PatternMatch => {
                let pattern = self.conditions.pattern.as_deref().unwrap_or("");
                if pattern.is_empty() {
                    return Err(MapperError::rule_validation(
                        "PATTERN_MATCH rule requires conditions.pattern",
                    ));
                }
                Regex::new(pattern).map_err(|e| {
                    MapperError::rule_validation(format!("conditions.pattern does not compile: {e}"))
                })?;
            }
            RuleType::ContextDependent => {
                if self.conditions.required_context.is_empty() {
                    return Err(MapperError::rule_validation(
                        "CONTEXT_DEPENDENT rule requires conditions.required_context",
                    ));
                }
            }
            RuleType::DomainSpecific => {
                if self.conditions.domain.is_none() {
                    return Err(MapperError::rule_validation(
                        "DOMAIN_SPECIFIC rule requires conditions.domain",
                    ));
                }
            }
            RuleType::ExactMatch | RuleType::ManualOverride => {}
        }
        Ok(())
    }
}

/// A rule that matched a term, with the score it produced.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub rule: CustomRule,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RulesExport {
    rules: Vec<CustomRule>,
}

/// Bulk custom-mapping import shape: a `mappings` array
/// (becomes EXACT_MATCH/MANUAL_OVERRIDE rules) and a `synonyms` array
/// (folded into EXACT_MATCH rules, one per synonym).
#[derive(Debug, Deserialize)]
pub struct BulkMappingImport {
    #[serde(default)]
    pub mappings: Vec<BulkMapping>,
    #[serde(default)]
    pub synonyms: Vec<BulkSynonymSet>,
}

#[derive(Debug, Deserialize)]
pub struct BulkMapping {
    pub term: String,
    pub system: System,
    pub code: String,
    pub display: String,
    #[serde(default)]
    pub override_existing: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkSynonymSet {
    pub term: String,
    pub synonyms: Vec<String>,
    pub system: System,
    pub code: String,
    pub display: String,
}

pub struct CustomRulesEngine {
    db: Arc<redb::Database>,
    /// Bumped on every write; part of the cache key so rule
    /// changes atomically invalidate affected cache entries.
    rules_version: AtomicU64,
    write_lock: RwLock<()>,
}

impl CustomRulesEngine {
    pub fn open(path: &std::path::Path) -> MapperResult<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                MapperError::rule_store("failed to create rules store directory", e.into())
            })?;
        }
        let db = redb::Database::create(path)
            .map_err(|e| MapperError::rule_store("failed to open rules store", e.into()))?;
        Ok(Self {
            db: Arc::new(db),
            rules_version: AtomicU64::new(1),
            write_lock: RwLock::new(()),
        })
    }

    pub fn rules_version(&self) -> u64 {
        self.rules_version.load(Ordering::SeqCst)
    }

    pub fn add(&self, rule: CustomRule) -> MapperResult<()> {
        rule.validate()?;
        let _guard = self.write_lock.write().unwrap();
        self.put(&rule)?;
        self.bump_version();
        Ok(())
    }

    pub fn update(&self, mut rule: CustomRule) -> MapperResult<()> {
        rule.updated_at = Utc::now();
        rule.validate()?;
        let _guard = self.write_lock.write().unwrap();
        self.put(&rule)?;
        self.bump_version();
        Ok(())
    }

    pub fn deactivate(&self, rule_id: &str) -> MapperResult<()> {
        let _guard = self.write_lock.write().unwrap();
        if let Some(mut rule) = self.get_uncached(rule_id)? {
            rule.is_active = false;
            rule.updated_at = Utc::now();
            self.put(&rule)?;
            self.bump_version();
        }
        Ok(())
    }

    pub fn get(&self, rule_id: &str) -> MapperResult<Option<CustomRule>> {
        self.get_uncached(rule_id)
    }

    fn get_uncached(&self, rule_id: &str) -> MapperResult<Option<CustomRule>> {
        let read = self.db.begin_read().map_err(store_err)?;
        let table = match read.open_table(RULES_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(store_err(e)),
        };
        match table.get(rule_id).map_err(store_err)? {
            Some(bytes) => {
                let rule: CustomRule = bincode::deserialize(bytes.value())
                    .map_err(|e| MapperError::rule_store("corrupt rule record", e.into()))?;
                Ok(Some(rule))
            }
            None => Ok(None),
        }
    }

    pub fn list(&self, active_only: bool) -> MapperResult<Vec<CustomRule>> {
        let read = self.db.begin_read().map_err(store_err)?;
        let table = match read.open_table(RULES_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(store_err(e)),
        };
        let mut rules = Vec::new();
        for row in table.iter().map_err(store_err)? {
            let (_, bytes) = row.map_err(store_err)?;
            let rule: CustomRule = bincode::deserialize(bytes.value())
                .map_err(|e| MapperError::rule_store("corrupt rule record", e.into()))?;
            if !active_only || rule.is_active {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    pub fn export_json(&self) -> MapperResult<String> {
        let rules = self.list(false)?;
        serde_json::to_string_pretty(&RulesExport { rules })
            .map_err(|e| MapperError::rule_store("failed to serialize rules export", e.into()))
    }

    pub fn import_json(&self, json: &str) -> MapperResult<usize> {
        let export: RulesExport = serde_json::from_str(json)
            .map_err(|e| MapperError::rule_validation(format!("malformed rules export: {e}")))?;
        for rule in &export.rules {
            rule.validate()?;
        }
        let count = export.rules.len();
        for rule in export.rules {
            self.add_or_replace(rule)?;
        }
        Ok(count)
    }

    /// Bulk custom-mapping import.
    pub fn import_bulk_mappings(&self, import: BulkMappingImport, created_by: &str) -> MapperResult<usize> {
        let mut count = 0;
        for mapping in import.mappings {
            let now = Utc::now();
            let rule_type = if mapping.override_existing {
                RuleType::ManualOverride
            } else {
                RuleType::ExactMatch
            };
            let rule = CustomRule {
                rule_id: uuid::Uuid::new_v4().to_string(),
                rule_type,
                priority: Priority::Medium,
                source_term: mapping.term,
                target: RuleTarget {
                    code: mapping.code,
                    system: mapping.system,
                    display: mapping.display,
                },
                conditions: RuleConditions::default(),
                metadata: HashMap::new(),
                created_at: now,
                updated_at: now,
                created_by: created_by.to_string(),
                is_active: true,
            };
            self.add(rule)?;
            count += 1;
        }
        for synonym_set in import.synonyms {
            for synonym in &synonym_set.synonyms {
                let now = Utc::now();
                let rule = CustomRule {
                    rule_id: uuid::Uuid::new_v4().to_string(),
                    rule_type: RuleType::ExactMatch,
                    priority: Priority::Low,
                    source_term: synonym.clone(),
                    target: RuleTarget {
                        code: synonym_set.code.clone(),
                        system: synonym_set.system,
                        display: synonym_set.display.clone(),
                    },
                    conditions: RuleConditions::default(),
                    metadata: HashMap::from([("synonym_of".to_string(), synonym_set.term.clone())]),
                    created_at: now,
                    updated_at: now,
                    created_by: created_by.to_string(),
                    is_active: true,
                };
                self.add(rule)?;
                count += 1;
            }
        }
        Ok(count)
    }

    fn add_or_replace(&self, rule: CustomRule) -> MapperResult<()> {
        let _guard = self.write_lock.write().unwrap();
        self.put(&rule)?;
        self.bump_version();
        Ok(())
    }

    fn put(&self, rule: &CustomRule) -> MapperResult<()> {
        let bytes = bincode::serialize(rule)
            .map_err(|e| MapperError::rule_store("failed to serialize rule", e.into()))?;
        let write = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = write.open_table(RULES_TABLE).map_err(store_err)?;
            table.insert(rule.rule_id.as_str(), bytes.as_slice()).map_err(store_err)?;
        }
        write.commit().map_err(store_err)?;
        Ok(())
    }

    fn bump_version(&self) {
        self.rules_version.fetch_add(1, Ordering::SeqCst);
    }

    /// `find_matches`: rules whose conditions match `term` and
    /// `context`, sorted by priority desc then `updated_at` desc.
    pub fn find_matches(&self, normalized_term: &str, context: &crate::candidate::ContextOut) -> MapperResult<Vec<RuleMatch>> {
        let rules = self.list(true)?;
        let mut matches: Vec<RuleMatch> = rules
            .into_iter()
            .filter_map(|rule| {
                let score = self.rule_matches(&rule, normalized_term, context)?;
                Some(RuleMatch { rule, score })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then_with(|| b.rule.updated_at.cmp(&a.rule.updated_at))
        });
        Ok(matches)
    }

    fn rule_matches(&self, rule: &CustomRule, normalized_term: &str, context: &crate::candidate::ContextOut) -> Option<f32> {
        match rule.rule_type {
            RuleType::ExactMatch | RuleType::ManualOverride => {
                (rule.source_term.eq_ignore_ascii_case(normalized_term)).then(|| rule.rule_type.match_score())
            }
            RuleType::PatternMatch => {
                let pattern = rule.conditions.pattern.as_deref()?;
                let re = Regex::new(pattern).ok()?;
                re.is_match(normalized_term).then(|| rule.rule_type.match_score())
            }
            RuleType::ContextDependent => {
                let all_hold = rule.conditions.required_context.iter().all(|(key, expected)| {
                    match key.as_str() {
                        "domain" => context.detected_domain.as_str().eq_ignore_ascii_case(expected),
                        "is_negated" => context.is_negated.to_string() == *expected,
                        _ => false,
                    }
                });
                all_hold.then(|| rule.rule_type.match_score())
            }
            RuleType::DomainSpecific => {
                let domain = rule.conditions.domain.as_deref()?;
                context
                    .detected_domain
                    .as_str()
                    .eq_ignore_ascii_case(domain)
                    .then(|| rule.rule_type.match_score())
            }
        }
    }

    /// `apply`: merge rule matches into `base_candidates`.
    /// Any firing MANUAL_OVERRIDE replaces all other candidates in its
    /// system, regardless of priority; other matches are prepended in
    /// priority order, colliding with vocabulary candidates on
    /// `(system, code)` by confidence-max merge. `matches` is already
    /// sorted by priority (then recency), so when more than one
    /// MANUAL_OVERRIDE fires for the same system the first one in that
    /// order wins — i.e. CRITICAL beats HIGH/MEDIUM/LOW.
    pub fn apply(
        &self,
        matches: &[RuleMatch],
        base_candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, Vec<crate::candidate::RuleApplication>) {
        let mut applications = Vec::new();
        let mut by_system_override: HashMap<System, &RuleMatch> = HashMap::new();

        for m in matches {
            if m.rule.rule_type == RuleType::ManualOverride
                && !by_system_override.contains_key(&m.rule.target.system)
            {
                by_system_override.insert(m.rule.target.system, m);
            }
        }

        if !by_system_override.is_empty() {
            let mut result: Vec<Candidate> = base_candidates
                .into_iter()
                .filter(|c| !by_system_override.contains_key(&c.system))
                .collect();
            for (system, m) in &by_system_override {
                let mut candidate = Candidate::new(
                    m.rule.target.code.clone(),
                    *system,
                    m.rule.target.display.clone(),
                    m.score,
                    MatchType::CustomRule,
                    Source::CustomRule,
                    "manual override rule",
                );
                candidate.applied_rule_ids.push(m.rule.rule_id.clone());
                result.push(candidate);
                applications.push(crate::candidate::RuleApplication {
                    rule_id: m.rule.rule_id.clone(),
                    rule_type: m.rule.rule_type,
                    match_score: m.score,
                });
            }
            return (result, applications);
        }

        let mut merged: HashMap<(System, String), Candidate> = HashMap::new();
        for candidate in base_candidates {
            merged.insert((candidate.system, candidate.code.clone()), candidate);
        }

        for m in matches {
            let mut candidate = Candidate::new(
                m.rule.target.code.clone(),
                m.rule.target.system,
                m.rule.target.display.clone(),
                m.score,
                MatchType::CustomRule,
                Source::CustomRule,
                format!("{:?} rule match", m.rule.rule_type),
            );
            candidate.applied_rule_ids.push(m.rule.rule_id.clone());
            applications.push(crate::candidate::RuleApplication {
                rule_id: m.rule.rule_id.clone(),
                rule_type: m.rule.rule_type,
                match_score: m.score,
            });

            let key = (candidate.system, candidate.code.clone());
            merged
                .entry(key)
                .and_modify(|existing| existing.merge_duplicate(candidate.clone()))
                .or_insert(candidate);
        }

        (merged.into_values().collect(), applications)
    }
}

fn store_err(e: impl Into<anyhow::Error>) -> MapperError {
    MapperError::rule_store("rules store I/O failure", e.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ContextOut;
    use crate::system::Domain;

    fn temp_engine() -> (CustomRulesEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.redb");
        (CustomRulesEngine::open(&path).unwrap(), dir)
    }

    fn sample_rule(rule_type: RuleType, source_term: &str) -> CustomRule {
        let now = Utc::now();
        CustomRule {
            rule_id: uuid::Uuid::new_v4().to_string(),
            rule_type,
            priority: Priority::Medium,
            source_term: source_term.to_string(),
            target: RuleTarget {
                code: "123".into(),
                system: System::Snomed,
                display: "Sample".into(),
            },
            conditions: RuleConditions::default(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            created_by: "test".into(),
            is_active: true,
        }
    }

    fn empty_context() -> ContextOut {
        ContextOut {
            detected_domain: Domain::General,
            modifiers: Vec::new(),
            is_negated: false,
            negation_confidence: 0.0,
            negation_cue: None,
        }
    }

    #[test]
    fn add_and_get_round_trips() {
        let (engine, _dir) = temp_engine();
        let rule = sample_rule(RuleType::ExactMatch, "htn");
        engine.add(rule.clone()).unwrap();
        let fetched = engine.get(&rule.rule_id).unwrap().unwrap();
        assert_eq!(fetched.source_term, "htn");
    }

    #[test]
    fn rejects_pattern_rule_without_pattern() {
        let (engine, _dir) = temp_engine();
        let rule = sample_rule(RuleType::PatternMatch, "x");
        assert!(engine.add(rule).is_err());
    }

    #[test]
    fn exact_match_rule_fires_on_equal_term() {
        let (engine, _dir) = temp_engine();
        engine.add(sample_rule(RuleType::ExactMatch, "htn")).unwrap();
        let matches = engine.find_matches("htn", &empty_context()).unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn writes_bump_rules_version() {
        let (engine, _dir) = temp_engine();
        let before = engine.rules_version();
        engine.add(sample_rule(RuleType::ExactMatch, "htn")).unwrap();
        assert!(engine.rules_version() > before);
    }

    #[test]
    fn non_critical_manual_override_still_replaces_candidates() {
        let (engine, _dir) = temp_engine();
        let mut rule = sample_rule(RuleType::ManualOverride, "chest pain");
        rule.priority = Priority::Low;
        let rule_match = RuleMatch { score: 1.0, rule };

        let base = vec![Candidate::new(
            "29857009",
            System::Snomed,
            "Chest pain",
            0.8,
            MatchType::FuzzyRatio,
            Source::Vocabulary,
            "fuzzy hit",
        )];

        let (result, applications) = engine.apply(&[rule_match], base);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].code, "123");
        assert!(result[0].sources.contains(&Source::CustomRule));
        assert_eq!(applications.len(), 1);
    }

    #[test]
    fn deactivated_rule_is_excluded_from_active_list() {
        let (engine, _dir) = temp_engine();
        let rule = sample_rule(RuleType::ExactMatch, "htn");
        engine.add(rule.clone()).unwrap();
        engine.deactivate(&rule.rule_id).unwrap();
        assert!(engine.list(true).unwrap().is_empty());
        assert_eq!(engine.list(false).unwrap().len(), 1);
    }
}
