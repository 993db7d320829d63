//! End-to-end scenarios driven entirely through `build_coordinator` and
//! `MappingCoordinator::map_term`/`map_terms_batch`, against a small
//! on-disk fixture index.

mod common;

use std::collections::HashMap;

use medterm_core::{
    build_coordinator, Candidate, Config, ContextInput, CustomRule, MatchType, Priority,
    RuleConditions, RuleTarget, RuleType, Source, System, TermRequest,
};

fn fixture_config(index_dir: &std::path::Path, rules_db: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.data_dir = index_dir.to_path_buf();
    config.rules_db = rules_db.to_path_buf();
    config
}

fn setup() -> (tempfile::TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let index_dir = dir.path().join("index");
    std::fs::create_dir_all(&index_dir).unwrap();
    common::build_index_dir(
        &index_dir,
        &[
            (
                System::Snomed,
                vec![
                    common::concept("38341003", "Hypertensive disorder", &["hypertensive disorder", "hypertension", "htn"]),
                    common::concept("195967001", "Asthma", &["asthma"]),
                ],
            ),
            (
                System::Loinc,
                vec![common::concept("2345-7", "Glucose [Mass/volume] in Serum or Plasma", &["glucose serum plasma"])],
            ),
        ],
    );
    let rules_db = dir.path().join("rules.redb");
    let config = fixture_config(&index_dir, &rules_db);
    (dir, config)
}

#[test]
fn exact_normalized_match_ranks_first_with_full_confidence() {
    let (_dir, config) = setup();
    let coordinator = build_coordinator(config).unwrap();

    let result = coordinator
        .map_term(TermRequest::new("Hypertension"))
        .unwrap();

    let candidates = &result.per_system[&System::Snomed];
    assert!(!candidates.is_empty());
    let top = &candidates[0];
    assert_eq!(top.code, "38341003");
    assert!(top.confidence >= 0.99);
}

#[test]
fn misspelled_term_still_finds_a_fuzzy_candidate() {
    let (_dir, config) = setup();
    let coordinator = build_coordinator(config).unwrap();

    let mut request = TermRequest::new("hypertention");
    request.threshold = 0.6;
    let result = coordinator.map_term(request).unwrap();

    let candidates = &result.per_system[&System::Snomed];
    assert!(candidates.iter().any(|c| c.code == "38341003"));
}

#[test]
fn negated_term_keeps_a_reduced_nonzero_confidence() {
    let (_dir, config) = setup();
    let coordinator = build_coordinator(config).unwrap();

    let mut request = TermRequest::new("asthma");
    request.context = Some(ContextInput {
        surrounding_text: Some("no evidence of asthma on exam".to_string()),
        domain_hint: None,
        metadata: HashMap::new(),
    });
    let result = coordinator.map_term(request).unwrap();

    let ctx = result.context.expect("context output present");
    assert!(ctx.is_negated);

    let candidates = &result.per_system[&System::Snomed];
    let asthma = candidates.iter().find(|c| c.code == "195967001").unwrap();
    assert!(asthma.confidence > 0.0);
    assert!(asthma.confidence < 0.9);
}

#[test]
fn unconfigured_system_is_reported_degraded_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let index_dir = dir.path().join("index");
    std::fs::create_dir_all(&index_dir).unwrap();
    // Only SNOMED is built; LOINC and RxNorm have no index files on disk.
    common::build_index_dir(
        &index_dir,
        &[(System::Snomed, vec![common::concept("1", "Sample", &["sample"])])],
    );
    let config = fixture_config(&index_dir, &dir.path().join("rules.redb"));
    let coordinator = build_coordinator(config).unwrap();

    let result = coordinator.map_term(TermRequest::new("sample")).unwrap();

    assert!(result.processing_metadata.contains_key("degraded_systems"));
    let degraded = &result.processing_metadata["degraded_systems"];
    assert!(degraded.contains("LOINC"));
    assert!(degraded.contains("RxNorm"));
    // The unavailable systems simply contribute nothing, never an Err.
    assert!(result.per_system.get(&System::Loinc).map_or(true, |v| v.is_empty()));
}

#[test]
fn manual_override_replaces_vocabulary_candidates_for_its_system() {
    let (_dir, config) = setup();
    let coordinator = build_coordinator(config).unwrap();

    let now = chrono::Utc::now();
    coordinator
        .rules()
        .add(CustomRule {
            rule_id: "override-chest-pain".to_string(),
            rule_type: RuleType::ManualOverride,
            priority: Priority::Critical,
            source_term: "chest pain".to_string(),
            target: RuleTarget {
                code: "999999".to_string(),
                system: System::Snomed,
                display: "Custom Chest Pain".to_string(),
            },
            conditions: RuleConditions::default(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            created_by: "test".to_string(),
            is_active: true,
        })
        .unwrap();

    let result = coordinator.map_term(TermRequest::new("chest pain")).unwrap();

    let candidates = &result.per_system[&System::Snomed];
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].code, "999999");
    assert!(candidates[0].sources.contains(&Source::CustomRule));
    assert!(result
        .applied_rules
        .iter()
        .any(|r| r.rule_id == "override-chest-pain"));
}

#[test]
fn blank_term_returns_immediately_with_no_candidates() {
    let (_dir, config) = setup();
    let coordinator = build_coordinator(config).unwrap();

    let result = coordinator.map_term(TermRequest::new("   ")).unwrap();
    assert_eq!(result.total_matches, 0);
    assert!(result.per_system.is_empty());
}

#[test]
fn repeated_identical_request_is_served_from_cache() {
    let (_dir, config) = setup();
    let coordinator = build_coordinator(config).unwrap();

    let first = coordinator.map_term(TermRequest::new("asthma")).unwrap();
    let second = coordinator.map_term(TermRequest::new("asthma")).unwrap();

    assert_eq!(first.total_matches, second.total_matches);
    assert_eq!(first.processing_time_ms, second.processing_time_ms);

    let stats = coordinator.stats_snapshot();
    assert!(stats.cache_hit_rate > 0.0);
}

#[test]
fn batch_preserves_input_order() {
    let (_dir, config) = setup();
    let coordinator = build_coordinator(config).unwrap();

    let terms = vec!["asthma", "hypertension", "glucose serum plasma"];
    let requests: Vec<TermRequest> = terms.iter().map(|t| TermRequest::new(*t)).collect();
    let batch = coordinator.map_terms_batch(requests);

    assert_eq!(batch.results.len(), terms.len());
    for (term, result) in terms.iter().zip(&batch.results) {
        let mapping = result.as_ref().expect("mapping succeeds");
        assert_eq!(&mapping.term, term);
    }
}

#[test]
fn ranking_prefers_higher_confidence_then_source_rank_then_shorter_display() {
    let mut a = Candidate::new("1", System::Snomed, "Longer Display Name", 0.9, MatchType::FuzzyRatio, Source::Vocabulary, "");
    let mut b = Candidate::new("2", System::Snomed, "Short", 0.9, MatchType::Exact, Source::Vocabulary, "");
    let mut list = vec![a.clone(), b.clone()];
    list.sort_by(|x, y| x.cmp_for_ranking(y));
    // Equal confidence: Exact (rank 1) beats FuzzyRatio (rank 4).
    assert_eq!(list[0].code, "2");

    a.confidence = 0.95;
    b.confidence = 0.80;
    let mut list2 = vec![a, b];
    list2.sort_by(|x, y| x.cmp_for_ranking(y));
    // Confidence dominates source rank.
    assert_eq!(list2[0].code, "1");
}
