//! Clinical context analysis, modeled on a clinical negation and
//! modifier detector: configured regex sets per `ModifierType` with
//! per-type scope rules (max distance, punctuation/conjunction boundaries).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::candidate::{ContextInput, ContextOut, Modifier};
use crate::system::Domain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierType {
    Negation,
    Uncertainty,
    Severity,
    Temporality,
    FamilyHistory,
    Experiencer,
    Conditionality,
}

/// Per-type scope-termination rule.
#[derive(Debug, Clone, Copy)]
struct ScopeRule {
    max_distance: usize,
    punctuation_boundary: bool,
    conjunction_boundary: bool,
}

const DEFAULT_SCOPE_RULE: ScopeRule = ScopeRule {
    max_distance: 5,
    punctuation_boundary: true,
    conjunction_boundary: true,
};

fn scope_rule_for(modifier_type: ModifierType) -> ScopeRule {
    match modifier_type {
        ModifierType::Negation => ScopeRule {
            max_distance: 10,
            punctuation_boundary: true,
            conjunction_boundary: true,
        },
        ModifierType::Uncertainty => ScopeRule {
            max_distance: 8,
            punctuation_boundary: true,
            conjunction_boundary: false,
        },
        ModifierType::Severity | ModifierType::Temporality => ScopeRule {
            max_distance: 3,
            punctuation_boundary: false,
            conjunction_boundary: false,
        },
        _ => DEFAULT_SCOPE_RULE,
    }
}

struct CuePattern {
    regex: Regex,
    base_confidence: f32,
}

fn compiled(patterns: &[(&str, f32)]) -> Vec<CuePattern> {
    patterns
        .iter()
        .map(|(p, conf)| CuePattern {
            regex: Regex::new(p).expect("static cue pattern compiles"),
            base_confidence: *conf,
        })
        .collect()
}

static NEGATION_CUES: Lazy<Vec<CuePattern>> = Lazy::new(|| {
    compiled(&[
        (r"(?i)\b(?:no|not|without|absent|negative|denies?|rules?\s+out)\b", 0.95),
        (r"(?i)\b(?:never|none|nowhere|nothing|nobody)\b", 0.95),
        (r"(?i)\b(?:cannot|can't|won't|wouldn't|shouldn't|couldn't)\b", 0.9),
        (r"(?i)\b(?:free\s+of|lack\s+of|absence\s+of|devoid\s+of)\b", 0.9),
        (r"(?i)\b(?:ruled?\s+out|r/o|rule\s+out|exclude[sd]?)\b", 0.9),
        (r"(?i)\b(?:no\s+(?:evidence|signs?|symptoms?|indication)\s+of)\b", 0.9),
        (r"(?i)\b(?:no\s+(?:history|h/o)\s+of)\b", 0.9),
        (r"(?i)\b(?:unremarkable|normal|within\s+normal\s+limits|wnl)\b", 0.8),
        (r"(?i)\b(?:clear|cleared|resolution|resolved)\b", 0.8),
        (r"(?i)\b(?:if\s+no|unless|except\s+for|other\s+than)\b", 0.8),
        (r"(?i)\b(?:rather\s+than|instead\s+of|as\s+opposed\s+to)\b", 0.8),
    ])
});

static UNCERTAINTY_CUES: Lazy<Vec<CuePattern>> = Lazy::new(|| {
    compiled(&[
        (r"(?i)\b(?:possible|possibly|probable|probably|likely|unlikely)\b", 0.9),
        (r"(?i)\b(?:suspect|suspected|consider|considering)\b", 0.8),
        (r"(?i)\b(?:may|might|could|would|should)\b", 0.85),
        (r"(?i)\b(?:appears?|seems?|suggests?|consistent\s+with)\b", 0.8),
        (r"(?i)\b(?:impression|differential|rule\s+out|r/o)\b", 0.8),
        (r"(?i)\b(?:somewhat|rather|fairly|quite|relatively)\b", 0.8),
        (r"(?i)\b(?:apparently|presumably|allegedly)\b", 0.8),
        (r"(?i)\b(?:tend\s+to|inclined\s+to)\b", 0.8),
    ])
});

static SEVERITY_CUES: Lazy<Vec<CuePattern>> = Lazy::new(|| {
    compiled(&[
        (r"(?i)\b(?:mild|slight|minor|minimal|trace)\b", 0.8),
        (r"(?i)\b(?:low-grade|low\s+grade)\b", 0.8),
        (r"(?i)\b(?:moderate|medium|intermediate)\b", 0.8),
        (r"(?i)\b(?:severe|serious|major|significant|marked)\b", 0.8),
        (r"(?i)\b(?:acute|critical|extreme|intense)\b", 0.8),
        (r"(?i)\b(?:high-grade|high\s+grade)\b", 0.8),
    ])
});

static TEMPORAL_CUES: Lazy<Vec<CuePattern>> = Lazy::new(|| {
    compiled(&[
        (r"(?i)\b(?:history\s+of|h/o|hx\s+of|previous|prior|past)\b", 0.8),
        (r"(?i)\b(?:formerly|previously|once|used\s+to)\b", 0.8),
        (r"(?i)\b(?:years?\s+ago|months?\s+ago|days?\s+ago)\b", 0.8),
        (r"(?i)\b(?:current|currently|present|active|ongoing)\b", 0.8),
        (r"(?i)\b(?:now|today|recently|acute)\b", 0.8),
        (r"(?i)\b(?:chronic|long-term|persistent|ongoing)\b", 0.8),
        (r"(?i)\b(?:lifelong|permanent|established)\b", 0.8),
        (r"(?i)\b(?:intermittent|occasional|episodic|sporadic)\b", 0.8),
        (r"(?i)\b(?:on\s+and\s+off|comes?\s+and\s+goes?)\b", 0.8),
    ])
});

static FAMILY_HISTORY_CUES: Lazy<Vec<CuePattern>> = Lazy::new(|| {
    compiled(&[
        (r"(?i)\b(?:family\s+history|fh|family\s+hx)\b", 0.85),
        (r"(?i)\b(?:mother|father|parent|sibling|brother|sister)\b", 0.75),
        (r"(?i)\b(?:maternal|paternal|grandmother|grandfather)\b", 0.75),
        (r"(?i)\b(?:runs?\s+in\s+the\s+family|familial)\b", 0.85),
    ])
});

static EXPERIENCER_CUES: Lazy<Vec<CuePattern>> = Lazy::new(|| {
    compiled(&[
        (r"(?i)\b(?:someone|anyone|people|others)\b", 0.7),
    ])
});

static CONDITIONALITY_CUES: Lazy<Vec<CuePattern>> = Lazy::new(|| {
    compiled(&[
        (r"(?i)\b(?:if|should|in\s+the\s+event\s+of|provided\s+that)\b", 0.75),
    ])
});

static SCOPE_TERMINATOR_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?;]").expect("static regex"));
static SCOPE_TERMINATOR_CONJUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:but|however|although|though|except|while)\b").expect("static regex")
});

fn cues_for(modifier_type: ModifierType) -> &'static [CuePattern] {
    match modifier_type {
        ModifierType::Negation => &NEGATION_CUES,
        ModifierType::Uncertainty => &UNCERTAINTY_CUES,
        ModifierType::Severity => &SEVERITY_CUES,
        ModifierType::Temporality => &TEMPORAL_CUES,
        ModifierType::FamilyHistory => &FAMILY_HISTORY_CUES,
        ModifierType::Experiencer => &EXPERIENCER_CUES,
        ModifierType::Conditionality => &CONDITIONALITY_CUES,
    }
}

const ALL_MODIFIER_TYPES: [ModifierType; 7] = [
    ModifierType::Negation,
    ModifierType::Uncertainty,
    ModifierType::Severity,
    ModifierType::Temporality,
    ModifierType::FamilyHistory,
    ModifierType::Experiencer,
    ModifierType::Conditionality,
];

/// Keyword lexicon for coarse domain detection, weighted by specificity.
fn domain_lexicon(domain: Domain) -> &'static [&'static str] {
    match domain {
        Domain::Cardiology => &["cardiac", "heart", "coronary", "myocardial", "arrhythmia"],
        Domain::Pulmonology => &["lung", "pulmonary", "respiratory", "dyspnea", "asthma"],
        Domain::Endocrinology => &["diabetes", "thyroid", "insulin", "glucose", "hormone"],
        Domain::Neurology => &["brain", "seizure", "neuro", "stroke", "migraine"],
        Domain::Psychiatry => &["depression", "anxiety", "psychiatric", "mood", "mental"],
        Domain::Gastroenterology => &["gastric", "bowel", "hepatic", "abdominal", "intestinal"],
        Domain::Nephrology => &["renal", "kidney", "dialysis", "nephro"],
        Domain::Rheumatology => &["arthritis", "joint", "autoimmune", "rheumatoid"],
        Domain::Oncology => &["tumor", "cancer", "malignant", "oncology", "chemotherapy"],
        Domain::Laboratory => &["lab", "serum", "assay", "specimen", "level"],
        Domain::Pharmacy => &["dose", "medication", "prescription", "drug", "mg"],
        Domain::General => &[],
    }
}

/// Minimum lexicon score for a domain to win over `domain_hint`/`GENERAL`
///.
const MIN_DOMAIN_EVIDENCE: f32 = 1.0;

#[derive(Debug, Default)]
pub struct ContextAnalyzer;

impl ContextAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze `surrounding_text` for the detected domain and the modifiers
    /// that affect the target term span.
    pub fn analyze(&self, input: &ContextInput, target_span: (usize, usize)) -> ContextOut {
        let text = input.surrounding_text.as_deref().unwrap_or("");
        let detected_domain = self.detect_domain(text, input.domain_hint);
        let modifiers = self.extract_modifiers(text, target_span);

        let negation_matches: Vec<&Modifier> = modifiers
            .iter()
            .filter(|m| m.modifier_type == ModifierType::Negation)
            .collect();
        let is_negated = !negation_matches.is_empty();
        let negation_confidence = negation_matches
            .iter()
            .map(|m| m.confidence)
            .fold(0.0f32, f32::max);
        let negation_cue = negation_matches
            .iter()
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
            .map(|m| m.text.clone());

        ContextOut {
            detected_domain,
            modifiers,
            is_negated,
            negation_confidence,
            negation_cue,
        }
    }

    fn detect_domain(&self, text: &str, hint: Option<Domain>) -> Domain {
        let lowered = text.to_lowercase();
        let mut best = (Domain::General, 0.0f32);
        for domain in Domain::ALL {
            let score: f32 = domain_lexicon(domain)
                .iter()
                .filter(|kw| lowered.contains(*kw))
                .count() as f32;
            if score > best.1 {
                best = (domain, score);
            }
        }

        if best.1 < MIN_DOMAIN_EVIDENCE {
            return hint.unwrap_or(Domain::General);
        }
        match hint {
            // A contradicting hint only loses to high-confidence lexicon
            // evidence.
            Some(h) if h != best.0 && best.1 < MIN_DOMAIN_EVIDENCE * 2.0 => h,
            _ => best.0,
        }
    }

    fn extract_modifiers(&self, text: &str, target_span: (usize, usize)) -> Vec<Modifier> {
        let mut modifiers = Vec::new();
        for &modifier_type in &ALL_MODIFIER_TYPES {
            for cue in cues_for(modifier_type) {
                for m in cue.regex.find_iter(text) {
                    let scope = self.scope_for(text, m.end(), modifier_type);
                    if !affects(target_span, (m.start(), scope.1)) {
                        continue;
                    }
                    modifiers.push(Modifier {
                        modifier_type,
                        text: m.as_str().to_string(),
                        span: (m.start(), m.end()),
                        confidence: calibrate_confidence(cue.base_confidence, m.as_str()),
                        scope_span: scope,
                    });
                }
            }
        }
        modifiers
    }

    /// Scope end for a cue at `end_pos`, per `scope_rule_for(modifier_type)`
    ///.
    fn scope_for(&self, text: &str, end_pos: usize, modifier_type: ModifierType) -> (usize, usize) {
        let rule = scope_rule_for(modifier_type);
        let tail = &text[end_pos.min(text.len())..];
        let mut scope_end = end_pos;
        let mut word_count = 0usize;

        for word in tail.split_whitespace() {
            if word_count >= rule.max_distance {
                break;
            }
            if rule.punctuation_boundary && SCOPE_TERMINATOR_PUNCTUATION.is_match(word) {
                break;
            }
            if rule.conjunction_boundary && SCOPE_TERMINATOR_CONJUNCTION.is_match(word) {
                break;
            }
            scope_end += word.len() + 1;
            word_count += 1;
        }

        (end_pos, scope_end.min(text.len()))
    }
}

/// A target span is affected by a modifier iff it lies within the
/// modifier's scope.
fn affects(target_span: (usize, usize), scope: (usize, usize)) -> bool {
    target_span.0 >= scope.0 && target_span.0 <= scope.1
}

/// Confidence boost for multi-word cue matches.
fn calibrate_confidence(base: f32, matched_text: &str) -> f32 {
    if matched_text.split_whitespace().count() > 1 {
        (base + 0.05).min(1.0)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(text: &str) -> ContextInput {
        ContextInput {
            surrounding_text: Some(text.to_string()),
            domain_hint: None,
            metadata: Default::default(),
        }
    }

    #[test]
    fn detects_negation_affecting_target() {
        let analyzer = ContextAnalyzer::new();
        let text = "no evidence of pneumonia on exam";
        let target_start = text.find("pneumonia").unwrap();
        let out = analyzer.analyze(&ctx(text), (target_start, target_start + "pneumonia".len()));
        assert!(out.is_negated);
    }

    #[test]
    fn negation_scope_stops_at_conjunction() {
        let analyzer = ContextAnalyzer::new();
        let text = "no fever but patient reports cough";
        let target_start = text.find("cough").unwrap();
        let out = analyzer.analyze(&ctx(text), (target_start, target_start + "cough".len()));
        assert!(!out.is_negated);
    }

    #[test]
    fn severity_scope_is_narrow() {
        let analyzer = ContextAnalyzer::new();
        let text = "mild discomfort reported several days later when patient noted cough";
        let target_start = text.find("cough").unwrap();
        let out = analyzer.analyze(&ctx(text), (target_start, target_start + "cough".len()));
        assert!(!out
            .modifiers
            .iter()
            .any(|m| m.modifier_type == ModifierType::Severity));
    }

    #[test]
    fn domain_falls_back_to_general_without_evidence() {
        let analyzer = ContextAnalyzer::new();
        let out = analyzer.analyze(&ctx("patient feels fine today"), (0, 0));
        assert_eq!(out.detected_domain, Domain::General);
    }

    #[test]
    fn domain_hint_is_honored_without_contradiction() {
        let analyzer = ContextAnalyzer::new();
        let input = ContextInput {
            surrounding_text: Some("patient reports ongoing issue".to_string()),
            domain_hint: Some(Domain::Cardiology),
            metadata: Default::default(),
        };
        let out = analyzer.analyze(&input, (0, 0));
        assert_eq!(out.detected_domain, Domain::Cardiology);
    }
}
