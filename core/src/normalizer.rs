//! Text normalization.
//!
//! Deterministic and pure: same input always yields the same canonical form
//! and variant list, so results are safe to cache by normalized text alone.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Dosage/lab-value/frequency/abbreviation patterns preserved across general
/// punctuation smoothing, taken from the clinical preprocessing pipeline
/// this engine's normalization is modeled on.
static MEDICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\d+(?:\.\d+)?\s*(?:mg|mcg|g|kg|ml|l|mmol|\x{00b5}g|iu|mg/dl|mmhg|cm|mm)\b",
        r"\d+(?:\.\d+)?\s*(?:-|to|\x{2013})\s*\d+(?:\.\d+)?",
        r"(?i)(?:once|twice|three times|four times)\s+(?:daily|weekly|monthly|a day)",
        r"(?i)\b(?:b\.i\.d\.|t\.i\.d\.|q\.i\.d\.|q\.d\.|p\.r\.n\.|a\.c\.|p\.c\.|q\.[0-9]+h|bid|tid|qid)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static medical pattern compiles"))
    .collect()
});

/// Clinical-prefix phrases stripped after medical-pattern preservation
///.
const CLINICAL_PREFIXES: &[&str] = &[
    "history of",
    "h/o",
    "hx of",
    "status post",
    "s/p",
    "rule out",
    "r/o",
];

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").expect("static regex"));
static QUOTE_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\u{201c}\u{201d}\u{2018}\u{2019}]"#).expect("static regex"));
static DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\u{2013}\u{2014}]").expect("static regex"));
static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("static regex"));

/// Breadth limit on generated variants.
const MAX_VARIANTS: usize = 32;

/// Result of normalizing one input term.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub canonical: String,
    /// Ordered: canonical first, then abbreviation/reverse/synonym/
    /// punctuation-less variants, each unique.
    pub variants: Vec<String>,
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// Configured abbreviation map, e.g. `HTN -> hypertension`. Reverse
    /// expansions are derived automatically.
    abbreviations: HashMap<String, String>,
    synonyms: HashMap<String, Vec<String>>,
}

impl Normalizer {
    pub fn new(abbreviations: HashMap<String, String>, synonyms: HashMap<String, Vec<String>>) -> Self {
        Self {
            abbreviations,
            synonyms,
        }
    }

    pub fn add_synonym(&mut self, term: impl Into<String>, synonym: impl Into<String>) {
        self.synonyms
            .entry(term.into())
            .or_default()
            .push(synonym.into());
    }

    pub fn add_abbreviation(&mut self, short: impl Into<String>, long: impl Into<String>) {
        self.abbreviations.insert(short.into(), long.into());
    }

    /// Produce the canonical form and generated variants.
    /// Never panics on malformed input; empty/whitespace-only input yields
    /// an empty `Normalized`.
    pub fn normalize(&self, text: &str) -> Normalized {
        if text.trim().is_empty() {
            return Normalized::default();
        }

        let canonical = self.canonicalize(text);
        if canonical.is_empty() {
            return Normalized::default();
        }

        let mut variants = vec![canonical.clone()];
        self.push_unique(&mut variants, self.expand_abbreviations(&canonical));
        self.push_unique(&mut variants, self.reverse_abbreviations(&canonical));
        for synonym_variant in self.expand_synonyms(&canonical) {
            self.push_unique(&mut variants, synonym_variant);
        }
        self.push_unique(&mut variants, canonical.replace(|c: char| !c.is_alphanumeric() && c != ' ', ""));

        variants.truncate(MAX_VARIANTS);
        Normalized { canonical, variants }
    }

    fn push_unique(&self, variants: &mut Vec<String>, candidate: String) {
        if candidate.is_empty() || variants.len() >= MAX_VARIANTS {
            return;
        }
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }

    /// Canonicalization pipeline: control-char strip, NFKC, lowercase,
    /// whitespace collapse, quote/dash normalization, medical-pattern
    /// preservation, clinical-prefix stripping.
    fn canonicalize(&self, text: &str) -> String {
        let text = text.chars().collect::<String>().nfkc().collect::<String>();
        let text = CONTROL_CHARS.replace_all(&text, "").to_string();
        let text = text.to_lowercase();

        let (protected, placeholders) = self.preserve_medical_patterns(&text);

        let cleaned = QUOTE_DASH.replace_all(&protected, "'");
        let cleaned = DASHES.replace_all(&cleaned, "-");
        let cleaned = MULTI_SPACE.replace_all(&cleaned, " ");
        let mut cleaned = cleaned.trim().to_string();

        for (placeholder, original) in placeholders {
            cleaned = cleaned.replace(&placeholder, &original);
        }

        self.strip_clinical_prefixes(&cleaned)
    }

    fn preserve_medical_patterns(&self, text: &str) -> (String, Vec<(String, String)>) {
        // Every pattern matches against the pristine `text`, so all matches
        // (across all patterns) must be collected and applied in left-to-right
        // order against one cumulative offset; applying per-pattern with a
        // reset offset would splice later patterns' (unadjusted) positions
        // into regions already shifted by earlier patterns' placeholders.
        let mut raw_matches: Vec<(usize, usize, String)> = Vec::new();
        for pattern in MEDICAL_PATTERNS.iter() {
            for m in pattern.find_iter(text) {
                raw_matches.push((m.start(), m.end(), m.as_str().to_string()));
            }
        }
        raw_matches.sort_by_key(|(start, _, _)| *start);

        let mut out = text.to_string();
        let mut placeholders = Vec::new();
        let mut offset = 0isize;
        let mut last_end = 0usize;
        for (idx, (start, end, matched)) in raw_matches.into_iter().enumerate() {
            if start < last_end {
                continue; // overlaps a match already spliced in
            }
            let placeholder = format!("\u{0}medpat{idx}\u{0}");
            let adj_start = (start as isize + offset).max(0) as usize;
            let adj_end = (end as isize + offset).max(0) as usize;
            if adj_start > out.len() || adj_end > out.len() || adj_start > adj_end {
                continue;
            }
            out.replace_range(adj_start..adj_end, &placeholder);
            offset += placeholder.len() as isize - (end as isize - start as isize);
            placeholders.push((placeholder, matched));
            last_end = end;
        }
        (out, placeholders)
    }

    fn strip_clinical_prefixes(&self, text: &str) -> String {
        let mut result = text.to_string();
        for prefix in CLINICAL_PREFIXES {
            let with_space = format!("{prefix} ");
            if result.starts_with(&with_space) {
                result = result[with_space.len()..].to_string();
            } else if result == *prefix {
                result.clear();
            }
        }
        result.trim().to_string()
    }

    fn expand_abbreviations(&self, canonical: &str) -> String {
        let mut result = canonical.to_string();
        for (short, long) in &self.abbreviations {
            if contains_word(&result, short) {
                result = replace_word(&result, short, long);
            }
        }
        result
    }

    fn reverse_abbreviations(&self, canonical: &str) -> String {
        let mut result = canonical.to_string();
        for (short, long) in &self.abbreviations {
            if contains_word(&result, long) {
                result = replace_word(&result, long, short);
            }
        }
        result
    }

    fn expand_synonyms(&self, canonical: &str) -> Vec<String> {
        self.synonyms
            .get(canonical)
            .map(|syns| syns.clone())
            .unwrap_or_default()
    }
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.split_whitespace().any(|t| t == word)
}

fn replace_word(haystack: &str, word: &str, replacement: &str) -> String {
    haystack
        .split_whitespace()
        .map(|t| if t == word { replacement } else { t })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_empty() {
        let n = Normalizer::default();
        assert!(n.normalize("   ").is_empty());
    }

    #[test]
    fn lowercases_and_collapses_whitespace() {
        let n = Normalizer::default();
        let out = n.normalize("  Chest   PAIN  ");
        assert_eq!(out.canonical, "chest pain");
    }

    #[test]
    fn preserves_dosage_tokens() {
        let n = Normalizer::default();
        let out = n.normalize("metoprolol 50mg b.i.d.");
        assert!(out.canonical.contains("50mg"));
        assert!(out.canonical.contains("b.i.d."));
    }

    #[test]
    fn preserves_dosage_and_frequency_together() {
        let n = Normalizer::default();
        let out = n.normalize("metoprolol 50mg bid now");
        assert!(out.canonical.contains("50mg"));
        assert!(out.canonical.contains("bid"));
        assert!(!out.canonical.contains('\u{0}'));
        assert!(!out.canonical.contains("medpat"));
    }

    #[test]
    fn preserves_dosage_token_in_lead_example() {
        let n = Normalizer::default();
        let out = n.normalize("metformin 500mg");
        assert!(out.canonical.contains("500mg"));
        assert!(!out.canonical.contains('\u{0}'));
    }

    #[test]
    fn strips_clinical_prefixes() {
        let n = Normalizer::default();
        let out = n.normalize("history of myocardial infarction");
        assert_eq!(out.canonical, "myocardial infarction");
    }

    #[test]
    fn expands_configured_abbreviation_as_variant() {
        let mut n = Normalizer::default();
        n.add_abbreviation("htn", "hypertension");
        let out = n.normalize("htn");
        assert!(out.variants.iter().any(|v| v == "hypertension"));
    }

    #[test]
    fn variant_list_is_breadth_limited() {
        let mut n = Normalizer::default();
        for i in 0..100 {
            n.add_synonym("term", format!("synonym{i}"));
        }
        let out = n.normalize("term");
        assert!(out.variants.len() <= MAX_VARIANTS);
    }
}
