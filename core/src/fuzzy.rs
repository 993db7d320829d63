//! Multi-strategy fuzzy matching over a vocabulary's term list.
//!
//! Every enabled algorithm scores every candidate term; the maximum score
//! per concept wins, tagged with the algorithm that produced it. Large
//! vocabularies are scanned with `rayon` to keep per-request latency bounded.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::candidate::{Candidate, MatchType, Source};
use crate::phonetic::PhoneticMatcher;
use crate::system::System;
use crate::tfidf::TfidfVectorizer;
use crate::vocabulary::FuzzyTerm;

/// A similarity scoring strategy. `Exact`/`Abbreviation` are handled by
/// the normalized-index lookup in the vocabulary store, not here; this enum
/// only covers the similarity algorithms the fuzzy matcher itself runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuzzyAlgorithm {
    Levenshtein,
    TokenSort,
    TokenSet,
    JaroWinkler,
    Phonetic,
    Cosine,
}

impl FuzzyAlgorithm {
    pub fn all() -> [FuzzyAlgorithm; 6] {
        [
            FuzzyAlgorithm::Levenshtein,
            FuzzyAlgorithm::TokenSort,
            FuzzyAlgorithm::TokenSet,
            FuzzyAlgorithm::JaroWinkler,
            FuzzyAlgorithm::Phonetic,
            FuzzyAlgorithm::Cosine,
        ]
    }

    fn match_type(&self) -> MatchType {
        match self {
            FuzzyAlgorithm::Phonetic => MatchType::Phonetic,
            FuzzyAlgorithm::Cosine => MatchType::Cosine,
            FuzzyAlgorithm::Levenshtein
            | FuzzyAlgorithm::TokenSort
            | FuzzyAlgorithm::TokenSet
            | FuzzyAlgorithm::JaroWinkler => MatchType::FuzzyRatio,
        }
    }
}

impl fmt::Display for FuzzyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FuzzyAlgorithm::Levenshtein => "levenshtein",
            FuzzyAlgorithm::TokenSort => "token_sort",
            FuzzyAlgorithm::TokenSet => "token_set",
            FuzzyAlgorithm::JaroWinkler => "jaro_winkler",
            FuzzyAlgorithm::Phonetic => "phonetic",
            FuzzyAlgorithm::Cosine => "cosine",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FuzzyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "levenshtein" => Ok(FuzzyAlgorithm::Levenshtein),
            "token_sort" | "tokensort" => Ok(FuzzyAlgorithm::TokenSort),
            "token_set" | "tokenset" => Ok(FuzzyAlgorithm::TokenSet),
            "jaro_winkler" | "jarowinkler" => Ok(FuzzyAlgorithm::JaroWinkler),
            "phonetic" => Ok(FuzzyAlgorithm::Phonetic),
            "cosine" => Ok(FuzzyAlgorithm::Cosine),
            other => Err(other.to_string()),
        }
    }
}

/// Above this token count a query skips token-sort/token-set.
const MIN_TOKENS_FOR_TOKEN_ALGORITHMS: usize = 2;

const JARO_WINKLER_PREFIX_BOOST: f64 = 0.1;
const JARO_WINKLER_PREFIX_CAP: usize = 4;

pub struct FuzzyMatcher<'a> {
    phonetic: PhoneticMatcher,
    vectorizer: Option<&'a TfidfVectorizer>,
}

impl<'a> FuzzyMatcher<'a> {
    pub fn new(vectorizer: Option<&'a TfidfVectorizer>) -> Self {
        Self {
            phonetic: PhoneticMatcher::new(),
            vectorizer,
        }
    }

    /// Score `query` against every term in `vocabulary`, keep the max score
    /// per `(system, code)`, discard below `threshold`, and return the top
    /// `max_results` sorted by score desc then display length asc.
    ///
    /// Empty `variants` returns an empty result immediately; `variants` always includes the normalized query as the first
    /// element by the caller's convention (see `Normalizer::normalize`).
    pub fn search(
        &self,
        system: System,
        variants: &[String],
        vocabulary: &[FuzzyTerm],
        algorithms: &[FuzzyAlgorithm],
        threshold: f32,
        max_results: usize,
    ) -> Vec<Candidate> {
        if variants.is_empty() || vocabulary.is_empty() || algorithms.is_empty() {
            return Vec::new();
        }

        let best: HashMap<String, Candidate> = vocabulary
            .par_iter()
            .filter_map(|term| {
                let (score, algo) = self.best_score(variants, &term.normalized_text, algorithms);
                if score < threshold {
                    return None;
                }
                let explanation = format!(
                    "{:?} match on \"{}\" (score {:.3})",
                    algo, term.normalized_text, score
                );
                Some(Candidate::new(
                    term.code.clone(),
                    system,
                    term.display.clone(),
                    score,
                    algo.match_type(),
                    Source::Vocabulary,
                    explanation,
                ))
            })
            .fold(
                HashMap::new,
                |mut acc: HashMap<String, Candidate>, cand| {
                    acc.entry(cand.code.clone())
                        .and_modify(|existing| {
                            if cand.confidence > existing.confidence {
                                *existing = cand.clone();
                            }
                        })
                        .or_insert(cand);
                    acc
                },
            )
            .reduce(HashMap::new, |mut a, b| {
                for (code, cand) in b {
                    a.entry(code)
                        .and_modify(|existing| {
                            if cand.confidence > existing.confidence {
                                *existing = cand.clone();
                            }
                        })
                        .or_insert(cand);
                }
                a
            });

        let mut results: Vec<Candidate> = best.into_values().collect();
        results.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.display.len().cmp(&b.display.len()))
        });
        results.truncate(max_results);
        results
    }

    /// Best score across every variant and every enabled algorithm, with
    /// the algorithm that produced it.
    fn best_score(
        &self,
        variants: &[String],
        candidate_term: &str,
        algorithms: &[FuzzyAlgorithm],
    ) -> (f32, FuzzyAlgorithm) {
        let mut best = (0.0f32, FuzzyAlgorithm::Levenshtein);
        for variant in variants {
            for &algo in algorithms {
                let score = self.score_one(algo, variant, candidate_term);
                if score > best.0 {
                    best = (score, algo);
                }
            }
        }
        best
    }

    fn score_one(&self, algo: FuzzyAlgorithm, a: &str, b: &str) -> f32 {
        match algo {
            FuzzyAlgorithm::Levenshtein => levenshtein_ratio(a, b),
            FuzzyAlgorithm::TokenSort => {
                if count_tokens(a) < MIN_TOKENS_FOR_TOKEN_ALGORITHMS
                    || count_tokens(b) < MIN_TOKENS_FOR_TOKEN_ALGORITHMS
                {
                    0.0
                } else {
                    token_sort_ratio(a, b)
                }
            }
            FuzzyAlgorithm::TokenSet => {
                if count_tokens(a) < MIN_TOKENS_FOR_TOKEN_ALGORITHMS
                    || count_tokens(b) < MIN_TOKENS_FOR_TOKEN_ALGORITHMS
                {
                    0.0
                } else {
                    token_set_ratio(a, b)
                }
            }
            FuzzyAlgorithm::JaroWinkler => jaro_winkler(a, b) as f32,
            FuzzyAlgorithm::Phonetic => self.phonetic.score(a, b),
            FuzzyAlgorithm::Cosine => self
                .vectorizer
                .map(|v| v.cosine(a, b))
                .unwrap_or(0.0),
        }
    }
}

fn count_tokens(s: &str) -> usize {
    s.split_whitespace().count()
}

/// `1 - edit_distance / max(len_a, len_b)`.
fn levenshtein_ratio(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    let dist = levenshtein_distance(&a, &b);
    1.0 - (dist as f32 / max_len as f32)
}

fn levenshtein_distance(a: &[char], b: &[char]) -> usize {
    let (m, n) = (a.len(), b.len());
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];
    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn token_sort_ratio(a: &str, b: &str) -> f32 {
    levenshtein_ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn token_set_ratio(a: &str, b: &str) -> f32 {
    use std::collections::BTreeSet;
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    let intersection: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let union: Vec<&str> = set_a.union(&set_b).copied().collect();
    levenshtein_ratio(&intersection.join(" "), &union.join(" "))
}

/// Jaro-Winkler similarity with prefix boost 0.1, prefix cap 4.
fn jaro_winkler(a: &str, b: &str) -> f64 {
    let jaro = jaro_similarity(a, b);
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let prefix = a
        .iter()
        .zip(b.iter())
        .take(JARO_WINKLER_PREFIX_CAP)
        .take_while(|(x, y)| x == y)
        .count();
    (jaro + prefix as f64 * JARO_WINKLER_PREFIX_BOOST * (1.0 - jaro)).min(1.0)
}

fn jaro_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (a_len, b_len) = (a.len(), b.len());
    if a_len == 0 && b_len == 0 {
        return 1.0;
    }
    if a_len == 0 || b_len == 0 {
        return 0.0;
    }

    let match_distance = (a_len.max(b_len) / 2).saturating_sub(1);
    let mut a_matches = vec![false; a_len];
    let mut b_matches = vec![false; b_len];
    let mut matches = 0usize;

    for i in 0..a_len {
        let start = i.saturating_sub(match_distance);
        let end = (i + match_distance + 1).min(b_len);
        for j in start..end {
            if b_matches[j] || a[i] != b[j] {
                continue;
            }
            a_matches[i] = true;
            b_matches[j] = true;
            matches += 1;
            break;
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0usize;
    for i in 0..a_len {
        if !a_matches[i] {
            continue;
        }
        while !b_matches[k] {
            k += 1;
        }
        if a[i] != b[k] {
            transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    (m / a_len as f64 + m / b_len as f64 + (m - (transpositions as f64 / 2.0)) / m) / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_ratio_identical_is_one() {
        assert_eq!(levenshtein_ratio("asthma", "asthma"), 1.0);
    }

    #[test]
    fn levenshtein_ratio_handles_empty_both() {
        assert_eq!(levenshtein_ratio("", ""), 1.0);
    }

    #[test]
    fn jaro_winkler_rewards_shared_prefix() {
        let close = jaro_winkler("diabetes", "diabetic");
        let far = jaro_winkler("diabetes", "zzzzzzzz");
        assert!(close > far);
        assert!(close <= 1.0);
    }

    #[test]
    fn token_set_ratio_ignores_token_order() {
        let a = "acute myocardial infarction";
        let b = "myocardial infarction acute";
        assert_eq!(token_set_ratio(a, b), 1.0);
    }

    #[test]
    fn search_respects_threshold_and_limit() {
        let vocab = vec![
            FuzzyTerm {
                code: "1".into(),
                normalized_text: "asthma".into(),
                display: "Asthma".into(),
            },
            FuzzyTerm {
                code: "2".into(),
                normalized_text: "diabetes mellitus".into(),
                display: "Diabetes mellitus".into(),
            },
        ];
        let matcher = FuzzyMatcher::new(None);
        let variants = vec!["asthma".to_string()];
        let results = matcher.search(
            System::Snomed,
            &variants,
            &vocab,
            &[FuzzyAlgorithm::Levenshtein],
            0.9,
            10,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code, "1");
    }

    #[test]
    fn search_on_empty_variants_is_empty() {
        let matcher = FuzzyMatcher::new(None);
        let results = matcher.search(
            System::Snomed,
            &[],
            &[],
            &FuzzyAlgorithm::all(),
            0.5,
            10,
        );
        assert!(results.is_empty());
    }
}
