//! Character n-gram TF-IDF cosine similarity.
//!
//! Fit once per vocabulary at index build time; scoring at query time only
//! needs the fitted vectorizer, not the original corpus.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

const NGRAM_SIZES: [usize; 3] = [2, 3, 4];
/// Terms longer than this many whitespace tokens are truncated before
/// vectorizing.
const MAX_TOKENS: usize = 64;

fn ngrams(term: &str) -> Vec<String> {
    let truncated: String = term
        .split_whitespace()
        .take(MAX_TOKENS)
        .collect::<Vec<_>>()
        .join(" ");
    let chars: Vec<char> = truncated.chars().collect();
    let mut grams = Vec::new();
    for &n in &NGRAM_SIZES {
        if chars.len() < n {
            continue;
        }
        for window in chars.windows(n) {
            grams.push(window.iter().collect());
        }
    }
    if grams.is_empty() && !chars.is_empty() {
        grams.push(chars.iter().collect());
    }
    grams
}

/// A sparse vector over the vectorizer's vocabulary, as (term_index, weight)
/// pairs sorted by index, already L2-normalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    pub fn cosine_similarity(&self, other: &SparseVector) -> f32 {
        let mut i = 0;
        let mut j = 0;
        let mut dot = 0.0f32;
        while i < self.entries.len() && j < other.entries.len() {
            let (ia, wa) = self.entries[i];
            let (ib, wb) = other.entries[j];
            match ia.cmp(&ib) {
                std::cmp::Ordering::Equal => {
                    dot += wa * wb;
                    i += 1;
                    j += 1;
                }
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
            }
        }
        dot.clamp(0.0, 1.0)
    }
}

/// Fitted character-n-gram TF-IDF vectorizer for one vocabulary's terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: AHashMap<String, u32>,
    idf: Vec<f32>,
    doc_count: usize,
}

impl TfidfVectorizer {
    /// Fit over every normalized term in a vocabulary.
    pub fn fit<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabulary: AHashMap<String, u32> = AHashMap::default();
        let mut doc_freq: Vec<u32> = Vec::new();
        let mut doc_count = 0usize;

        for term in terms {
            doc_count += 1;
            let mut seen = ahash::AHashSet::default();
            for gram in ngrams(term.as_ref()) {
                if seen.insert(gram.clone()) {
                    let next_id = vocabulary.len() as u32;
                    let id = *vocabulary.entry(gram).or_insert(next_id);
                    if id as usize == doc_freq.len() {
                        doc_freq.push(0);
                    }
                    doc_freq[id as usize] += 1;
                }
            }
        }

        let doc_count_f = doc_count.max(1) as f32;
        let idf = doc_freq
            .iter()
            .map(|&df| (doc_count_f / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        Self {
            vocabulary,
            idf,
            doc_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    /// Vectorize and L2-normalize a term against the fitted vocabulary.
    /// Grams outside the fitted vocabulary are ignored (out-of-vocabulary).
    pub fn vectorize(&self, term: &str) -> SparseVector {
        let mut tf: AHashMap<u32, f32> = AHashMap::default();
        for gram in ngrams(term) {
            if let Some(&id) = self.vocabulary.get(&gram) {
                *tf.entry(id).or_insert(0.0) += 1.0;
            }
        }
        let mut entries: Vec<(u32, f32)> = tf
            .into_iter()
            .map(|(id, count)| (id, count * self.idf[id as usize]))
            .collect();
        entries.sort_by_key(|(id, _)| *id);

        let norm = entries
            .iter()
            .map(|(_, w)| w * w)
            .sum::<f32>()
            .sqrt()
            .max(1e-9);
        for (_, w) in entries.iter_mut() {
            *w /= norm;
        }
        SparseVector { entries }
    }

    pub fn cosine(&self, a: &str, b: &str) -> f32 {
        self.vectorize(a).cosine_similarity(&self.vectorize(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_terms_score_near_one() {
        let v = TfidfVectorizer::fit(["myocardial infarction", "heart attack", "hypertension"]);
        let score = v.cosine("myocardial infarction", "myocardial infarction");
        assert!(score > 0.99, "expected ~1.0, got {score}");
    }

    #[test]
    fn unrelated_terms_score_low() {
        let v = TfidfVectorizer::fit(["myocardial infarction", "heart attack", "hypertension"]);
        let score = v.cosine("myocardial infarction", "hypertension");
        assert!(score < 0.3, "expected low similarity, got {score}");
    }

    #[test]
    fn empty_vectorizer_never_panics() {
        let v = TfidfVectorizer::fit(Vec::<String>::new());
        assert!(v.is_empty());
        assert_eq!(v.cosine("a", "b"), 0.0);
    }
}
