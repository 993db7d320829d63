//! Phonetic matching.
//!
//! Soundex and Metaphone codes over the first token and the full string,
//! via `rphonetic`.

use rphonetic::{Encoder, Metaphone, Soundex};

/// Score produced when any phonetic encoding matches.
pub const PHONETIC_MATCH_SCORE: f32 = 0.85;

pub struct PhoneticMatcher {
    soundex: Soundex,
    metaphone: Metaphone,
}

impl Default for PhoneticMatcher {
    fn default() -> Self {
        Self {
            soundex: Soundex::default(),
            metaphone: Metaphone::default(),
        }
    }
}

impl PhoneticMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `a` and `b` share a Soundex or Metaphone code, checked both
    /// on the first whitespace token and on the full string.
    pub fn matches(&self, a: &str, b: &str) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        self.encode_matches(a, b) || self.encode_matches(first_token(a), first_token(b))
    }

    /// `PHONETIC_MATCH_SCORE` on any encoding match, else 0.
    pub fn score(&self, a: &str, b: &str) -> f32 {
        if self.matches(a, b) {
            PHONETIC_MATCH_SCORE
        } else {
            0.0
        }
    }

    fn encode_matches(&self, a: &str, b: &str) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        self.soundex.encode(a) == self.soundex.encode(b)
            || self.metaphone.encode(a) == self.metaphone.encode(b)
    }
}

fn first_token(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_phonetically_similar_terms() {
        let m = PhoneticMatcher::new();
        assert!(m.matches("diabetes", "diabetis"));
    }

    #[test]
    fn distinct_terms_do_not_match() {
        let m = PhoneticMatcher::new();
        assert!(!m.matches("hypertension", "asthma"));
    }

    #[test]
    fn empty_strings_never_match() {
        let m = PhoneticMatcher::new();
        assert!(!m.matches("", "anything"));
        assert_eq!(m.score("", "x"), 0.0);
    }
}
