//! Query Optimizer: batches same-system/same-threshold lookups
//! into a single pass, and keeps a short-TTL memo of raw vocabulary rows
//! distinct from the Cache Layer's finished-`MappingResult` cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::concept::Concept;
use crate::system::System;

/// Batch threshold: once a group of terms
/// targeting the same system reaches this size, the coordinator issues one
/// `batch_lookup_normalized` instead of N individual lookups.
pub const DEFAULT_BATCH_THRESHOLD: usize = 32;

/// Short-lived memo entry, default TTL 5 minutes.
struct Memo {
    concepts: Vec<Concept>,
    expires_at: Instant,
}

pub struct QueryOptimizer {
    memo: Mutex<HashMap<(System, String), Memo>>,
    ttl: Duration,
    batch_threshold: usize,
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60), DEFAULT_BATCH_THRESHOLD)
    }
}

impl QueryOptimizer {
    pub fn new(ttl: Duration, batch_threshold: usize) -> Self {
        Self {
            memo: Mutex::new(HashMap::new()),
            ttl,
            batch_threshold,
        }
    }

    pub fn batch_threshold(&self) -> usize {
        self.batch_threshold
    }

    /// Groups `(system, normalized_term)` pairs that target the same
    /// system, so callers at/above `batch_threshold` can issue a single
    /// IN-clause-style `batch_lookup_normalized`.
    pub fn group_by_system<'a>(
        &self,
        requests: &'a [(System, String)],
    ) -> HashMap<System, Vec<&'a str>> {
        let mut groups: HashMap<System, Vec<&'a str>> = HashMap::new();
        for (system, term) in requests {
            groups.entry(*system).or_default().push(term.as_str());
        }
        groups
    }

    /// Run `batch_lookup_normalized` against the store for one system,
    /// memoizing the raw concept rows for `ttl`.
    pub fn batch_lookup_normalized(
        &self,
        store: &crate::vocabulary::VocabularyStore,
        system: System,
        terms: &[&str],
    ) -> Vec<(String, Vec<Concept>)> {
        let mut out = Vec::with_capacity(terms.len());
        for &term in terms {
            let key = (system, term.to_string());
            if let Some(hit) = self.memo_get(&key) {
                out.push((term.to_string(), hit));
                continue;
            }
            let concepts = store.lookup_normalized(term).unwrap_or_default();
            self.memo_put(key, concepts.clone());
            out.push((term.to_string(), concepts));
        }
        out
    }

    fn memo_get(&self, key: &(System, String)) -> Option<Vec<Concept>> {
        let mut memo = self.memo.lock().unwrap();
        match memo.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.concepts.clone()),
            Some(_) => {
                memo.remove(key);
                None
            }
            None => None,
        }
    }

    fn memo_put(&self, key: (System, String), concepts: Vec<Concept>) {
        let mut memo = self.memo.lock().unwrap();
        memo.insert(
            key,
            Memo {
                concepts,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_requests_by_system() {
        let optimizer = QueryOptimizer::default();
        let requests = vec![
            (System::Snomed, "asthma".to_string()),
            (System::Loinc, "glucose".to_string()),
            (System::Snomed, "hypertension".to_string()),
        ];
        let groups = optimizer.group_by_system(&requests);
        assert_eq!(groups.get(&System::Snomed).unwrap().len(), 2);
        assert_eq!(groups.get(&System::Loinc).unwrap().len(), 1);
    }
}
