//! Two-tier result cache: an in-process hot LRU backed by a
//! persistent warm KV store, keyed by a SHA-256 hash of the pure-function
//! cache key tuple.

use lru::LruCache;
use redb::{ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::candidate::MappingResult;
use crate::error::{MapperError, MapperResult};
use crate::fuzzy::FuzzyAlgorithm;
use crate::system::System;

const CACHE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("cache");

/// Pure function of the inputs that determine a `MappingResult`. Sets are sorted before hashing so ordering never
/// affects the key.
#[derive(Debug, Clone, Serialize)]
struct CacheKeyTuple<'a> {
    normalized_term: &'a str,
    systems: Vec<System>,
    threshold_milli: u32,
    algorithms: Vec<FuzzyAlgorithm>,
    /// Hash of (detected_domain, sorted modifier types), not the raw
    /// surrounding text.
    context_fingerprint: u64,
    rules_version: u64,
}

pub fn cache_key(
    normalized_term: &str,
    systems: &[System],
    threshold: f32,
    algorithms: &[FuzzyAlgorithm],
    context_fingerprint: u64,
    rules_version: u64,
) -> String {
    let mut systems = systems.to_vec();
    systems.sort();
    let mut algorithms = algorithms.to_vec();
    algorithms.sort_by_key(|a| *a as u8);

    let tuple = CacheKeyTuple {
        normalized_term,
        systems,
        threshold_milli: (threshold.clamp(0.0, 1.0) * 1000.0).round() as u32,
        algorithms,
        context_fingerprint,
        rules_version,
    };

    let bytes = bincode::serialize(&tuple).expect("cache key tuple serializes");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").unwrap();
    }
    out
}

/// Hash of `(detected_domain, sorted modifier types)` only — raw
/// surrounding text is deliberately excluded.
pub fn context_fingerprint(domain: crate::system::Domain, modifier_types: &[crate::context::ModifierType]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut sorted: Vec<u8> = modifier_types.iter().map(|m| *m as u8).collect();
    sorted.sort_unstable();
    let mut hasher = ahash::AHasher::default();
    (domain as u8).hash(&mut hasher);
    sorted.hash(&mut hasher);
    hasher.finish()
}

struct Entry {
    result: MappingResult,
    expires_at_unix: u64,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Hot in-process LRU, TTL 3600s.
struct HotCache {
    lru: Mutex<LruCache<String, Entry>>,
    ttl_s: u64,
}

impl HotCache {
    fn new(capacity: usize, ttl_s: u64) -> Self {
        Self {
            lru: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            ttl_s,
        }
    }

    fn get(&self, key: &str) -> Option<MappingResult> {
        let mut lru = self.lru.lock().unwrap();
        match lru.get(key) {
            Some(entry) if entry.expires_at_unix > now_unix() => Some(entry.result.clone()),
            Some(_) => {
                lru.pop(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: String, result: MappingResult) {
        let expires_at_unix = now_unix() + self.ttl_s;
        self.lru.lock().unwrap().put(
            key,
            Entry {
                result,
                expires_at_unix,
            },
        );
    }
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    result: MappingResult,
    expires_at_unix: u64,
}

/// Warm file-backed KV, TTL 24h.
struct WarmCache {
    db: Arc<redb::Database>,
    ttl_s: u64,
}

impl WarmCache {
    fn open(path: &std::path::Path, ttl_s: u64) -> MapperResult<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| MapperError::cache("failed to create cache directory", e.into()))?;
        }
        let db = redb::Database::create(path)
            .map_err(|e| MapperError::cache("failed to open warm cache", e.into()))?;
        Ok(Self {
            db: Arc::new(db),
            ttl_s,
        })
    }

    fn get(&self, key: &str) -> MapperResult<Option<MappingResult>> {
        let read = self.db.begin_read().map_err(store_err)?;
        let table = match read.open_table(CACHE_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(store_err(e)),
        };
        let Some(bytes) = table.get(key).map_err(store_err)? else {
            return Ok(None);
        };
        let stored: StoredEntry = bincode::deserialize(bytes.value())
            .map_err(|e| MapperError::cache("corrupt warm cache entry", e.into()))?;
        if stored.expires_at_unix <= now_unix() {
            return Ok(None);
        }
        Ok(Some(stored.result))
    }

    fn put(&self, key: &str, result: &MappingResult) -> MapperResult<()> {
        let stored = StoredEntry {
            result: result.clone(),
            expires_at_unix: now_unix() + self.ttl_s,
        };
        let bytes = bincode::serialize(&stored)
            .map_err(|e| MapperError::cache("failed to serialize cache entry", e.into()))?;
        let write = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = write.open_table(CACHE_TABLE).map_err(store_err)?;
            table.insert(key, bytes.as_slice()).map_err(store_err)?;
        }
        write.commit().map_err(store_err)?;
        Ok(())
    }
}

fn store_err(e: impl Into<anyhow::Error>) -> MapperError {
    MapperError::cache("warm cache I/O failure", e.into())
}

/// The combined hot+warm cache. Cache errors are recovered to a
/// miss/no-store rather than propagated.
pub struct CacheLayer {
    hot: HotCache,
    warm: Option<WarmCache>,
}

impl CacheLayer {
    pub fn open(config: &crate::config::CacheConfig) -> Self {
        let warm = match WarmCache::open(&config.warm_path, config.ttl_warm_s) {
            Ok(w) => Some(w),
            Err(err) => {
                tracing::warn!(error = %err, "warm cache unavailable, running hot-only");
                None
            }
        };
        Self {
            hot: HotCache::new(config.hot_capacity, config.ttl_hot_s),
            warm,
        }
    }

    /// Probe order: hot -> warm -> miss. A warm hit repopulates
    /// the hot tier.
    pub fn get(&self, key: &str) -> Option<MappingResult> {
        if let Some(hit) = self.hot.get(key) {
            tracing::debug!(%key, tier = "hot", "cache hit");
            return Some(hit);
        }
        let warm = self.warm.as_ref()?;
        match warm.get(key) {
            Ok(Some(result)) => {
                tracing::debug!(%key, tier = "warm", "cache hit");
                self.hot.put(key.to_string(), result.clone());
                Some(result)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(%key, error = %err, "warm cache read failed, treating as miss");
                None
            }
        }
    }

    /// Writes populate both tiers.
    pub fn put(&self, key: &str, result: &MappingResult) {
        self.hot.put(key.to_string(), result.clone());
        if let Some(warm) = &self.warm {
            if let Err(err) = warm.put(key, result) {
                tracing::warn!(%key, error = %err, "warm cache write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_ignores_set_ordering() {
        let a = cache_key(
            "asthma",
            &[System::Snomed, System::Loinc],
            0.7,
            &[FuzzyAlgorithm::Levenshtein, FuzzyAlgorithm::Cosine],
            0,
            1,
        );
        let b = cache_key(
            "asthma",
            &[System::Loinc, System::Snomed],
            0.7,
            &[FuzzyAlgorithm::Cosine, FuzzyAlgorithm::Levenshtein],
            0,
            1,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_changes_with_rules_version() {
        let a = cache_key("asthma", &[System::Snomed], 0.7, &[], 0, 1);
        let b = cache_key("asthma", &[System::Snomed], 0.7, &[], 0, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn hot_cache_round_trips() {
        let hot = HotCache::new(10, 3600);
        let result = sample_result();
        hot.put("k".to_string(), result.clone());
        assert_eq!(hot.get("k").unwrap().term, result.term);
    }

    fn sample_result() -> MappingResult {
        MappingResult {
            term: "asthma".to_string(),
            per_system: Default::default(),
            total_matches: 0,
            processing_time_ms: 0.0,
            context: None,
            applied_rules: Vec::new(),
            processing_metadata: Default::default(),
        }
    }
}
