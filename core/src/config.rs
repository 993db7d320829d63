//! Configuration surface: a serde-serializable struct with `Default`,
//! loadable/savable as TOML.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::fuzzy::FuzzyAlgorithm;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub hot_capacity: usize,
    pub warm_path: PathBuf,
    pub ttl_hot_s: u64,
    pub ttl_warm_s: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_capacity: 10_000,
            warm_path: PathBuf::from("data/cache/warm.redb"),
            ttl_hot_s: 3600,
            ttl_warm_s: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkersConfig {
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            // min(cpu*2+4, configured_max); configured_max
            // defaults to a generous ceiling and is clamped at pool-build time.
            max: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FuzzyConfig {
    pub enabled_algorithms: HashSet<FuzzyAlgorithm>,
    pub default_threshold: f32,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            enabled_algorithms: FuzzyAlgorithm::all().into_iter().collect(),
            default_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    pub enabled: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Top-level configuration object. Unknown keys under `api.*` are collected
/// verbatim: they are surfaces used by external collaborators (rate
/// limiting, etc.) that the core ignores but must round-trip without
/// failing to parse.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub rules_db: PathBuf,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub fuzzy: FuzzyConfig,
    #[serde(default)]
    pub context: ContextConfig,
    /// Passthrough surface for `api.rate_limit_*` and similar options used
    /// only by external collaborators (REST framing, auth). Ignored here.
    #[serde(default)]
    pub api: HashMap<String, String>,
    /// Soft per-term deadline in milliseconds.
    /// `None` falls back to the built-in default.
    #[serde(default)]
    pub term_deadline_ms: Option<u128>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/terminology"),
            rules_db: PathBuf::from("data/rules.redb"),
            cache: CacheConfig::default(),
            workers: WorkersConfig::default(),
            fuzzy: FuzzyConfig::default(),
            context: ContextConfig::default(),
            api: HashMap::new(),
            term_deadline_ms: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Worker pool size: `min(cpu*2+4, configured_max)`.
    pub fn resolved_worker_count(&self) -> usize {
        let cpu_based = num_cpus_hint() * 2 + 4;
        cpu_based.min(self.workers.max).max(1)
    }
}

/// Cheap CPU count estimate without pulling in a dedicated crate: std's
/// `available_parallelism` is the idiomatic stdlib entry point for this.
fn num_cpus_hint() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let cfg = Config::default();
        let s = cfg.to_toml_string().unwrap();
        let back = Config::from_toml_str(&s).unwrap();
        assert_eq!(cfg.data_dir, back.data_dir);
        assert_eq!(cfg.cache.hot_capacity, back.cache.hot_capacity);
    }

    #[test]
    fn worker_count_is_clamped() {
        let mut cfg = Config::default();
        cfg.workers.max = 2;
        assert_eq!(cfg.resolved_worker_count(), 2);
    }
}
