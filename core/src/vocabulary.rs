//! Embedded per-system vocabulary store.
//!
//! Each system is one `fst::Map<Vec<u8>>` (normalized term → bucket id) plus
//! one `redb::Database` holding the concept table (`code → Concept`,
//! bincode) and the normalized-term bucket table (`bucket_id → Vec<code>`,
//! bincode), following the fst+redb pairing this engine's index format is
//! modeled on. Read-only at runtime: the store never writes after `open`.

use fst::Map as FstMap;
use redb::{ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::concept::Concept;
use crate::error::{MapperError, MapperResult};
use crate::system::System;

const CONCEPTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("concepts");
const BUCKETS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("normalized_buckets");

/// One entry in the in-memory fuzzy candidate list: `(code, normalized_text,
/// display)` loaded into memory at store-open time.
#[derive(Debug, Clone)]
pub struct FuzzyTerm {
    pub code: String,
    pub normalized_text: String,
    pub display: String,
}

/// An opened, read-only index for a single coding system.
pub struct VocabularyStore {
    system: System,
    fst_map: FstMap<Vec<u8>>,
    db: Arc<redb::Database>,
    /// Sorted by `normalized_text` to support `search_prefix` via binary
    /// search without needing fst's automaton machinery.
    fuzzy_terms: Vec<FuzzyTerm>,
    vectorizer: Option<crate::tfidf::TfidfVectorizer>,
}

impl VocabularyStore {
    /// Open a previously built index: `<dir>/<system>.fst` + `<dir>/<system>.redb`.
    pub fn open(system: System, index_dir: &Path) -> MapperResult<Self> {
        let fst_path = index_dir.join(format!("{}.fst", system.slug()));
        let db_path = index_dir.join(format!("{}.redb", system.slug()));

        let fst_map = load_fst(&fst_path).map_err(|e| {
            MapperError::vocabulary_unavailable(
                format!("failed to load fst index for {system}"),
                e,
            )
        })?;

        let db = redb::Database::open(&db_path).map_err(|e| {
            MapperError::vocabulary_unavailable(
                format!("failed to open concept store for {system}"),
                anyhow::Error::new(e),
            )
        })?;
        let db = Arc::new(db);

        let fuzzy_terms = load_fuzzy_terms(&db).map_err(|e| {
            MapperError::vocabulary_unavailable(
                format!("failed to load fuzzy term list for {system}"),
                e,
            )
        })?;

        let vectorizer = if fuzzy_terms.is_empty() {
            None
        } else {
            Some(crate::tfidf::TfidfVectorizer::fit(
                fuzzy_terms.iter().map(|t| t.normalized_text.as_str()),
            ))
        };

        Ok(Self {
            system,
            fst_map,
            db,
            fuzzy_terms,
            vectorizer,
        })
    }

    pub fn system(&self) -> System {
        self.system
    }

    pub fn concept_count(&self) -> usize {
        self.fuzzy_terms.len()
    }

    pub fn vectorizer(&self) -> Option<&crate::tfidf::TfidfVectorizer> {
        self.vectorizer.as_ref()
    }

    pub fn fuzzy_terms(&self) -> &[FuzzyTerm] {
        &self.fuzzy_terms
    }

    /// `get_by_code`.
    pub fn get_by_code(&self, code: &str) -> MapperResult<Option<Concept>> {
        let read = self.db.begin_read().map_err(store_err)?;
        let table = match read.open_table(CONCEPTS_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(store_err(e)),
        };
        match table.get(code).map_err(store_err)? {
            Some(bytes) => {
                let concept: Concept = bincode::deserialize(bytes.value()).map_err(|e| {
                    MapperError::vocabulary_unavailable("corrupt concept record", e.into())
                })?;
                Ok(Some(concept))
            }
            None => Ok(None),
        }
    }

    /// `lookup_normalized`: exact hit on the normalized index,
    /// one-to-many.
    pub fn lookup_normalized(&self, normalized_text: &str) -> MapperResult<Vec<Concept>> {
        let Some(bucket_id) = self.fst_map.get(normalized_text) else {
            return Ok(Vec::new());
        };

        let read = self.db.begin_read().map_err(store_err)?;
        let buckets = match read.open_table(BUCKETS_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(store_err(e)),
        };
        let codes: Vec<String> = match buckets.get(bucket_id).map_err(store_err)? {
            Some(bytes) => bincode::deserialize(bytes.value())
                .map_err(|e| MapperError::vocabulary_unavailable("corrupt bucket record", e.into()))?,
            None => return Ok(Vec::new()),
        };

        let mut concepts = Vec::with_capacity(codes.len());
        for code in codes {
            if let Some(concept) = self.get_by_code(&code)? {
                concepts.push(concept);
            }
        }
        Ok(concepts)
    }

    /// `iter_terms`.
    pub fn iter_terms(&self) -> impl Iterator<Item = &str> {
        self.fuzzy_terms.iter().map(|t| t.normalized_text.as_str())
    }

    /// `search_prefix`: terms whose normalized text starts with
    /// `prefix`, up to `limit`.
    pub fn search_prefix(&self, prefix: &str, limit: usize) -> Vec<&FuzzyTerm> {
        self.fuzzy_terms
            .iter()
            .filter(|t| t.normalized_text.starts_with(prefix))
            .take(limit)
            .collect()
    }
}

fn load_fst(path: &Path) -> anyhow::Result<FstMap<Vec<u8>>> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(FstMap::new(buf)?)
}

fn load_fuzzy_terms(db: &redb::Database) -> anyhow::Result<Vec<FuzzyTerm>> {
    let read = db.begin_read()?;
    let table = match read.open_table(CONCEPTS_TABLE) {
        Ok(t) => t,
        Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut terms = Vec::new();
    for row in table.iter()? {
        let (code, bytes) = row?;
        let concept: Concept = bincode::deserialize(bytes.value())?;
        for normalized in &concept.normalized_forms {
            terms.push(FuzzyTerm {
                code: code.value().to_string(),
                normalized_text: normalized.clone(),
                display: concept.display.clone(),
            });
        }
    }
    terms.sort_by(|a, b| a.normalized_text.cmp(&b.normalized_text));
    Ok(terms)
}

fn store_err(e: impl Into<anyhow::Error>) -> MapperError {
    MapperError::vocabulary_unavailable("vocabulary store I/O failure", e.into())
}

/// Registry of every configured system's opened store, with per-system
/// open failures recorded rather than aborting the whole engine.
pub struct VocabularyRegistry {
    stores: HashMap<System, VocabularyStore>,
    degraded: Vec<System>,
}

impl VocabularyRegistry {
    pub fn open_all(index_dir: &Path) -> Self {
        let mut stores = HashMap::new();
        let mut degraded = Vec::new();
        for system in System::ALL {
            match VocabularyStore::open(system, index_dir) {
                Ok(store) => {
                    stores.insert(system, store);
                }
                Err(err) => {
                    tracing::warn!(%system, error = %err, "vocabulary unavailable, system degraded");
                    degraded.push(system);
                }
            }
        }
        Self { stores, degraded }
    }

    pub fn get(&self, system: System) -> Option<&VocabularyStore> {
        self.stores.get(&system)
    }

    pub fn degraded_systems(&self) -> &[System] {
        &self.degraded
    }

    pub fn available_systems(&self) -> Vec<System> {
        self.stores.keys().copied().collect()
    }
}

/// Location of the on-disk index directory plus the parsed `mapping_config.json`
///.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct MappingConfig {
    pub systems: Vec<SystemDescriptor>,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct SystemDescriptor {
    pub name: String,
    pub display_uri: String,
}

impl MappingConfig {
    pub fn load(index_dir: &Path) -> MapperResult<Self> {
        let path = index_dir.join("mapping_config.json");
        let content = std::fs::read_to_string(&path).map_err(|e| {
            MapperError::vocabulary_unavailable(
                format!("failed to read {}", path.display()),
                e.into(),
            )
        })?;
        serde_json::from_str(&content).map_err(|e| {
            MapperError::vocabulary_unavailable("malformed mapping_config.json", e.into())
        })
    }
}

/// Where on disk the index directory lives, kept separate from `Config` so
/// that tests can point at a temp dir without constructing a full `Config`.
pub fn default_index_dir(data_dir: &Path) -> PathBuf {
    data_dir.to_path_buf()
}
