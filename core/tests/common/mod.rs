//! Shared fixture builder for integration tests: writes a minimal on-disk
//! index directory in the same format `tools/build-index` produces, so
//! tests exercise `VocabularyStore::open`/`VocabularyRegistry::open_all`
//! against real files rather than mocks.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use fst::MapBuilder;
use redb::{Database, TableDefinition};

use medterm_core::{Concept, MappingConfig, System, SystemDescriptor};

const CONCEPTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("concepts");
const BUCKETS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("normalized_buckets");

/// One fixture concept: code, display, and the normalized forms it should
/// be reachable by (first form is treated as canonical for fst lookup).
pub struct FixtureConcept {
    pub code: &'static str,
    pub display: &'static str,
    pub normalized_forms: Vec<&'static str>,
}

pub fn concept(code: &'static str, display: &'static str, forms: &[&'static str]) -> FixtureConcept {
    FixtureConcept {
        code,
        display,
        normalized_forms: forms.to_vec(),
    }
}

/// Build `<dir>/<system>.fst` + `<dir>/<system>.redb` for each given
/// system, plus a shared `mapping_config.json`.
pub fn build_index_dir(dir: &Path, systems: &[(System, Vec<FixtureConcept>)]) {
    let mut descriptors = Vec::new();

    for (system, concepts) in systems {
        let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut rows: Vec<(String, Concept)> = Vec::new();

        for c in concepts {
            for form in &c.normalized_forms {
                buckets
                    .entry(form.to_string())
                    .or_default()
                    .push(c.code.to_string());
            }
            let concept = Concept::new(c.code, *system, c.display)
                .with_normalized_forms(c.normalized_forms.iter().map(|s| s.to_string()).collect());
            rows.push((c.code.to_string(), concept));
        }

        let fst_path = dir.join(format!("{}.fst", system.slug()));
        let db_path = dir.join(format!("{}.redb", system.slug()));

        let mut builder = MapBuilder::memory();
        let mut bucket_codes: Vec<Vec<String>> = Vec::with_capacity(buckets.len());
        for (bucket_id, (text, codes)) in buckets.into_iter().enumerate() {
            builder.insert(&text, bucket_id as u64).unwrap();
            bucket_codes.push(codes);
        }
        let bytes = builder.into_inner().unwrap();
        File::create(&fst_path).unwrap().write_all(&bytes).unwrap();

        let db = Database::create(&db_path).unwrap();
        let write = db.begin_write().unwrap();
        {
            let mut concepts_table = write.open_table(CONCEPTS_TABLE).unwrap();
            for (code, concept) in &rows {
                let bytes = bincode::serialize(concept).unwrap();
                concepts_table.insert(code.as_str(), bytes.as_slice()).unwrap();
            }
            let mut buckets_table = write.open_table(BUCKETS_TABLE).unwrap();
            for (bucket_id, codes) in bucket_codes.iter().enumerate() {
                let bytes = bincode::serialize(codes).unwrap();
                buckets_table.insert(&(bucket_id as u64), bytes.as_slice()).unwrap();
            }
        }
        write.commit().unwrap();

        descriptors.push(SystemDescriptor {
            name: system.as_str().to_string(),
            display_uri: format!("urn:test:{}", system.slug()),
        });
    }

    let config = MappingConfig { systems: descriptors };
    let content = serde_json::to_string_pretty(&config).unwrap();
    std::fs::write(dir.join("mapping_config.json"), content).unwrap();
}
