use anyhow::Result;

use medterm_core::{build_coordinator, Config, System};

pub fn run(config: Config, json: bool) -> Result<()> {
    let coordinator = build_coordinator(config).map_err(|e| anyhow::anyhow!("{e}"))?;
    let vocabulary = coordinator.vocabulary();

    if json {
        let systems: Vec<_> = System::ALL
            .iter()
            .map(|system| {
                serde_json::json!({
                    "system": system.as_str(),
                    "available": vocabulary.get(*system).is_some(),
                    "concept_count": vocabulary.get(*system).map(|s| s.concept_count()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&systems)?);
        return Ok(());
    }

    for system in System::ALL {
        match vocabulary.get(system) {
            Some(store) => println!("{system}: available, {} normalized entries", store.concept_count()),
            None => println!("{system}: unavailable (degraded)"),
        }
    }
    Ok(())
}
