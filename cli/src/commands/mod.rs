pub mod batch;
pub mod info;
pub mod map;
pub mod rules;
pub mod stats;

use std::str::FromStr;

use medterm_core::{AlgorithmSelector, FuzzyAlgorithm, System, SystemSelector};

/// Parses `--systems snomed,loinc` into a `SystemSelector`; an absent or
/// empty flag means "all configured systems".
pub fn parse_systems(raw: &Option<String>) -> anyhow::Result<SystemSelector> {
    match raw {
        None => Ok(SystemSelector::All),
        Some(s) if s.trim().is_empty() || s.eq_ignore_ascii_case("all") => Ok(SystemSelector::All),
        Some(s) => {
            let systems = s
                .split(',')
                .map(|part| System::from_str(part.trim()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|bad| anyhow::anyhow!("unrecognized system '{bad}'"))?;
            Ok(SystemSelector::Only(systems))
        }
    }
}

/// Parses `--algorithms levenshtein,jaro_winkler` into an `AlgorithmSelector`.
pub fn parse_algorithms(raw: &Option<String>) -> anyhow::Result<AlgorithmSelector> {
    match raw {
        None => Ok(AlgorithmSelector::All),
        Some(s) if s.trim().is_empty() || s.eq_ignore_ascii_case("all") => Ok(AlgorithmSelector::All),
        Some(s) => {
            let algos = s
                .split(',')
                .map(|part| FuzzyAlgorithm::from_str(part.trim()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|bad| anyhow::anyhow!("unrecognized algorithm '{bad}'"))?;
            Ok(AlgorithmSelector::Only(algos))
        }
    }
}
