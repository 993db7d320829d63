//! Coding systems and clinical domains.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A coded vocabulary. Extensible by configuration in principle,
/// but the three standard systems are built in since `mapping_config.json`
/// enumerates them for every index build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum System {
    Snomed,
    Loinc,
    RxNorm,
}

impl System {
    pub const ALL: [System; 3] = [System::Snomed, System::Loinc, System::RxNorm];

    pub fn as_str(&self) -> &'static str {
        match self {
            System::Snomed => "SNOMED",
            System::Loinc => "LOINC",
            System::RxNorm => "RxNorm",
        }
    }

    /// Lowercase file-system-safe slug, used for index file names
    /// (`snomed.fst`/`snomed.redb`, `loinc.fst`/`loinc.redb`, etc).
    pub fn slug(&self) -> &'static str {
        match self {
            System::Snomed => "snomed",
            System::Loinc => "loinc",
            System::RxNorm => "rxnorm",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            System::Snomed => "SNOMED CT",
            System::Loinc => "LOINC",
            System::RxNorm => "RxNorm",
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for System {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snomed" | "snomed_ct" | "snomed-ct" => Ok(System::Snomed),
            "loinc" => Ok(System::Loinc),
            "rxnorm" | "rx_norm" | "rx-norm" => Ok(System::RxNorm),
            other => Err(other.to_string()),
        }
    }
}

/// Coarse clinical specialty label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    Cardiology,
    Pulmonology,
    Endocrinology,
    Neurology,
    Psychiatry,
    Gastroenterology,
    Nephrology,
    Rheumatology,
    Oncology,
    Laboratory,
    Pharmacy,
    General,
}

impl Domain {
    pub const ALL: [Domain; 12] = [
        Domain::Cardiology,
        Domain::Pulmonology,
        Domain::Endocrinology,
        Domain::Neurology,
        Domain::Psychiatry,
        Domain::Gastroenterology,
        Domain::Nephrology,
        Domain::Rheumatology,
        Domain::Oncology,
        Domain::Laboratory,
        Domain::Pharmacy,
        Domain::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Cardiology => "CARDIOLOGY",
            Domain::Pulmonology => "PULMONOLOGY",
            Domain::Endocrinology => "ENDOCRINOLOGY",
            Domain::Neurology => "NEUROLOGY",
            Domain::Psychiatry => "PSYCHIATRY",
            Domain::Gastroenterology => "GASTROENTEROLOGY",
            Domain::Nephrology => "NEPHROLOGY",
            Domain::Rheumatology => "RHEUMATOLOGY",
            Domain::Oncology => "ONCOLOGY",
            Domain::Laboratory => "LABORATORY",
            Domain::Pharmacy => "PHARMACY",
            Domain::General => "GENERAL",
        }
    }

    /// Whether candidates from `system` are considered aligned with this
    /// domain, driving the context confidence boost.
    pub fn aligns_with_system(&self, system: System) -> bool {
        matches!(
            (self, system),
            (Domain::Laboratory, System::Loinc) | (Domain::Pharmacy, System::RxNorm)
        ) || (!matches!(self, Domain::Laboratory | Domain::Pharmacy) && system == System::Snomed)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_uppercase();
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or(s)
    }
}
