//! Coded concepts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::system::System;

/// Identity of a coded entry in a vocabulary. Immutable once indexed: the
/// only way to change a concept is an offline index rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub code: String,
    pub system: System,
    pub display: String,
    pub normalized_forms: Vec<String>,
    pub attributes: HashMap<String, String>,
}

impl Concept {
    pub fn new(code: impl Into<String>, system: System, display: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            system,
            display: display.into(),
            normalized_forms: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_normalized_forms(mut self, forms: Vec<String>) -> Self {
        self.normalized_forms = forms;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}
