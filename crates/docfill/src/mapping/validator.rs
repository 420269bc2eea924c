use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::mapping::Mapping;

/// Diagnostics for a mapping checked against a template and a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingValidation {
    pub valid: bool,
    /// Template placeholders with no assigned column.
    pub missing_placeholders: BTreeSet<String>,
    /// Assigned columns the dataset does not have.
    pub unknown_columns: BTreeSet<String>,
    /// Mapping keys the template does not declare.
    pub unknown_placeholders: BTreeSet<String>,
}

impl MappingValidation {
    pub fn into_result(self) -> Result<(), MappingError> {
        if self.valid {
            return Ok(());
        }
        Err(MappingError::IncompleteMapping {
            missing_placeholders: self.missing_placeholders,
            unknown_columns: self.unknown_columns,
            unknown_placeholders: self.unknown_placeholders,
        })
    }
}

/// Checks that `mapping` assigns every placeholder to an existing column
/// and names nothing the template does not declare. Fails closed.
pub fn validate_mapping(
    mapping: &Mapping,
    placeholders: &[String],
    columns: &[String],
) -> MappingValidation {
    let declared: HashSet<&str> = placeholders.iter().map(String::as_str).collect();
    let available: HashSet<&str> = columns.iter().map(String::as_str).collect();

    let missing_placeholders: BTreeSet<String> = placeholders
        .iter()
        .filter(|p| mapping.column_for(p).is_none())
        .cloned()
        .collect();

    let unknown_columns: BTreeSet<String> = mapping
        .iter()
        .filter(|(_, column)| !available.contains(column))
        .map(|(_, column)| column.to_string())
        .collect();

    let unknown_placeholders: BTreeSet<String> = mapping
        .placeholders()
        .filter(|p| !declared.contains(p))
        .map(str::to_string)
        .collect();

    MappingValidation {
        valid: missing_placeholders.is_empty()
            && unknown_columns.is_empty()
            && unknown_placeholders.is_empty(),
        missing_placeholders,
        unknown_columns,
        unknown_placeholders,
    }
}
