pub mod matcher;
pub mod synonyms;
pub mod validator;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use matcher::{Confidence, FieldMatcher, MatchSuggestion, Suggestions};
pub use synonyms::{SynonymGroup, SynonymTable};
pub use validator::{validate_mapping, MappingValidation};

/// Placeholder name to column name.
///
/// A plain value: edits produce a new mapping that is validated again
/// rather than changing one in place. Keys are unique by construction;
/// several placeholders may read the same column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping {
    assignments: BTreeMap<String, String>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with `placeholder` assigned to `column`, replacing any
    /// previous assignment.
    pub fn with_assignment(&self, placeholder: impl Into<String>, column: impl Into<String>) -> Self {
        let mut assignments = self.assignments.clone();
        assignments.insert(placeholder.into(), column.into());
        Self { assignments }
    }

    /// Returns a copy without an assignment for `placeholder`.
    pub fn without(&self, placeholder: &str) -> Self {
        let mut assignments = self.assignments.clone();
        assignments.remove(placeholder);
        Self { assignments }
    }

    pub fn column_for(&self, placeholder: &str) -> Option<&str> {
        self.assignments.get(placeholder).map(String::as_str)
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.assignments.keys().map(String::as_str)
    }

    /// Distinct columns referenced by the mapping.
    pub fn columns(&self) -> BTreeSet<&str> {
        self.assignments.values().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assignments
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl<P: Into<String>, C: Into<String>> FromIterator<(P, C)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        Self {
            assignments: iter
                .into_iter()
                .map(|(p, c)| (p.into(), c.into()))
                .collect(),
        }
    }
}
