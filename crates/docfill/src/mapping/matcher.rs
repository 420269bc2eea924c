//! Confidence-scored column suggestions for template placeholders.
//!
//! Every placeholder is matched on its own against all columns; the best
//! tier wins and ties keep the earliest column. Suggestions are advisory and
//! never become a mapping without review.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mapping::synonyms::SynonymTable;
use crate::mapping::Mapping;

/// How sure the matcher is about a suggested column. Ordered from `None`
/// (lowest) to `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn score(&self) -> f64 {
        match self {
            Confidence::High => 1.0,
            Confidence::Medium => 0.7,
            Confidence::Low => 0.4,
            Confidence::None => 0.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            "none" => Some(Confidence::None),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::None => "none",
        };
        f.write_str(name)
    }
}

const MEDIUM_SIMILARITY: f64 = 0.9;
const LOW_SIMILARITY: f64 = 0.7;

/// Trims, case-folds and keeps only alphanumeric characters.
pub fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Jaro-Winkler similarity of two normalized names, as a tier. Catches
/// typos and near-miss spellings; never `High`.
fn similarity_tier(a: &str, b: &str) -> Confidence {
    let similarity = strsim::jaro_winkler(a, b);
    if similarity >= MEDIUM_SIMILARITY {
        Confidence::Medium
    } else if similarity >= LOW_SIMILARITY {
        Confidence::Low
    } else {
        Confidence::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub placeholder: String,
    pub column: Option<String>,
    pub confidence: Confidence,
}

impl MatchSuggestion {
    fn unmatched(placeholder: &str) -> Self {
        Self {
            placeholder: placeholder.to_string(),
            column: None,
            confidence: Confidence::None,
        }
    }
}

/// Suggestions for a set of placeholders, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Suggestions {
    items: Vec<MatchSuggestion>,
}

impl Suggestions {
    pub fn get(&self, placeholder: &str) -> Option<&MatchSuggestion> {
        self.items.iter().find(|s| s.placeholder == placeholder)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchSuggestion> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mean tier score over all placeholders; 0.0 when there are none.
    pub fn overall_confidence(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        let total: f64 = self.items.iter().map(|s| s.confidence.score()).sum();
        total / self.items.len() as f64
    }

    /// Builds a draft mapping from suggestions at or above `min`.
    pub fn to_mapping(&self, min: Confidence) -> Mapping {
        self.items
            .iter()
            .filter(|s| s.confidence >= min && s.confidence > Confidence::None)
            .filter_map(|s| s.column.as_ref().map(|c| (s.placeholder.clone(), c.clone())))
            .collect()
    }
}

impl IntoIterator for Suggestions {
    type Item = MatchSuggestion;
    type IntoIter = std::vec::IntoIter<MatchSuggestion>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Suggestions {
    type Item = &'a MatchSuggestion;
    type IntoIter = std::slice::Iter<'a, MatchSuggestion>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Stateless apart from its read-only synonym table; safe to share.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    synonyms: SynonymTable,
}

impl Default for FieldMatcher {
    fn default() -> Self {
        Self::new(SynonymTable::builtin())
    }
}

impl FieldMatcher {
    pub fn new(synonyms: SynonymTable) -> Self {
        Self { synonyms }
    }

    /// Scores a placeholder against one column name.
    pub fn score(&self, placeholder: &str, column: &str) -> Confidence {
        if placeholder.to_lowercase() == column.to_lowercase() {
            return Confidence::High;
        }

        let p = normalize(placeholder);
        let c = normalize(column);
        if p.is_empty() || c.is_empty() {
            return Confidence::None;
        }
        if p == c {
            return Confidence::High;
        }

        let (short, long) = if p.len() <= c.len() { (&p, &c) } else { (&c, &p) };
        if long.contains(short.as_str()) {
            return Confidence::Medium;
        }

        if self.synonyms.exact_group(&p, &c).is_some() {
            return Confidence::Medium;
        }
        let overlap = if self.synonyms.overlapping_group(&p, &c).is_some() {
            Confidence::Low
        } else {
            Confidence::None
        };

        overlap.max(similarity_tier(&p, &c))
    }

    /// Best column for one placeholder.
    pub fn match_field(&self, placeholder: &str, columns: &[String]) -> MatchSuggestion {
        let mut best: Option<(&String, Confidence)> = None;

        for column in columns {
            let confidence = self.score(placeholder, column);
            if confidence == Confidence::None {
                continue;
            }
            let better = match best {
                Some((_, current)) => confidence > current,
                None => true,
            };
            if better {
                best = Some((column, confidence));
                if confidence == Confidence::High {
                    break;
                }
            }
        }

        match best {
            Some((column, confidence)) => MatchSuggestion {
                placeholder: placeholder.to_string(),
                column: Some(column.clone()),
                confidence,
            },
            None => MatchSuggestion::unmatched(placeholder),
        }
    }

    pub fn suggest(&self, placeholders: &[String], columns: &[String]) -> Suggestions {
        Suggestions {
            items: placeholders
                .iter()
                .map(|p| self.match_field(p, columns))
                .collect(),
        }
    }
}
