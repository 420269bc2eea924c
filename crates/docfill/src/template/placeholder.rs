//! The fixed `{{name}}` placeholder convention.
//!
//! Names consist of Unicode word characters (letters, digits, `_`, which
//! covers CJK field names) and `-`, optionally separated by single spaces.
//! Whitespace just inside the braces is ignored, so `{{ 金额 }}` and
//! `{{金额}}` name the same placeholder. Changing this pattern is a
//! breaking format change.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static PLACEHOLDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{[ \t]*([\w\-]+(?: [\w\-]+)*)[ \t]*\}\}").expect("placeholder pattern is valid")
});

/// A placeholder occurrence inside a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMatch<'a> {
    /// Byte range of the whole `{{...}}` token.
    pub span: Range<usize>,
    /// The trimmed placeholder name.
    pub name: &'a str,
}

/// Iterates over placeholder occurrences in `text`, in order.
pub fn find_placeholders(text: &str) -> impl Iterator<Item = PlaceholderMatch<'_>> {
    PLACEHOLDER_PATTERN.captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        let name = caps.get(1)?;
        Some(PlaceholderMatch {
            span: whole.range(),
            name: name.as_str(),
        })
    })
}

/// Replaces every placeholder in `text` whose name `lookup` resolves.
/// Unresolved placeholders are left untouched.
pub fn replace_placeholders<'t, F>(text: &'t str, mut lookup: F) -> std::borrow::Cow<'t, str>
where
    F: FnMut(&str) -> Option<String>,
{
    PLACEHOLDER_PATTERN.replace_all(text, |caps: &regex::Captures<'_>| {
        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        lookup(name).unwrap_or_else(|| caps[0].to_string())
    })
}

/// Ordered, de-duplicated collection of placeholder names.
/// Order is first occurrence.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderSet {
    names: Vec<String>,
    seen: HashSet<String>,
}

impl PlaceholderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str) {
        if !self.seen.contains(name) {
            self.seen.insert(name.to_string());
            self.names.push(name.to_string());
        }
    }

    /// Adds every placeholder found in `text`.
    pub fn scan(&mut self, text: &str) {
        for m in find_placeholders(text) {
            self.insert(m.name);
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(text: &str) -> Vec<String> {
        let mut set = PlaceholderSet::new();
        set.scan(text);
        set.into_vec()
    }

    #[test]
    fn test_extracts_in_first_occurrence_order() {
        assert_eq!(
            names("Dear {{customer_name}}, invoice {{invoice_no}} for {{customer_name}}."),
            vec!["customer_name", "invoice_no"]
        );
    }

    #[test]
    fn test_cjk_names() {
        assert_eq!(
            names("客户：{{客户名称}}，金额：{{金额}}元"),
            vec!["客户名称", "金额"]
        );
    }

    #[test]
    fn test_inner_whitespace_is_trimmed() {
        assert_eq!(names("{{ amount }} and {{amount}}"), vec!["amount"]);
        assert_eq!(names("{{first name}}"), vec!["first name"]);
    }

    #[test]
    fn test_hyphen_and_digits() {
        assert_eq!(names("{{line-1}} {{item_2}}"), vec!["line-1", "item_2"]);
    }

    #[test]
    fn test_rejects_non_placeholders() {
        assert!(names("{single} {{}} {{ }} {{a.b}} {{a\nb}}").is_empty());
    }

    #[test]
    fn test_no_placeholders_is_empty() {
        assert!(names("plain text").is_empty());
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let text = "{{b}} {{a}} {{b}} {{c}}";
        assert_eq!(names(text), names(text));
    }

    #[test]
    fn test_replace_leaves_unknown() {
        let out = replace_placeholders("{{a}}-{{ b }}-{{c}}", |name| match name {
            "a" => Some("1".to_string()),
            "b" => Some("2".to_string()),
            _ => None,
        });
        assert_eq!(out, "1-2-{{c}}");
    }
}
