//! Keyword table used by the field matcher.
//!
//! Each group lists terms that name the same business concept. The built-in
//! table covers common Chinese business terms and their English
//! equivalents; configuration can add groups or replace the table.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mapping::matcher::normalize;

/// Minimum length, in characters, for a term to count as contained in a
/// longer name.
const MIN_PARTIAL_CHARS: usize = 2;

const BUILTIN_GROUPS: &[(&str, &[&str])] = &[
    (
        "名称",
        &["名称", "姓名", "名字", "客户", "用户", "公司", "单位", "name", "customer", "client", "company"],
    ),
    ("姓名", &["姓名", "名称", "名字", "联系人", "fullname", "contact"]),
    ("日期", &["日期", "时间", "年月日", "日期时间", "date", "time", "datetime", "day"]),
    (
        "金额",
        &["金额", "价格", "费用", "总价", "合计", "小计", "数值", "amount", "price", "cost", "fee", "total", "sum", "value"],
    ),
    ("数量", &["数量", "数目", "个数", "件数", "quantity", "qty", "count"]),
    ("地址", &["地址", "位置", "地点", "住址", "address", "location"]),
    (
        "电话",
        &["电话", "手机", "联系方式", "移动电话", "座机", "phone", "telephone", "tel", "mobile"],
    ),
    ("邮箱", &["邮箱", "电子邮件", "email", "mail"]),
];

/// A configured synonym group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymGroup {
    pub key: String,
    pub terms: Vec<String>,
}

impl SynonymGroup {
    pub fn new(key: impl Into<String>, terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            key: key.into(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key.trim().is_empty() {
            return Err(ConfigError::InvalidSynonymGroup {
                key: self.key.clone(),
                reason: "key must not be empty".to_string(),
            });
        }
        if self.terms.iter().all(|t| normalize(t).is_empty()) {
            return Err(ConfigError::InvalidSynonymGroup {
                key: self.key.clone(),
                reason: "group needs at least one non-empty term".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct NormalizedGroup {
    key: String,
    terms: Vec<String>,
}

/// Normalized synonym groups, ready for lookups.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    groups: Vec<NormalizedGroup>,
}

impl SynonymTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for (key, terms) in BUILTIN_GROUPS {
            table.add_group(&SynonymGroup::new(*key, terms.iter().copied()));
        }
        table
    }

    /// Builds the table from configuration: the built-in groups (optional)
    /// followed by the configured ones.
    pub fn from_groups(include_builtin: bool, groups: &[SynonymGroup]) -> Result<Self, ConfigError> {
        let mut table = if include_builtin {
            Self::builtin()
        } else {
            Self::empty()
        };
        for group in groups {
            group.validate()?;
            table.add_group(group);
        }
        Ok(table)
    }

    /// Appends a group. A group whose key already exists is merged into it.
    pub fn add_group(&mut self, group: &SynonymGroup) {
        let terms: Vec<String> = group
            .terms
            .iter()
            .map(|t| normalize(t))
            .filter(|t| !t.is_empty())
            .collect();

        if let Some(existing) = self.groups.iter_mut().find(|g| g.key == group.key) {
            for term in terms {
                if !existing.terms.contains(&term) {
                    existing.terms.push(term);
                }
            }
            return;
        }

        self.groups.push(NormalizedGroup {
            key: group.key.clone(),
            terms,
        });
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns the key of a group that lists both normalized names as terms.
    pub fn exact_group(&self, a: &str, b: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.terms.iter().any(|t| t == a) && g.terms.iter().any(|t| t == b))
            .map(|g| g.key.as_str())
    }

    /// Returns the key of a group whose terms overlap both normalized names,
    /// where overlap means one string contains the other.
    pub fn overlapping_group(&self, a: &str, b: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| overlaps(&g.terms, a) && overlaps(&g.terms, b))
            .map(|g| g.key.as_str())
    }
}

fn overlaps(terms: &[String], name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    terms.iter().any(|term| {
        let (short, long) = if term.len() <= name.len() {
            (term.as_str(), name)
        } else {
            (name, term.as_str())
        };
        short.chars().count() >= MIN_PARTIAL_CHARS && long.contains(short)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_exact_group() {
        let table = SynonymTable::builtin();
        assert_eq!(table.exact_group("金额", "amount"), Some("金额"));
        assert_eq!(table.exact_group("date", "time"), Some("日期"));
        assert_eq!(table.exact_group("金额", "日期"), None);
    }

    #[test]
    fn test_overlapping_group() {
        let table = SynonymTable::builtin();
        assert_eq!(table.overlapping_group("客户名称", "公司全称"), Some("名称"));
        assert_eq!(table.overlapping_group("invoicedate", "时间"), Some("日期"));
        assert_eq!(table.overlapping_group("备注", "金额"), None);
    }

    #[test]
    fn test_single_char_does_not_overlap() {
        let table = SynonymTable::from_groups(false, &[SynonymGroup::new("k", ["amount"])]).unwrap();
        assert_eq!(table.overlapping_group("a", "amount"), None);
    }

    #[test]
    fn test_configured_groups_extend_builtin() {
        let table = SynonymTable::from_groups(
            true,
            &[SynonymGroup::new("订单号", ["订单号", "单号", "order id"])],
        )
        .unwrap();
        assert_eq!(table.exact_group("订单号", "orderid"), Some("订单号"));
        assert_eq!(table.exact_group("金额", "price"), Some("金额"));
    }

    #[test]
    fn test_configured_groups_replace_builtin() {
        let table = SynonymTable::from_groups(false, &[SynonymGroup::new("sku", ["sku", "item code"])]).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.exact_group("金额", "amount"), None);
    }

    #[test]
    fn test_merge_same_key() {
        let mut table = SynonymTable::builtin();
        let before = table.len();
        table.add_group(&SynonymGroup::new("金额", ["款项"]));
        assert_eq!(table.len(), before);
        assert_eq!(table.exact_group("款项", "amount"), Some("金额"));
    }

    #[test]
    fn test_invalid_group_rejected() {
        let result = SynonymTable::from_groups(true, &[SynonymGroup::new("  ", ["x"])]);
        assert!(matches!(result, Err(ConfigError::InvalidSynonymGroup { .. })));

        let result = SynonymTable::from_groups(true, &[SynonymGroup::new("k", ["--"])]);
        assert!(matches!(result, Err(ConfigError::InvalidSynonymGroup { .. })));
    }
}
