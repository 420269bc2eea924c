//! Tabular input handed over by the upstream parser.
//!
//! A `Dataset` is immutable once built; the batch processor shares it
//! read-only between row workers.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Canonical pattern for date cells.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Canonical pattern for date-time cells.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single scalar cell.
///
/// Deserializes untagged from JSON: `null`, booleans, integers, floats and
/// strings. Date variants are produced by parsers that know the cell type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    /// Renders the value the way it is substituted into documents.
    ///
    /// Null renders as the empty string. Floats keep their shortest exact
    /// representation; integral floats drop the fractional part so that
    /// spreadsheet numbers like `100.0` render as `100`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{}", *x as i64)
                } else {
                    write!(f, "{}", x)
                }
            }
            CellValue::Text(s) => f.write_str(s),
            CellValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// One record, keyed by column name. A column may be absent from a row.
pub type Row = HashMap<String, CellValue>;

fn new_dataset_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn check_unique_columns(columns: &[String]) -> Result<(), JobError> {
    let mut seen = HashSet::with_capacity(columns.len());
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(JobError::ConfigurationError(format!(
                "duplicate column name '{}'",
                column
            )));
        }
    }
    Ok(())
}

/// An ordered sequence of rows with a fixed set of column names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DatasetParts")]
pub struct Dataset {
    id: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// Wire form of a `Dataset` before its columns are checked.
#[derive(Deserialize)]
struct DatasetParts {
    #[serde(default = "new_dataset_id")]
    id: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl TryFrom<DatasetParts> for Dataset {
    type Error = JobError;

    fn try_from(parts: DatasetParts) -> Result<Self, Self::Error> {
        check_unique_columns(&parts.columns)?;
        Ok(Self {
            id: parts.id,
            columns: parts.columns,
            rows: parts.rows,
        })
    }
}

impl Dataset {
    /// Builds a dataset. Column names must be unique.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, JobError> {
        check_unique_columns(&columns)?;
        Ok(Self {
            id: new_dataset_id(),
            columns,
            rows,
        })
    }

    /// Builds a dataset from positional records aligned with `columns`.
    /// Short records leave the trailing columns absent.
    pub fn from_records(
        columns: Vec<String>,
        records: Vec<Vec<CellValue>>,
    ) -> Result<Self, JobError> {
        let rows = records
            .into_iter()
            .map(|record| columns.iter().cloned().zip(record).collect::<Row>())
            .collect();
        Self::new(columns, rows)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_renders_empty() {
        assert_eq!(CellValue::Null.to_string(), "");
    }

    #[test]
    fn test_numbers_keep_precision() {
        assert_eq!(CellValue::Integer(42).to_string(), "42");
        assert_eq!(CellValue::Float(1234.5678).to_string(), "1234.5678");
        assert_eq!(CellValue::Float(0.1).to_string(), "0.1");
        assert_eq!(CellValue::Float(100.0).to_string(), "100");
        assert_eq!(CellValue::Float(-3.25).to_string(), "-3.25");
    }

    #[test]
    fn test_dates_use_canonical_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(CellValue::Date(date).to_string(), "2024-03-07");

        let dt = date.and_hms_opt(9, 5, 0).unwrap();
        assert_eq!(CellValue::DateTime(dt).to_string(), "2024-03-07 09:05:00");
    }

    #[test]
    fn test_deserialize_untagged() {
        let row: Row = serde_json::from_str(
            r#"{"name": "张三", "qty": 3, "price": 9.5, "note": null, "paid": true}"#,
        )
        .unwrap();
        assert_eq!(row["name"], CellValue::Text("张三".to_string()));
        assert_eq!(row["qty"], CellValue::Integer(3));
        assert_eq!(row["price"], CellValue::Float(9.5));
        assert_eq!(row["note"], CellValue::Null);
        assert_eq!(row["paid"], CellValue::Bool(true));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = Dataset::new(vec!["a".to_string(), "a".to_string()], vec![]);
        assert!(matches!(result, Err(JobError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_records_aligns_columns() {
        let dataset = Dataset::from_records(
            vec!["name".to_string(), "amount".to_string()],
            vec![
                vec!["Alice".into(), 10i64.into()],
                vec!["Bob".into()],
            ],
        )
        .unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.row(0).unwrap()["amount"], CellValue::Integer(10));
        assert!(!dataset.row(1).unwrap().contains_key("amount"));
    }

    #[test]
    fn test_dataset_json_gets_id() {
        let dataset: Dataset =
            serde_json::from_str(r#"{"columns": ["a"], "rows": [{"a": 1}]}"#).unwrap();
        assert!(!dataset.id().is_empty());
        assert_eq!(dataset.columns(), &["a".to_string()]);
    }

    #[test]
    fn test_dataset_json_with_duplicate_columns_rejected() {
        let result = serde_json::from_str::<Dataset>(
            r#"{"id": "ds-1", "columns": ["a", "b", "a"], "rows": []}"#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("duplicate column name 'a'"));

        let dataset: Dataset =
            serde_json::from_str(r#"{"id": "ds-1", "columns": ["a", "b"], "rows": []}"#).unwrap();
        assert_eq!(dataset.id(), "ds-1");
    }
}
