use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocfillError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Fill error: {0}")]
    Fill(#[from] FillError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid synonym group '{key}': {reason}")]
    InvalidSynonymGroup { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum TemplateError {
    /// The document container could not be opened or parsed at all.
    #[error("Malformed template: {0}")]
    MalformedTemplate(String),

    #[error("Unsupported template format: {0}")]
    UnsupportedFormat(String),

    #[error("Template not found: {0}")]
    NotFound(String),

    /// A writer panicked while holding the registry lock.
    #[error("Template registry is unavailable")]
    RegistryPoisoned,
}

#[derive(Error, Debug)]
pub enum MappingError {
    #[error(
        "Incomplete mapping: missing placeholders {missing_placeholders:?}, unknown columns {unknown_columns:?}, unknown placeholders {unknown_placeholders:?}"
    )]
    IncompleteMapping {
        missing_placeholders: BTreeSet<String>,
        unknown_columns: BTreeSet<String>,
        unknown_placeholders: BTreeSet<String>,
    },

    #[error("Mapping not found: {0}")]
    NotFound(String),
}

/// A failure to fill one row. Never escapes a batch: the batch processor
/// records it on the row's `RowResult` and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FillError {
    #[error("placeholder '{placeholder}' has no mapped column")]
    UnmappedPlaceholder { placeholder: String },

    #[error("column '{column}' mapped to placeholder '{placeholder}' is missing from the row")]
    MissingColumn { placeholder: String, column: String },

    #[error("failed to render document: {reason}")]
    Render { reason: String },
}

impl FillError {
    /// The placeholder the failure is attributed to, if any.
    pub fn placeholder(&self) -> Option<&str> {
        match self {
            FillError::UnmappedPlaceholder { placeholder }
            | FillError::MissingColumn { placeholder, .. } => Some(placeholder),
            FillError::Render { .. } => None,
        }
    }
}

/// Why a single row produced no output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error(transparent)]
    Fill(#[from] FillError),

    #[error("timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("row worker panicked")]
    Panicked,

    #[error("failed to store output: {0}")]
    Storage(String),
}

#[derive(Error, Debug)]
pub enum JobError {
    /// Raised before a job exists, e.g. an empty dataset was submitted.
    #[error("Job configuration error: {0}")]
    ConfigurationError(String),

    #[error("Job '{0}' has already been started")]
    AlreadyStarted(String),

    #[error("Job '{0}' is not running")]
    NotRunning(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Failed to spawn job runner: {0}")]
    SpawnFailed(String),
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Job '{0}' has no successful outputs")]
    EmptyResultSet(String),

    #[error("No output for job '{job_id}' row {row_index}")]
    NotFound { job_id: String, row_index: usize },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build archive: {0}")]
    Archive(String),

    #[error("Output store lock poisoned")]
    LockPoisoned,
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Repository lock poisoned")]
    LockPoisoned,

    #[error("Corrupt record '{id}': {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Failed to (de)serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, DocfillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_error_placeholder() {
        let err = FillError::MissingColumn {
            placeholder: "客户名称".to_string(),
            column: "name".to_string(),
        };
        assert_eq!(err.placeholder(), Some("客户名称"));

        let err = FillError::Render {
            reason: "zip".to_string(),
        };
        assert_eq!(err.placeholder(), None);
    }

    #[test]
    fn test_row_error_timeout_message() {
        let err = RowError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "timeout after 250ms");
    }

    #[test]
    fn test_row_error_is_transparent_for_fill() {
        let fill = FillError::UnmappedPlaceholder {
            placeholder: "amount".to_string(),
        };
        let err = RowError::from(fill.clone());
        assert_eq!(err.to_string(), fill.to_string());
    }
}
