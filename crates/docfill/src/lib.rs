//! Batch template filling.
//!
//! A template's `{{placeholder}}` names are extracted once, matched against
//! the columns of a dataset, confirmed as a [`Mapping`] and then filled for
//! every row by a bounded worker pool. Each row succeeds or fails on its
//! own; successful documents are collected per job and can be downloaded
//! one by one or as a zip bundle.

pub mod broadcast;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod filler;
pub mod logging;
pub mod mapping;
pub mod processor;
pub mod repository;
pub mod sanitize;
pub mod service;
pub mod storage;
pub mod template;
pub mod worker;

pub use broadcast::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
pub use config::{load_config, load_config_from_str, FillConfig};
pub use dataset::{CellValue, Dataset, Row};
pub use error::{
    ConfigError, DocfillError, FillError, JobError, MappingError, OutputError, Result,
    TemplateError,
};
pub use filler::{RowFiller, TemplateFiller};
pub use mapping::{
    validate_mapping, Confidence, FieldMatcher, Mapping, MappingValidation, MatchSuggestion,
    Suggestions,
};
pub use service::{Download, FillService, OutputSelector};
pub use storage::OutputRef;
pub use template::{Template, TemplateKind};
pub use worker::{Job, JobStatus, RowResult, RowStatus};
