//! Persistence seams for jobs and confirmed mappings.
//!
//! The batch core only talks to these traits. In-memory adapters live in
//! [`memory`]; SQLite adapters live in [`crate::db`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;
use crate::mapping::Mapping;
use crate::worker::job::Job;

pub mod memory;

pub use memory::{InMemoryJobRepository, InMemoryMappingRepository};

pub trait JobRepository: Send + Sync {
    /// Stores a new job. Fails if a job with the same id exists.
    fn save(&self, job: &Job) -> Result<(), RepositoryError>;

    fn get(&self, id: &str) -> Result<Job, RepositoryError>;

    /// Overwrites an existing job.
    fn update(&self, job: &Job) -> Result<(), RepositoryError>;

    /// All jobs, newest first.
    fn list(&self) -> Result<Vec<Job>, RepositoryError>;
}

/// A confirmed mapping, stored so jobs can refer to it by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub id: String,
    pub template_id: String,
    pub mapping: Mapping,
    pub created_at: DateTime<Utc>,
}

impl MappingRecord {
    pub fn new(template_id: impl Into<String>, mapping: Mapping) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            template_id: template_id.into(),
            mapping,
            created_at: Utc::now(),
        }
    }
}

pub trait MappingRepository: Send + Sync {
    fn save(&self, record: &MappingRecord) -> Result<(), RepositoryError>;

    fn get(&self, id: &str) -> Result<MappingRecord, RepositoryError>;

    fn update(&self, record: &MappingRecord) -> Result<(), RepositoryError>;
}
