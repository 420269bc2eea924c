use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::RepositoryError;
use crate::repository::{JobRepository, MappingRecord, MappingRepository};
use crate::worker::job::Job;

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().map_err(|_| RepositoryError::LockPoisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(RepositoryError::AlreadyExists(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Job, RepositoryError> {
        let jobs = self.jobs.read().map_err(|_| RepositoryError::LockPoisoned)?;
        jobs.get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    fn update(&self, job: &Job) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().map_err(|_| RepositoryError::LockPoisoned)?;
        match jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(job.id.clone())),
        }
    }

    fn list(&self) -> Result<Vec<Job>, RepositoryError> {
        let jobs = self.jobs.read().map_err(|_| RepositoryError::LockPoisoned)?;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}

#[derive(Default)]
pub struct InMemoryMappingRepository {
    records: RwLock<HashMap<String, MappingRecord>>,
}

impl InMemoryMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingRepository for InMemoryMappingRepository {
    fn save(&self, record: &MappingRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().map_err(|_| RepositoryError::LockPoisoned)?;
        if records.contains_key(&record.id) {
            return Err(RepositoryError::AlreadyExists(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<MappingRecord, RepositoryError> {
        let records = self.records.read().map_err(|_| RepositoryError::LockPoisoned)?;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    fn update(&self, record: &MappingRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().map_err(|_| RepositoryError::LockPoisoned)?;
        match records.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(record.id.clone())),
        }
    }
}
