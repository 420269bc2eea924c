use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::error::OutputError;
use crate::storage::{Output, OutputRef, OutputStore};

/// Process-local output store.
#[derive(Default)]
pub struct MemoryOutputStore {
    jobs: RwLock<HashMap<String, BTreeMap<usize, Output>>>,
}

impl MemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputStore for MemoryOutputStore {
    fn put(&self, reference: &OutputRef, content: &[u8]) -> Result<(), OutputError> {
        let mut jobs = self.jobs.write().map_err(|_| OutputError::LockPoisoned)?;
        jobs.entry(reference.job_id.clone()).or_default().insert(
            reference.row_index,
            Output {
                reference: reference.clone(),
                content: content.to_vec(),
            },
        );
        Ok(())
    }

    fn get(&self, job_id: &str, row_index: usize) -> Result<Output, OutputError> {
        let jobs = self.jobs.read().map_err(|_| OutputError::LockPoisoned)?;
        jobs.get(job_id)
            .and_then(|outputs| outputs.get(&row_index))
            .cloned()
            .ok_or_else(|| OutputError::NotFound {
                job_id: job_id.to_string(),
                row_index,
            })
    }

    fn list(&self, job_id: &str) -> Result<Vec<OutputRef>, OutputError> {
        let jobs = self.jobs.read().map_err(|_| OutputError::LockPoisoned)?;
        Ok(jobs
            .get(job_id)
            .map(|outputs| outputs.values().map(|o| o.reference.clone()).collect())
            .unwrap_or_default())
    }

    fn delete_job(&self, job_id: &str) -> Result<usize, OutputError> {
        let mut jobs = self.jobs.write().map_err(|_| OutputError::LockPoisoned)?;
        Ok(jobs.remove(job_id).map(|outputs| outputs.len()).unwrap_or(0))
    }
}
