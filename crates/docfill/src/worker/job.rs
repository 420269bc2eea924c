use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::mapping::Mapping;
use crate::storage::OutputRef;

/// Lifecycle of a batch job. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedWithErrors | JobStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "completed_with_errors" => Some(JobStatus::CompletedWithErrors),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Terminal status for a finished run.
    fn from_counts(total: usize, succeeded: usize) -> Self {
        if succeeded == 0 {
            JobStatus::Failed
        } else if succeeded == total {
            JobStatus::Completed
        } else {
            JobStatus::CompletedWithErrors
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Success,
    Failure,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Success => "success",
            RowStatus::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(RowStatus::Success),
            "failure" => Some(RowStatus::Failure),
            _ => None,
        }
    }
}

/// Outcome of one dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowResult {
    pub row_index: usize,
    pub status: RowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RowResult {
    pub fn success(row_index: usize, output: OutputRef) -> Self {
        Self {
            row_index,
            status: RowStatus::Success,
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(row_index: usize, error: impl ToString) -> Self {
        Self {
            row_index,
            status: RowStatus::Failure,
            output: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RowStatus::Success
    }
}

/// One batch run over a dataset, template and confirmed mapping.
///
/// Only the batch processor mutates a job; once a terminal status is
/// reached every mutating method returns an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub dataset_id: String,
    pub template_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<String>,
    pub mapping: Mapping,
    status: JobStatus,
    total_rows: usize,
    succeeded: usize,
    failed: usize,
    results: Vec<RowResult>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        dataset_id: impl Into<String>,
        template_id: impl Into<String>,
        mapping: Mapping,
        total_rows: usize,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            dataset_id: dataset_id.into(),
            template_id: template_id.into(),
            mapping_id: None,
            mapping,
            status: JobStatus::Pending,
            total_rows,
            succeeded: 0,
            failed: 0,
            results: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn with_mapping_id(mut self, mapping_id: impl Into<String>) -> Self {
        self.mapping_id = Some(mapping_id.into());
        self
    }

    /// Rebuilds a job from persisted parts. No transition checks are made.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: String,
        dataset_id: String,
        template_id: String,
        mapping_id: Option<String>,
        mapping: Mapping,
        status: JobStatus,
        total_rows: usize,
        succeeded: usize,
        failed: usize,
        results: Vec<RowResult>,
        created_at: DateTime<Utc>,
        started_at: Option<DateTime<Utc>>,
        finished_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> Self {
        Self {
            id,
            dataset_id,
            template_id,
            mapping_id,
            mapping,
            status,
            total_rows,
            succeeded,
            failed,
            results,
            created_at,
            started_at,
            finished_at,
            error,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Per-row outcomes in row order. Filled in when the job finishes.
    pub fn results(&self) -> &[RowResult] {
        &self.results
    }

    pub fn result(&self, row_index: usize) -> Option<&RowResult> {
        self.results.get(row_index)
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        self.processed() as f64 / self.total_rows as f64 * 100.0
    }

    /// Pending -> Running. A job can be started only once.
    pub fn start(&mut self) -> Result<(), JobError> {
        if self.status != JobStatus::Pending {
            return Err(JobError::AlreadyStarted(self.id.clone()));
        }
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Updates the running counters.
    pub fn record_progress(&mut self, succeeded: usize, failed: usize) -> Result<(), JobError> {
        if self.status != JobStatus::Running {
            return Err(JobError::NotRunning(self.id.clone()));
        }
        self.succeeded = succeeded;
        self.failed = failed;
        Ok(())
    }

    /// Running -> terminal, from one result per row in row order.
    pub fn finish(&mut self, results: Vec<RowResult>) -> Result<JobStatus, JobError> {
        if self.status != JobStatus::Running {
            return Err(JobError::NotRunning(self.id.clone()));
        }
        debug_assert_eq!(results.len(), self.total_rows);
        debug_assert!(results.iter().enumerate().all(|(i, r)| r.row_index == i));

        self.succeeded = results.iter().filter(|r| r.is_success()).count();
        self.failed = results.len() - self.succeeded;
        self.total_rows = results.len();
        self.results = results;
        self.status = JobStatus::from_counts(self.total_rows, self.succeeded);
        self.finished_at = Some(Utc::now());
        Ok(self.status)
    }

    /// Marks a job that could not run at all as failed. Every row not yet
    /// accounted for is recorded as a failure with `reason`.
    pub fn abort(&mut self, reason: impl ToString) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::NotRunning(self.id.clone()));
        }
        let reason = reason.to_string();
        self.results = (0..self.total_rows)
            .map(|i| RowResult::failure(i, &reason))
            .collect();
        self.succeeded = 0;
        self.failed = self.total_rows;
        self.status = JobStatus::Failed;
        self.error = Some(reason);
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(row_index: usize) -> OutputRef {
        OutputRef {
            job_id: "job".to_string(),
            row_index,
            filename: format!("output_{:04}.txt", row_index + 1),
            size: 1,
            content_type: "text/plain".to_string(),
        }
    }

    fn job(total: usize) -> Job {
        Job::new("ds", "tpl", Mapping::new(), total)
    }

    #[test]
    fn test_status_strings_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::CompletedWithErrors,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(
            serde_json::to_string(&JobStatus::CompletedWithErrors).unwrap(),
            "\"completed_with_errors\""
        );
    }

    #[test]
    fn test_cannot_start_twice() {
        let mut job = job(1);
        job.start().unwrap();
        assert!(matches!(job.start(), Err(JobError::AlreadyStarted(_))));
    }

    #[test]
    fn test_finish_requires_running() {
        let mut job = job(1);
        assert!(matches!(
            job.finish(vec![RowResult::success(0, output(0))]),
            Err(JobError::NotRunning(_))
        ));
    }

    #[test]
    fn test_terminal_status_from_counts() {
        let mut all_ok = job(2);
        all_ok.start().unwrap();
        let status = all_ok
            .finish(vec![RowResult::success(0, output(0)), RowResult::success(1, output(1))])
            .unwrap();
        assert_eq!(status, JobStatus::Completed);

        let mut mixed = job(2);
        mixed.start().unwrap();
        let status = mixed
            .finish(vec![RowResult::success(0, output(0)), RowResult::failure(1, "boom")])
            .unwrap();
        assert_eq!(status, JobStatus::CompletedWithErrors);
        assert_eq!((mixed.succeeded(), mixed.failed()), (1, 1));

        let mut none_ok = job(2);
        none_ok.start().unwrap();
        let status = none_ok
            .finish(vec![RowResult::failure(0, "a"), RowResult::failure(1, "b")])
            .unwrap();
        assert_eq!(status, JobStatus::Failed);
    }

    #[test]
    fn test_terminal_job_is_frozen() {
        let mut job = job(1);
        job.start().unwrap();
        job.finish(vec![RowResult::failure(0, "x")]).unwrap();

        assert!(job.record_progress(1, 0).is_err());
        assert!(job.start().is_err());
        assert!(job.abort("again").is_err());
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn test_abort_keeps_counters_consistent() {
        let mut job = job(3);
        job.start().unwrap();
        job.record_progress(1, 0).unwrap();
        job.abort("runner crashed").unwrap();

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.succeeded() + job.failed(), job.total_rows());
        assert_eq!(job.results().len(), 3);
    }

    #[test]
    fn test_progress_percent() {
        let mut job = job(4);
        job.start().unwrap();
        job.record_progress(1, 1).unwrap();
        assert!((job.progress_percent() - 50.0).abs() < f64::EPSILON);
    }
}
