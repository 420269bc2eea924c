//! Job progress broadcaster for real-time batch status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::worker::job::{Job, JobStatus, RowResult};

/// What happened in a progress event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Started,
    RowFinished,
    Finished,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Started => write!(f, "Started"),
            JobPhase::RowFinished => write!(f, "Row finished"),
            JobPhase::Finished => write!(f, "Finished"),
        }
    }
}

/// Progress event for a batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub phase: JobPhase,
    pub status: JobStatus,
    pub total_rows: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub progress_percent: f64,
    /// Set on row events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    /// Failure reason of the row, on row events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    fn from_job(job: &Job, phase: JobPhase, message: String) -> Self {
        Self {
            job_id: job.id.clone(),
            phase,
            status: job.status(),
            total_rows: job.total_rows(),
            succeeded: job.succeeded(),
            failed: job.failed(),
            progress_percent: job.progress_percent(),
            row_index: None,
            error: None,
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn started(job: &Job) -> Self {
        Self::from_job(
            job,
            JobPhase::Started,
            format!("Processing {} rows", job.total_rows()),
        )
    }

    pub fn row_finished(job: &Job, result: &RowResult) -> Self {
        let message = if result.is_success() {
            format!("Row {} filled", result.row_index)
        } else {
            format!("Row {} failed", result.row_index)
        };
        let mut event = Self::from_job(job, JobPhase::RowFinished, message);
        event.row_index = Some(result.row_index);
        event.error = result.error.clone();
        event
    }

    pub fn finished(job: &Job) -> Self {
        Self::from_job(
            job,
            JobPhase::Finished,
            format!(
                "Job {}: {} succeeded, {} failed",
                job.status(),
                job.succeeded(),
                job.failed()
            ),
        )
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
