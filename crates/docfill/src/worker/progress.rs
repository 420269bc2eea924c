use std::sync::Arc;

use tracing::warn;

use crate::broadcast::job_progress::{JobProgressBroadcaster, JobProgressEvent};
use crate::repository::JobRepository;
use crate::worker::job::{Job, RowResult};

/// Events emitted by the batch processor while a job runs.
#[derive(Clone, Copy)]
pub enum ProgressEvent<'a> {
    Started { job: &'a Job },
    RowFinished { job: &'a Job, result: &'a RowResult },
    Finished { job: &'a Job },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent<'_>);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent<'_>) {}
}

/// Bridges batch events to the progress broadcast channel.
pub struct BroadcastProgress {
    broadcaster: JobProgressBroadcaster,
}

impl BroadcastProgress {
    pub fn new(broadcaster: JobProgressBroadcaster) -> Self {
        Self { broadcaster }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent<'_>) {
        let event = match event {
            ProgressEvent::Started { job } => JobProgressEvent::started(job),
            ProgressEvent::RowFinished { job, result } => JobProgressEvent::row_finished(job, result),
            ProgressEvent::Finished { job } => JobProgressEvent::finished(job),
        };
        self.broadcaster.send(event);
    }
}

/// Persists the running job at start, every `every` rows, and at the end.
pub struct CheckpointProgress {
    repository: Arc<dyn JobRepository>,
    every: usize,
}

impl CheckpointProgress {
    pub fn new(repository: Arc<dyn JobRepository>, every: usize) -> Self {
        Self {
            repository,
            every: every.max(1),
        }
    }

    fn save(&self, job: &Job) {
        if let Err(e) = self.repository.update(job) {
            warn!(job_id = %job.id, error = %e, "Failed to checkpoint job");
        }
    }
}

impl ProgressReporter for CheckpointProgress {
    fn report(&self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::Started { job } | ProgressEvent::Finished { job } => self.save(job),
            ProgressEvent::RowFinished { job, .. } => {
                if job.processed() % self.every == 0 {
                    self.save(job);
                }
            }
        }
    }
}

/// Fans one event out to several reporters, in order.
pub struct CompositeProgress {
    reporters: Vec<Box<dyn ProgressReporter>>,
}

impl CompositeProgress {
    pub fn new(reporters: Vec<Box<dyn ProgressReporter>>) -> Self {
        Self { reporters }
    }
}

impl ProgressReporter for CompositeProgress {
    fn report(&self, event: ProgressEvent<'_>) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}
