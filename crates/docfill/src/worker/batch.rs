use std::sync::Arc;

use tracing::{debug, debug_span, info, info_span, warn};

use crate::dataset::Dataset;
use crate::error::{FillError, JobError, RowError};
use crate::filler::RowFiller;
use crate::storage::{OutputCollector, OutputNaming};
use crate::worker::cancel::CancellationToken;
use crate::worker::job::{Job, JobStatus, RowResult};
use crate::worker::pool::{PoolConfig, RowOutcome, RowWork, WorkerPool};
use crate::worker::progress::{ProgressEvent, ProgressReporter};

/// Runs one job over every row of a dataset.
///
/// Rows are filled concurrently by a [`WorkerPool`]; this type is the single
/// writer of the job while it runs. Outcomes land in a slot per row index,
/// so the recorded results are in row order whatever the completion order.
pub struct BatchProcessor {
    collector: OutputCollector,
    pool: PoolConfig,
}

impl BatchProcessor {
    pub fn new(collector: OutputCollector, pool: PoolConfig) -> Self {
        Self { collector, pool }
    }

    pub fn collector(&self) -> &OutputCollector {
        &self.collector
    }

    /// Drives `job` from `Pending` to a terminal status.
    ///
    /// Errors are returned only for problems that concern the whole job:
    /// an empty or mismatched dataset (the job stays `Pending`), a job that
    /// was already started, or a pool that could not be spawned (the job is
    /// aborted as `Failed`). Row failures are recorded on the job.
    pub fn run(
        &self,
        job: &mut Job,
        dataset: Arc<Dataset>,
        filler: Arc<dyn RowFiller>,
        naming: &OutputNaming,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<JobStatus, JobError> {
        let total_rows = dataset.len();
        if total_rows == 0 {
            return Err(JobError::ConfigurationError(format!(
                "dataset '{}' has no rows",
                dataset.id()
            )));
        }
        if job.total_rows() != total_rows {
            return Err(JobError::ConfigurationError(format!(
                "job '{}' expects {} rows but dataset '{}' has {}",
                job.id,
                job.total_rows(),
                dataset.id(),
                total_rows
            )));
        }

        let _job_span = info_span!("batch",
            job_id = %job.id,
            template_id = %job.template_id,
            total_rows,
        )
        .entered();

        job.start()?;
        progress.report(ProgressEvent::Started { job: &*job });
        info!("Job started");

        let work = row_work(Arc::clone(&dataset), filler);
        let pool = match WorkerPool::start(work, total_rows, self.pool, cancel.clone()) {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "Could not start row workers");
                job.abort(&e)?;
                progress.report(ProgressEvent::Finished { job: &*job });
                return Err(e);
            }
        };

        let mut slots: Vec<Option<RowResult>> = vec![None; total_rows];
        let mut succeeded = 0;
        let mut failed = 0;

        while let Some(outcome) = pool.recv() {
            let row_index = outcome.row_index;
            let result = self.record_outcome(&job.id, &dataset, naming, outcome);

            if result.is_success() {
                succeeded += 1;
            } else {
                failed += 1;
            }
            if let Err(e) = job.record_progress(succeeded, failed) {
                warn!(error = %e, "Failed to update job counters");
            }
            progress.report(ProgressEvent::RowFinished {
                job: &*job,
                result: &result,
            });

            match slots.get_mut(row_index) {
                Some(slot) => *slot = Some(result),
                None => warn!(row_index, "Outcome for unknown row ignored"),
            }
        }

        let dispatched = pool.wait();
        if dispatched < total_rows {
            info!(
                dispatched,
                skipped = total_rows - dispatched,
                "Job cancelled before all rows were dispatched"
            );
        }

        let results: Vec<RowResult> = slots
            .into_iter()
            .enumerate()
            .map(|(row_index, slot)| {
                slot.unwrap_or_else(|| RowResult::failure(row_index, RowError::Cancelled))
            })
            .collect();

        let status = job.finish(results)?;
        progress.report(ProgressEvent::Finished { job: &*job });
        info!(
            status = %status,
            succeeded = job.succeeded(),
            failed = job.failed(),
            "Job finished"
        );
        Ok(status)
    }

    /// Turns a pool outcome into the row's result, storing the output of a
    /// successful row.
    fn record_outcome(
        &self,
        job_id: &str,
        dataset: &Dataset,
        naming: &OutputNaming,
        outcome: RowOutcome,
    ) -> RowResult {
        let RowOutcome { row_index, result } = outcome;

        let stored = result.and_then(|content| {
            let filename = match dataset.row(row_index) {
                Some(row) => naming.filename(row_index, row),
                None => naming.filename(row_index, &Default::default()),
            };
            self.collector
                .store(job_id, row_index, &filename, &content)
                .map_err(|e| RowError::Storage(e.to_string()))
        });

        match stored {
            Ok(reference) => {
                debug!(row_index, filename = %reference.filename, "Row filled");
                RowResult::success(row_index, reference)
            }
            Err(e) => {
                warn!(row_index, error = %e, "Row failed");
                RowResult::failure(row_index, e)
            }
        }
    }
}

fn row_work(dataset: Arc<Dataset>, filler: Arc<dyn RowFiller>) -> Arc<RowWork> {
    Arc::new(move |row_index: usize| -> Result<Vec<u8>, FillError> {
        let _row = debug_span!("fill_row", row_index).entered();
        match dataset.row(row_index) {
            Some(row) => filler.fill_row(row_index, row),
            None => Err(FillError::Render {
                reason: format!("row {} is out of range", row_index),
            }),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CellValue, Row};
    use crate::mapping::Mapping;
    use crate::storage::MemoryOutputStore;
    use crate::worker::progress::NoopProgress;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes the row's `name` cell; a row without it fails.
    struct EchoFiller {
        delay_for: fn(usize) -> Duration,
    }

    impl RowFiller for EchoFiller {
        fn fill_row(&self, row_index: usize, row: &Row) -> Result<Vec<u8>, FillError> {
            std::thread::sleep((self.delay_for)(row_index));
            match row.get("name") {
                Some(value) => Ok(value.to_string().into_bytes()),
                None => Err(FillError::MissingColumn {
                    placeholder: "name".to_string(),
                    column: "name".to_string(),
                }),
            }
        }
    }

    fn echo() -> Arc<dyn RowFiller> {
        Arc::new(EchoFiller {
            delay_for: |_| Duration::ZERO,
        })
    }

    fn dataset(names: &[Option<&str>]) -> Arc<Dataset> {
        let rows = names
            .iter()
            .map(|name| match name {
                Some(name) => [("name".to_string(), CellValue::from(*name))]
                    .into_iter()
                    .collect(),
                None => Row::new(),
            })
            .collect();
        Arc::new(Dataset::new(vec!["name".to_string()], rows).unwrap())
    }

    fn processor(worker_count: usize, row_timeout: Option<Duration>) -> BatchProcessor {
        BatchProcessor::new(
            OutputCollector::new(Arc::new(MemoryOutputStore::new())),
            PoolConfig {
                worker_count,
                row_timeout,
            },
        )
    }

    fn naming() -> OutputNaming {
        OutputNaming::new("output", None, "txt")
    }

    #[test]
    fn test_all_rows_succeed() {
        let processor = processor(4, None);
        let data = dataset(&[Some("a"), Some("b"), Some("c")]);
        let mut job = Job::new(data.id(), "tpl", Mapping::new(), data.len());

        let status = processor
            .run(&mut job, data, echo(), &naming(), &CancellationToken::new(), &NoopProgress)
            .unwrap();

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(job.succeeded(), 3);
        let outputs = processor.collector().list(&job.id).unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[1].filename, "output_0002.txt");
        assert_eq!(processor.collector().get(&job.id, 2).unwrap().content, b"c".to_vec());
    }

    #[test]
    fn test_results_follow_row_order() {
        let processor = processor(4, None);
        let names: Vec<String> = (0..12).map(|i| format!("row{}", i)).collect();
        let data = dataset(&names.iter().map(|n| Some(n.as_str())).collect::<Vec<_>>());
        let mut job = Job::new(data.id(), "tpl", Mapping::new(), data.len());

        // Early rows finish last.
        let filler = Arc::new(EchoFiller {
            delay_for: |i| Duration::from_millis(((12 - i) * 5) as u64),
        });
        processor
            .run(&mut job, data, filler, &naming(), &CancellationToken::new(), &NoopProgress)
            .unwrap();

        for (i, result) in job.results().iter().enumerate() {
            assert_eq!(result.row_index, i);
            assert_eq!(result.output.as_ref().unwrap().row_index, i);
        }
    }

    #[test]
    fn test_row_failure_is_isolated() {
        let processor = processor(2, None);
        let data = dataset(&[Some("a"), Some("b"), None, Some("d"), Some("e")]);
        let mut job = Job::new(data.id(), "tpl", Mapping::new(), data.len());

        let status = processor
            .run(&mut job, data, echo(), &naming(), &CancellationToken::new(), &NoopProgress)
            .unwrap();

        assert_eq!(status, JobStatus::CompletedWithErrors);
        assert_eq!((job.succeeded(), job.failed()), (4, 1));
        let failure = &job.results()[2];
        assert!(!failure.is_success());
        assert!(failure.error.as_deref().unwrap().contains("missing"));
        assert!(failure.output.is_none());
    }

    #[test]
    fn test_every_row_failing_fails_job() {
        let processor = processor(2, None);
        let data = dataset(&[None, None, None]);
        let mut job = Job::new(data.id(), "tpl", Mapping::new(), data.len());

        let status = processor
            .run(&mut job, data, echo(), &naming(), &CancellationToken::new(), &NoopProgress)
            .unwrap();

        assert_eq!(status, JobStatus::Failed);
        assert_eq!(job.succeeded() + job.failed(), job.total_rows());
    }

    #[test]
    fn test_row_timeout_is_recorded() {
        let processor = processor(2, Some(Duration::from_millis(50)));
        let data = dataset(&[Some("fast"), Some("slow")]);
        let mut job = Job::new(data.id(), "tpl", Mapping::new(), data.len());

        let filler = Arc::new(EchoFiller {
            delay_for: |i| {
                if i == 1 {
                    Duration::from_millis(500)
                } else {
                    Duration::ZERO
                }
            },
        });
        let status = processor
            .run(&mut job, data, filler, &naming(), &CancellationToken::new(), &NoopProgress)
            .unwrap();

        assert_eq!(status, JobStatus::CompletedWithErrors);
        assert!(job.results()[1].error.as_deref().unwrap().starts_with("timeout"));
    }

    struct CancelAfterFirst {
        cancel: CancellationToken,
    }

    impl RowFiller for CancelAfterFirst {
        fn fill_row(&self, _row_index: usize, _row: &Row) -> Result<Vec<u8>, FillError> {
            self.cancel.cancel();
            Ok(b"done".to_vec())
        }
    }

    #[test]
    fn test_cancellation_stops_dispatch() {
        let processor = processor(1, None);
        let data = dataset(&[Some("a"); 20]);
        let mut job = Job::new(data.id(), "tpl", Mapping::new(), data.len());
        let cancel = CancellationToken::new();

        let filler = Arc::new(CancelAfterFirst {
            cancel: cancel.clone(),
        });
        let status = processor
            .run(&mut job, data, filler, &naming(), &cancel, &NoopProgress)
            .unwrap();

        assert_eq!(status, JobStatus::CompletedWithErrors);
        assert_eq!((job.succeeded(), job.failed()), (1, 19));
        assert!(job.results()[0].is_success());
        assert_eq!(job.results()[19].error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_empty_dataset_leaves_job_pending() {
        let processor = processor(2, None);
        let data = dataset(&[]);
        let mut job = Job::new(data.id(), "tpl", Mapping::new(), 0);

        let result = processor.run(&mut job, data, echo(), &naming(), &CancellationToken::new(), &NoopProgress);
        assert!(matches!(result, Err(JobError::ConfigurationError(_))));
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[test]
    fn test_job_cannot_run_twice() {
        let processor = processor(1, None);
        let data = dataset(&[Some("a")]);
        let mut job = Job::new(data.id(), "tpl", Mapping::new(), 1);
        processor
            .run(&mut job, Arc::clone(&data), echo(), &naming(), &CancellationToken::new(), &NoopProgress)
            .unwrap();

        let again = processor.run(&mut job, data, echo(), &naming(), &CancellationToken::new(), &NoopProgress);
        assert!(matches!(again, Err(JobError::AlreadyStarted(_))));
    }

    struct Recorder {
        processed: Mutex<Vec<usize>>,
    }

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent<'_>) {
            if let ProgressEvent::RowFinished { job, .. } = event {
                self.processed.lock().unwrap().push(job.processed());
            }
        }
    }

    #[test]
    fn test_progress_counters_are_monotonic() {
        let processor = processor(3, None);
        let data = dataset(&[Some("a"), None, Some("c"), Some("d")]);
        let mut job = Job::new(data.id(), "tpl", Mapping::new(), data.len());
        let recorder = Recorder {
            processed: Mutex::new(Vec::new()),
        };

        processor
            .run(&mut job, data, echo(), &naming(), &CancellationToken::new(), &recorder)
            .unwrap();

        assert_eq!(*recorder.processed.lock().unwrap(), vec![1, 2, 3, 4]);
    }
}
