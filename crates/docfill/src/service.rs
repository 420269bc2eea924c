//! The boundary API: template registration, mapping suggestions and
//! validation, job submission and output retrieval.
//!
//! Jobs run on a background thread each; callers poll
//! [`FillService::get_job_status`], block on [`FillService::wait_for_job`]
//! or subscribe to progress events.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent};
use crate::config::{validate_config, FillConfig};
use crate::dataset::Dataset;
use crate::db::{Database, SqliteJobRepository, SqliteMappingRepository};
use crate::error::{JobError, MappingError, RepositoryError, Result};
use crate::filler::{RowFiller, TemplateFiller};
use crate::mapping::{validate_mapping, FieldMatcher, Mapping, MappingValidation, Suggestions, SynonymTable};
use crate::processor::ProcessorRegistry;
use crate::repository::{
    InMemoryJobRepository, InMemoryMappingRepository, JobRepository, MappingRecord,
    MappingRepository,
};
use crate::storage::{
    FileOutputStore, MemoryOutputStore, OutputCollector, OutputNaming, OutputRef, OutputStore,
};
use crate::template::{Template, TemplateKind, TemplateRegistry};
use crate::worker::{
    BatchProcessor, BroadcastProgress, CancellationToken, CheckpointProgress, CompositeProgress,
    Job, PoolConfig, ProgressReporter,
};

/// Which outputs of a job to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSelector {
    Row(usize),
    /// Every successful output, bundled into one zip archive.
    All,
}

impl FromStr for OutputSelector {
    type Err = String;

    /// `*` selects all outputs, a number selects one row.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "*" => Ok(OutputSelector::All),
            other => other
                .parse()
                .map(OutputSelector::Row)
                .map_err(|_| format!("expected a row index or '*', got '{}'", other)),
        }
    }
}

/// Downloaded bytes with the metadata needed to serve or save them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

struct RunningJob {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct FillService {
    config: FillConfig,
    processors: Arc<ProcessorRegistry>,
    templates: TemplateRegistry,
    matcher: FieldMatcher,
    jobs: Arc<dyn JobRepository>,
    mappings: Arc<dyn MappingRepository>,
    collector: OutputCollector,
    broadcaster: JobProgressBroadcaster,
    running: Arc<Mutex<HashMap<String, RunningJob>>>,
}

impl FillService {
    /// Builds a service with injected persistence and output storage.
    pub fn new(
        config: FillConfig,
        jobs: Arc<dyn JobRepository>,
        mappings: Arc<dyn MappingRepository>,
        outputs: Arc<dyn OutputStore>,
    ) -> Result<Self> {
        validate_config(&config)?;
        let synonyms = SynonymTable::from_groups(
            config.matcher.include_builtin_synonyms,
            &config.matcher.synonyms,
        )?;

        Ok(Self {
            config,
            processors: Arc::new(ProcessorRegistry::new()),
            templates: TemplateRegistry::new(),
            matcher: FieldMatcher::new(synonyms),
            jobs,
            mappings,
            collector: OutputCollector::new(outputs),
            broadcaster: JobProgressBroadcaster::default(),
            running: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Builds a service whose adapters are chosen by the configuration:
    /// SQLite when `database.path` is set, a directory store when
    /// `output.directory` is set, memory otherwise.
    pub fn from_config(config: FillConfig) -> Result<Self> {
        let (jobs, mappings): (Arc<dyn JobRepository>, Arc<dyn MappingRepository>) =
            match &config.database.path {
                Some(path) => {
                    let db = Database::open(Path::new(path))?;
                    (
                        Arc::new(SqliteJobRepository::new(db.clone())),
                        Arc::new(SqliteMappingRepository::new(db)),
                    )
                }
                None => (
                    Arc::new(InMemoryJobRepository::new()),
                    Arc::new(InMemoryMappingRepository::new()),
                ),
            };

        let outputs: Arc<dyn OutputStore> = match &config.output.directory {
            Some(directory) => Arc::new(FileOutputStore::new(directory)),
            None => Arc::new(MemoryOutputStore::new()),
        };

        Self::new(config, jobs, mappings, outputs)
    }

    /// In-memory service with default configuration.
    pub fn in_memory() -> Result<Self> {
        Self::from_config(FillConfig::default())
    }

    pub fn config(&self) -> &FillConfig {
        &self.config
    }

    /// Parses a template once and caches its placeholders.
    pub fn register_template(
        &self,
        name: impl Into<String>,
        kind: TemplateKind,
        content: Vec<u8>,
    ) -> Result<Arc<Template>> {
        let template = Template::load(name, kind, content, &self.processors)?;
        Ok(self.templates.insert(template)?)
    }

    pub fn template(&self, template_id: &str) -> Result<Arc<Template>> {
        Ok(self.templates.get(template_id)?)
    }

    /// Placeholder names of a registered template, in first-occurrence order.
    pub fn extract_placeholders(&self, template_id: &str) -> Result<Vec<String>> {
        Ok(self.template(template_id)?.placeholders().to_vec())
    }

    /// Best column per placeholder. Advisory only.
    pub fn suggest_mapping(&self, placeholders: &[String], columns: &[String]) -> Suggestions {
        self.matcher.suggest(placeholders, columns)
    }

    /// Suggestions for a registered template plus a draft mapping holding
    /// those at or above the configured `auto_accept` tier.
    pub fn draft_mapping(&self, template_id: &str, columns: &[String]) -> Result<(Suggestions, Mapping)> {
        let template = self.template(template_id)?;
        let suggestions = self.suggest_mapping(template.placeholders(), columns);
        let draft = suggestions.to_mapping(self.config.matcher.auto_accept);
        debug!(
            template_id,
            accepted = draft.len(),
            placeholders = template.placeholders().len(),
            "Drafted mapping"
        );
        Ok((suggestions, draft))
    }

    /// Diagnostics for `mapping` against a registered template. Only an
    /// unknown template is an error.
    pub fn validate_mapping(
        &self,
        template_id: &str,
        mapping: &Mapping,
        columns: &[String],
    ) -> Result<MappingValidation> {
        let template = self.template(template_id)?;
        Ok(validate_mapping(mapping, template.placeholders(), columns))
    }

    /// Persists a confirmed mapping. It must assign every placeholder of
    /// the template and nothing else.
    pub fn save_mapping(&self, template_id: &str, mapping: Mapping) -> Result<MappingRecord> {
        let template = self.template(template_id)?;
        let columns: Vec<String> = mapping.columns().into_iter().map(str::to_string).collect();
        validate_mapping(&mapping, template.placeholders(), &columns).into_result()?;

        let record = MappingRecord::new(template_id, mapping);
        self.mappings.save(&record)?;
        info!(mapping_id = %record.id, template_id, "Saved mapping");
        Ok(record)
    }

    pub fn get_mapping(&self, mapping_id: &str) -> Result<MappingRecord> {
        self.mappings.get(mapping_id).map_err(|e| match e {
            RepositoryError::NotFound(id) => MappingError::NotFound(id).into(),
            other => other.into(),
        })
    }

    /// Validates everything that concerns the whole job, creates it and
    /// starts it in the background. Returns the job id.
    ///
    /// An empty dataset, an unknown template or an incomplete mapping fail
    /// here and no job is created.
    pub fn submit_job(&self, dataset: Dataset, template_id: &str, mapping: Mapping) -> Result<String> {
        self.submit(dataset, template_id, mapping, None)
    }

    /// Like [`submit_job`](Self::submit_job) with a saved mapping.
    pub fn submit_job_with_mapping(&self, dataset: Dataset, mapping_id: &str) -> Result<String> {
        let record = self.get_mapping(mapping_id)?;
        self.submit(dataset, &record.template_id, record.mapping, Some(record.id))
    }

    fn submit(
        &self,
        dataset: Dataset,
        template_id: &str,
        mapping: Mapping,
        mapping_id: Option<String>,
    ) -> Result<String> {
        if dataset.is_empty() {
            return Err(JobError::ConfigurationError(format!(
                "dataset '{}' has no rows",
                dataset.id()
            ))
            .into());
        }

        let template = self.template(template_id)?;
        validate_mapping(&mapping, template.placeholders(), dataset.columns()).into_result()?;

        let mut job = Job::new(dataset.id(), template.id(), mapping.clone(), dataset.len());
        if let Some(mapping_id) = mapping_id {
            job = job.with_mapping_id(mapping_id);
        }
        self.jobs.save(&job)?;

        let job_id = job.id.clone();
        let naming = OutputNaming::new(
            self.config.output.filename_prefix.clone(),
            self.config.output.filename_field.clone(),
            template.output_extension(),
        );
        let filler: Arc<dyn RowFiller> =
            Arc::new(TemplateFiller::new(Arc::clone(&self.processors)).bind(template, mapping));
        let processor = BatchProcessor::new(
            self.collector.clone(),
            PoolConfig {
                worker_count: self.config.worker_count,
                row_timeout: self.config.row_timeout(),
            },
        );
        let progress = CompositeProgress::new(vec![
            Box::new(BroadcastProgress::new(self.broadcaster.clone())) as Box<dyn ProgressReporter>,
            Box::new(CheckpointProgress::new(
                Arc::clone(&self.jobs),
                self.config.checkpoint_every,
            )),
        ]);
        let cancel = CancellationToken::new();
        let runner_cancel = cancel.clone();
        let jobs = Arc::clone(&self.jobs);
        let dataset = Arc::new(dataset);
        let registry = Arc::clone(&self.running);
        let runner_job_id = job_id.clone();

        // Held until the entry is inserted, so a fast runner cannot try to
        // remove itself before it is registered.
        let mut running = self.running_jobs_guard();
        let spawned = thread::Builder::new()
            .name(format!("docfill-job-{}", short_id(&job_id)))
            .spawn(move || {
                let result = processor.run(&mut job, dataset, filler, &naming, &runner_cancel, &progress);
                if let Err(e) = result {
                    error!(job_id = %job.id, error = %e, "Job could not run");
                    if !job.status().is_terminal() {
                        if let Err(abort_error) = job.abort(&e) {
                            warn!(job_id = %job.id, error = %abort_error, "Failed to abort job");
                        }
                    }
                }
                if let Err(e) = jobs.update(&job) {
                    error!(job_id = %job.id, error = %e, "Failed to persist finished job");
                }
                registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&runner_job_id);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                drop(running);
                let reason = JobError::SpawnFailed(e.to_string());
                let mut job = self.jobs.get(&job_id)?;
                job.abort(&reason)?;
                self.jobs.update(&job)?;
                return Err(reason.into());
            }
        };

        running.insert(job_id.clone(), RunningJob { cancel, handle });
        drop(running);

        info!(job_id = %job_id, template_id, "Job submitted");
        Ok(job_id)
    }

    /// Submits a job and blocks until it reaches a terminal status.
    pub fn run_job(&self, dataset: Dataset, template_id: &str, mapping: Mapping) -> Result<Job> {
        let job_id = self.submit_job(dataset, template_id, mapping)?;
        self.wait_for_job(&job_id)
    }

    /// Blocks until the job's runner has finished, then returns the job.
    pub fn wait_for_job(&self, job_id: &str) -> Result<Job> {
        let running = self.running_jobs_guard().remove(job_id);

        if let Some(running) = running {
            if running.handle.join().is_err() {
                error!(job_id, "Job runner panicked");
            }
        }

        self.get_job_status(job_id)
    }

    pub fn get_job_status(&self, job_id: &str) -> Result<Job> {
        self.jobs.get(job_id).map_err(|e| match e {
            RepositoryError::NotFound(id) => JobError::NotFound(id).into(),
            other => other.into(),
        })
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.list()?)
    }

    /// Requests cooperative cancellation. Rows in flight finish or time
    /// out; no new rows are started. Returns `false` when the job has
    /// already finished.
    pub fn cancel_job(&self, job_id: &str) -> Result<bool> {
        let job = self.get_job_status(job_id)?;
        if job.status().is_terminal() {
            return Ok(false);
        }

        let cancelled = self
            .running_jobs_guard()
            .get(job_id)
            .map(|r| r.cancel.cancel())
            .is_some();
        if cancelled {
            info!(job_id, "Cancellation requested");
        }
        Ok(cancelled)
    }

    pub fn download_output(&self, job_id: &str, selector: OutputSelector) -> Result<Download> {
        self.get_job_status(job_id)?;

        match selector {
            OutputSelector::Row(row_index) => {
                let output = self.collector.get(job_id, row_index)?;
                Ok(Download {
                    filename: output.reference.filename,
                    content_type: output.reference.content_type,
                    content: output.content,
                })
            }
            OutputSelector::All => Ok(Download {
                filename: format!("{}.zip", job_id),
                content_type: "application/zip".to_string(),
                content: self.collector.bundle(job_id)?,
            }),
        }
    }

    pub fn list_outputs(&self, job_id: &str) -> Result<Vec<OutputRef>> {
        self.get_job_status(job_id)?;
        Ok(self.collector.list(job_id)?)
    }

    /// Releases the stored outputs of a finished job.
    pub fn delete_outputs(&self, job_id: &str) -> Result<usize> {
        let job = self.get_job_status(job_id)?;
        if !job.status().is_terminal() {
            return Err(JobError::NotRunning(job_id.to_string()).into());
        }
        Ok(self.collector.delete_job(job_id)?)
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.broadcaster.subscribe()
    }

    /// Jobs whose runner thread has not finished yet.
    pub fn running_jobs(&self) -> usize {
        self.running_jobs_guard().len()
    }

    fn running_jobs_guard(&self) -> MutexGuard<'_, HashMap<String, RunningJob>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FillService {
    /// Cancels and joins runners nobody waited for.
    fn drop(&mut self) {
        let running: Vec<(String, RunningJob)> = self.running_jobs_guard().drain().collect();
        for (job_id, job) in running {
            job.cancel.cancel();
            if job.handle.join().is_err() {
                error!(job_id = %job_id, "Job runner panicked");
            }
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::JobPhase;
    use crate::error::DocfillError;
    use crate::dataset::CellValue;
    use crate::error::{OutputError, TemplateError};
    use crate::worker::JobStatus;

    const TEMPLATE: &str = "Dear {{客户名称}}, you owe {{金额}}.";

    fn service() -> FillService {
        FillService::in_memory().unwrap()
    }

    fn columns() -> Vec<String> {
        vec!["客户名称".to_string(), "Amount".to_string()]
    }

    fn dataset(rows: &[(&str, Option<f64>)]) -> Dataset {
        let records = rows
            .iter()
            .map(|(name, amount)| {
                let mut record = vec![CellValue::from(*name)];
                if let Some(amount) = amount {
                    record.push(CellValue::from(*amount));
                }
                record
            })
            .collect();
        Dataset::from_records(columns(), records).unwrap()
    }

    fn mapping() -> Mapping {
        [("客户名称", "客户名称"), ("金额", "Amount")].into_iter().collect()
    }

    fn register(service: &FillService) -> Arc<Template> {
        service
            .register_template("letter.txt", TemplateKind::Text, TEMPLATE.as_bytes().to_vec())
            .unwrap()
    }

    #[test]
    fn test_output_selector_parse() {
        assert_eq!("*".parse::<OutputSelector>(), Ok(OutputSelector::All));
        assert_eq!(" 3 ".parse::<OutputSelector>(), Ok(OutputSelector::Row(3)));
        assert!("first".parse::<OutputSelector>().is_err());
    }

    #[test]
    fn test_draft_mapping_uses_auto_accept() {
        let service = service();
        let template = register(&service);

        let (suggestions, draft) = service.draft_mapping(template.id(), &columns()).unwrap();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(draft, mapping());
    }

    #[test]
    fn test_run_job_end_to_end() {
        let service = service();
        let template = register(&service);

        let job = service
            .run_job(dataset(&[("张三", Some(12.5)), ("李四", Some(3.0))]), template.id(), mapping())
            .unwrap();
        assert_eq!(job.status(), JobStatus::Completed);

        let first = service.download_output(&job.id, OutputSelector::Row(0)).unwrap();
        assert_eq!(first.filename, "output_0001.txt");
        assert_eq!(String::from_utf8(first.content).unwrap(), "Dear 张三, you owe 12.5.");

        let bundle = service.download_output(&job.id, OutputSelector::All).unwrap();
        assert_eq!(bundle.content_type, "application/zip");
        assert_eq!(service.list_outputs(&job.id).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_dataset_creates_no_job() {
        let service = service();
        let template = register(&service);

        let result = service.submit_job(dataset(&[]), template.id(), mapping());
        assert!(matches!(
            result,
            Err(DocfillError::Job(JobError::ConfigurationError(_)))
        ));
        assert!(service.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn test_incomplete_mapping_rejected() {
        let service = service();
        let template = register(&service);
        let partial = mapping().without("金额");

        let result = service.submit_job(dataset(&[("张三", Some(1.0))]), template.id(), partial);
        assert!(matches!(
            result,
            Err(DocfillError::Mapping(MappingError::IncompleteMapping { .. }))
        ));
        assert!(service.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_ids() {
        let service = service();
        assert!(matches!(
            service.extract_placeholders("missing"),
            Err(DocfillError::Template(TemplateError::NotFound(_)))
        ));
        assert!(matches!(
            service.get_job_status("missing"),
            Err(DocfillError::Job(JobError::NotFound(_)))
        ));
        assert!(matches!(
            service.get_mapping("missing"),
            Err(DocfillError::Mapping(MappingError::NotFound(_)))
        ));
    }

    #[test]
    fn test_saved_mapping_round_trip() {
        let service = service();
        let template = register(&service);
        let record = service.save_mapping(template.id(), mapping()).unwrap();

        let job_id = service
            .submit_job_with_mapping(dataset(&[("张三", Some(1.0))]), &record.id)
            .unwrap();
        let job = service.wait_for_job(&job_id).unwrap();
        assert_eq!(job.mapping_id.as_deref(), Some(record.id.as_str()));
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[test]
    fn test_save_mapping_requires_total_mapping() {
        let service = service();
        let template = register(&service);
        assert!(service.save_mapping(template.id(), mapping().without("金额")).is_err());
    }

    #[test]
    fn test_bundle_without_successes() {
        let service = service();
        let template = register(&service);

        let job = service
            .run_job(dataset(&[("张三", None), ("李四", None)]), template.id(), mapping())
            .unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(matches!(
            service.download_output(&job.id, OutputSelector::All),
            Err(DocfillError::Output(OutputError::EmptyResultSet(_)))
        ));
    }

    #[test]
    fn test_cancel_finished_job_is_noop() {
        let service = service();
        let template = register(&service);
        let job = service
            .run_job(dataset(&[("张三", Some(1.0))]), template.id(), mapping())
            .unwrap();
        assert!(!service.cancel_job(&job.id).unwrap());
    }

    #[test]
    fn test_delete_outputs() {
        let service = service();
        let template = register(&service);
        let job = service
            .run_job(dataset(&[("张三", Some(1.0))]), template.id(), mapping())
            .unwrap();

        assert_eq!(service.delete_outputs(&job.id).unwrap(), 1);
        assert!(service.list_outputs(&job.id).unwrap().is_empty());
    }

    #[test]
    fn test_finished_runners_are_released() {
        let service = service();
        let template = register(&service);

        let job_ids: Vec<String> = (0..5)
            .map(|_| {
                service
                    .submit_job(dataset(&[("张三", Some(1.0))]), template.id(), mapping())
                    .unwrap()
            })
            .collect();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while service.running_jobs() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        assert_eq!(service.running_jobs(), 0);
        for job_id in &job_ids {
            assert_eq!(service.get_job_status(job_id).unwrap().status(), JobStatus::Completed);
            assert_eq!(service.wait_for_job(job_id).unwrap().status(), JobStatus::Completed);
        }
    }

    #[test]
    fn test_progress_events_reach_subscribers() {
        let service = service();
        let template = register(&service);
        let mut rx = service.subscribe_progress();

        let job = service
            .run_job(dataset(&[("张三", Some(1.0)), ("李四", Some(2.0))]), template.id(), mapping())
            .unwrap();

        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.job_id, job.id);
            phases.push(event.phase);
        }
        assert_eq!(phases.first(), Some(&JobPhase::Started));
        assert_eq!(phases.last(), Some(&JobPhase::Finished));
        assert_eq!(phases.len(), 4);
    }
}
