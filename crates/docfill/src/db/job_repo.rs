//! Job repository: the `jobs` table plus per-row outcomes in `job_rows`.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};
use crate::error::RepositoryError;
use crate::repository::JobRepository;
use crate::storage::OutputRef;
use crate::worker::job::{Job, JobStatus, RowResult, RowStatus};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub dataset_id: String,
    pub template_id: String,
    pub mapping_id: Option<String>,
    /// JSON object, placeholder -> column.
    pub mapping: String,
    pub status: String,
    pub total_rows: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            dataset_id: row.get("dataset_id")?,
            template_id: row.get("template_id")?,
            mapping_id: row.get("mapping_id")?,
            mapping: row.get("mapping")?,
            status: row.get("status")?,
            total_rows: row.get("total_rows")?,
            succeeded: row.get("succeeded")?,
            failed: row.get("failed")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
        })
    }
}

/// A raw `job_rows` row.
#[derive(Debug, Clone)]
pub struct JobRowResult {
    pub job_id: String,
    pub row_index: i64,
    pub status: String,
    /// JSON-encoded output reference.
    pub output: Option<String>,
    pub error: Option<String>,
}

impl JobRowResult {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            row_index: row.get("row_index")?,
            status: row.get("status")?,
            output: row.get("output")?,
            error: row.get("error")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<String>,
    pub template_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, dataset_id, template_id, mapping_id, mapping, status,
             total_rows, succeeded, failed, error, created_at, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                job.id,
                job.dataset_id,
                job.template_id,
                job.mapping_id,
                job.mapping,
                job.status,
                job.total_rows,
                job.succeeded,
                job.failed,
                job.error,
                job.created_at,
                job.started_at,
                job.finished_at,
            ],
        )?;
        Ok(())
    })
}

fn update_job(conn: &Connection, job: &JobRow) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "UPDATE jobs SET status=?2, total_rows=?3, succeeded=?4, failed=?5, error=?6,
         started_at=?7, finished_at=?8
         WHERE id=?1",
        params![
            job.id,
            job.status,
            job.total_rows,
            job.succeeded,
            job.failed,
            job.error,
            job.started_at,
            job.finished_at,
        ],
    )?)
}

/// Overwrites the mutable columns of a job. Returns the number of rows
/// changed (0 when the job does not exist).
pub fn update(db: &Database, job: &JobRow) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| update_job(conn, job))
}

/// Updates a job and replaces its row outcomes in one transaction.
pub fn update_with_results(
    db: &Database,
    job: &JobRow,
    results: &[JobRowResult],
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let changed = update_job(&tx, job)?;
        if changed > 0 {
            tx.execute("DELETE FROM job_rows WHERE job_id = ?1", params![job.id])?;
            let mut stmt = tx.prepare(
                "INSERT INTO job_rows (job_id, row_index, status, output, error)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for result in results {
                stmt.execute(params![
                    result.job_id,
                    result.row_index,
                    result.status,
                    result.output,
                    result.error,
                ])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Row outcomes of a job, in row order.
pub fn find_results(db: &Database, job_id: &str) -> Result<Vec<JobRowResult>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM job_rows WHERE job_id = ?1 ORDER BY row_index")?;
        let rows = stmt
            .query_map(params![job_id], JobRowResult::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Queries jobs with filters, newest first, returning (rows, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.clone()));
        }
        if let Some(ref template_id) = filter.template_id {
            conditions.push(format!("template_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(template_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM jobs {} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Fixed-width so stored timestamps sort lexically.
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(id: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Corrupt {
            id: id.to_string(),
            reason: format!("invalid timestamp '{}': {}", value, e),
        })
}

fn parse_optional_time(
    id: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|v| parse_time(id, v)).transpose()
}

fn to_count(id: &str, value: i64) -> Result<usize, RepositoryError> {
    usize::try_from(value).map_err(|_| RepositoryError::Corrupt {
        id: id.to_string(),
        reason: format!("negative count {}", value),
    })
}

fn job_to_row(job: &Job) -> Result<JobRow, RepositoryError> {
    Ok(JobRow {
        id: job.id.clone(),
        dataset_id: job.dataset_id.clone(),
        template_id: job.template_id.clone(),
        mapping_id: job.mapping_id.clone(),
        mapping: serde_json::to_string(&job.mapping)?,
        status: job.status().as_str().to_string(),
        total_rows: job.total_rows() as i64,
        succeeded: job.succeeded() as i64,
        failed: job.failed() as i64,
        error: job.error.clone(),
        created_at: format_time(&job.created_at),
        started_at: job.started_at.as_ref().map(format_time),
        finished_at: job.finished_at.as_ref().map(format_time),
    })
}

fn results_to_rows(job: &Job) -> Result<Vec<JobRowResult>, RepositoryError> {
    job.results()
        .iter()
        .map(|result| -> Result<JobRowResult, RepositoryError> {
            Ok(JobRowResult {
                job_id: job.id.clone(),
                row_index: result.row_index as i64,
                status: result.status.as_str().to_string(),
                output: result
                    .output
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                error: result.error.clone(),
            })
        })
        .collect()
}

fn row_to_result(row: JobRowResult) -> Result<RowResult, RepositoryError> {
    let status = RowStatus::parse(&row.status).ok_or_else(|| RepositoryError::Corrupt {
        id: row.job_id.clone(),
        reason: format!("unknown row status '{}'", row.status),
    })?;
    let output: Option<OutputRef> = row
        .output
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(RowResult {
        row_index: to_count(&row.job_id, row.row_index)?,
        status,
        output,
        error: row.error,
    })
}

fn row_to_job(row: JobRow, results: Vec<JobRowResult>) -> Result<Job, RepositoryError> {
    let status = JobStatus::parse(&row.status).ok_or_else(|| RepositoryError::Corrupt {
        id: row.id.clone(),
        reason: format!("unknown job status '{}'", row.status),
    })?;
    let results = results
        .into_iter()
        .map(row_to_result)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Job::restore(
        row.id.clone(),
        row.dataset_id,
        row.template_id,
        row.mapping_id,
        serde_json::from_str(&row.mapping)?,
        status,
        to_count(&row.id, row.total_rows)?,
        to_count(&row.id, row.succeeded)?,
        to_count(&row.id, row.failed)?,
        results,
        parse_time(&row.id, &row.created_at)?,
        parse_optional_time(&row.id, row.started_at.as_deref())?,
        parse_optional_time(&row.id, row.finished_at.as_deref())?,
        row.error,
    ))
}

/// [`JobRepository`] backed by the `jobs` and `job_rows` tables.
#[derive(Clone)]
pub struct SqliteJobRepository {
    db: Database,
}

impl SqliteJobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn load(&self, row: JobRow) -> Result<Job, RepositoryError> {
        let results = find_results(&self.db, &row.id)?;
        row_to_job(row, results)
    }
}

impl JobRepository for SqliteJobRepository {
    fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        if find_by_id(&self.db, &job.id)?.is_some() {
            return Err(RepositoryError::AlreadyExists(job.id.clone()));
        }
        let row = job_to_row(job)?;
        insert(&self.db, &row)?;
        if !job.results().is_empty() {
            update_with_results(&self.db, &row, &results_to_rows(job)?)?;
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Job, RepositoryError> {
        let row = find_by_id(&self.db, id)?.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        self.load(row)
    }

    fn update(&self, job: &Job) -> Result<(), RepositoryError> {
        let row = job_to_row(job)?;
        // Row outcomes only exist once a job has finished.
        let changed = if job.results().is_empty() {
            update(&self.db, &row)?
        } else {
            update_with_results(&self.db, &row, &results_to_rows(job)?)?
        };
        if changed == 0 {
            return Err(RepositoryError::NotFound(job.id.clone()));
        }
        log::debug!("Persisted job {} ({})", job.id, job.status());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Job>, RepositoryError> {
        let (rows, _) = query(&self.db, &JobFilter::default())?;
        rows.into_iter().map(|row| self.load(row)).collect()
    }
}
