//! Successful outputs of a job: naming, storage and bundling.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::dataset::Row;
use crate::error::OutputError;
use crate::sanitize::{sanitize_file_stem, split_extension};
use crate::storage::{content_type_for, Output, OutputRef, OutputStore};

/// How output files of one job are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNaming {
    prefix: String,
    field: Option<String>,
    extension: String,
}

impl OutputNaming {
    pub fn new(prefix: impl Into<String>, field: Option<String>, extension: impl Into<String>) -> Self {
        let prefix = sanitize_file_stem(&prefix.into()).unwrap_or_else(|| "output".to_string());
        Self {
            prefix,
            field,
            extension: extension.into(),
        }
    }

    /// `{prefix}_{row:04}.{ext}` with a 1-based row number, or the
    /// sanitized value of the naming field when the row has a usable one.
    pub fn filename(&self, row_index: usize, row: &Row) -> String {
        let from_field = self
            .field
            .as_ref()
            .and_then(|field| row.get(field))
            .and_then(|value| sanitize_file_stem(&value.to_string()));

        let stem = from_field.unwrap_or_else(|| format!("{}_{:04}", self.prefix, row_index + 1));
        format!("{}.{}", stem, self.extension)
    }
}

/// Makes every name unique by appending `_2`, `_3`, ... in first-come order.
fn unique_name(used: &mut HashSet<String>, filename: &str) -> String {
    if used.insert(filename.to_string()) {
        return filename.to_string();
    }
    let (base, ext) = split_extension(filename);
    let mut counter = 2;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{}_{}.{}", base, counter, ext),
            None => format!("{}_{}", base, counter),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

#[derive(Clone)]
pub struct OutputCollector {
    store: Arc<dyn OutputStore>,
}

impl OutputCollector {
    pub fn new(store: Arc<dyn OutputStore>) -> Self {
        Self { store }
    }

    pub fn store(
        &self,
        job_id: &str,
        row_index: usize,
        filename: &str,
        content: &[u8],
    ) -> Result<OutputRef, OutputError> {
        let reference = OutputRef {
            job_id: job_id.to_string(),
            row_index,
            filename: filename.to_string(),
            size: content.len() as u64,
            content_type: content_type_for(filename),
        };
        self.store.put(&reference, content)?;
        Ok(reference)
    }

    pub fn get(&self, job_id: &str, row_index: usize) -> Result<Output, OutputError> {
        self.store.get(job_id, row_index)
    }

    pub fn list(&self, job_id: &str) -> Result<Vec<OutputRef>, OutputError> {
        self.store.list(job_id)
    }

    pub fn delete_job(&self, job_id: &str) -> Result<usize, OutputError> {
        let removed = self.store.delete_job(job_id)?;
        debug!(job_id, removed, "Deleted job outputs");
        Ok(removed)
    }

    /// Packages every stored output of a job into one zip archive, in row
    /// order. Entry names are unique; the archive bytes depend only on the
    /// stored outputs.
    pub fn bundle(&self, job_id: &str) -> Result<Vec<u8>, OutputError> {
        let references = self.store.list(job_id)?;
        if references.is_empty() {
            return Err(OutputError::EmptyResultSet(job_id.to_string()));
        }

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut used = HashSet::with_capacity(references.len());

        for reference in &references {
            let output = self.store.get(job_id, reference.row_index)?;
            let name = unique_name(&mut used, &reference.filename);

            writer
                .start_file(name.as_str(), options)
                .map_err(|e| OutputError::Archive(e.to_string()))?;
            writer
                .write_all(&output.content)
                .map_err(|e| OutputError::Archive(e.to_string()))?;
        }

        let bytes = writer
            .finish()
            .map_err(|e| OutputError::Archive(e.to_string()))?
            .into_inner();

        info!(job_id, outputs = references.len(), bytes = bytes.len(), "Bundled job outputs");
        Ok(bytes)
    }
}
