use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::OutputError;
use crate::sanitize::{redact_path, sanitize_file_stem};
use crate::storage::{content_type_for, Output, OutputRef, OutputStore};

/// Stores outputs as `{root}/{job_id}/{row_index}/{filename}`.
///
/// One directory per row keeps `put` and `get` independent of how many rows
/// a job has; only `list` and `delete_job` read the job directory.
pub struct FileOutputStore {
    output_directory: PathBuf,
}

/// Row directories are plain decimal indices of any length.
fn parse_row_directory(name: &str) -> Option<usize> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

impl FileOutputStore {
    pub fn new<P: AsRef<Path>>(output_directory: P) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    fn job_directory(&self, job_id: &str) -> PathBuf {
        let component = sanitize_file_stem(job_id).unwrap_or_else(|| "_".to_string());
        self.output_directory.join(component)
    }

    fn row_directory(&self, job_id: &str, row_index: usize) -> PathBuf {
        self.job_directory(job_id).join(row_index.to_string())
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), OutputError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| OutputError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// The stored file of one row, skipping in-progress temp files.
    fn row_file(&self, job_id: &str, row_index: usize) -> Result<Option<(PathBuf, String)>, OutputError> {
        let dir = self.row_directory(job_id, row_index);
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OutputError::ReadFile { path: dir, source: e }),
        };

        for entry in read_dir {
            let entry = entry.map_err(|e| OutputError::ReadFile {
                path: dir.clone(),
                source: e,
            })?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                return Ok(Some((entry.path(), name)));
            }
        }
        Ok(None)
    }

    /// Row indices present in a job directory, in row order.
    fn rows(&self, job_id: &str) -> Result<Vec<usize>, OutputError> {
        let dir = self.job_directory(job_id);
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OutputError::ReadFile { path: dir, source: e }),
        };

        let mut rows = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| OutputError::ReadFile {
                path: dir.clone(),
                source: e,
            })?;
            if let Some(row_index) = parse_row_directory(&entry.file_name().to_string_lossy()) {
                rows.push(row_index);
            }
        }
        rows.sort_unstable();
        Ok(rows)
    }

    fn reference_for(&self, job_id: &str, row_index: usize, path: &Path, filename: &str) -> Result<OutputRef, OutputError> {
        let metadata = std::fs::metadata(path).map_err(|e| OutputError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(OutputRef {
            job_id: job_id.to_string(),
            row_index,
            filename: filename.to_string(),
            size: metadata.len(),
            content_type: content_type_for(filename),
        })
    }
}

impl OutputStore for FileOutputStore {
    fn put(&self, reference: &OutputRef, content: &[u8]) -> Result<(), OutputError> {
        let dir = self.row_directory(&reference.job_id, reference.row_index);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| OutputError::WriteFile {
                path: dir.clone(),
                source: e,
            })?;
        }
        self.ensure_directory(&dir)?;

        let final_path = dir.join(&reference.filename);
        let temp_path = dir.join(format!(".{}.tmp", reference.filename));

        let mut file = std::fs::File::create(&temp_path).map_err(|e| OutputError::WriteFile {
            path: temp_path.clone(),
            source: e,
        })?;
        file.write_all(content).map_err(|e| OutputError::WriteFile {
            path: temp_path.clone(),
            source: e,
        })?;
        drop(file);

        std::fs::rename(&temp_path, &final_path).map_err(|e| OutputError::WriteFile {
            path: final_path.clone(),
            source: e,
        })?;

        debug!(file = %redact_path(&final_path), bytes = content.len(), "Stored output");
        Ok(())
    }

    fn get(&self, job_id: &str, row_index: usize) -> Result<Output, OutputError> {
        let (path, filename) = self.row_file(job_id, row_index)?.ok_or_else(|| OutputError::NotFound {
            job_id: job_id.to_string(),
            row_index,
        })?;

        let content = std::fs::read(&path).map_err(|e| OutputError::ReadFile {
            path: path.clone(),
            source: e,
        })?;
        let reference = self.reference_for(job_id, row_index, &path, &filename)?;
        Ok(Output { reference, content })
    }

    fn list(&self, job_id: &str) -> Result<Vec<OutputRef>, OutputError> {
        let mut references = Vec::new();
        for row_index in self.rows(job_id)? {
            if let Some((path, filename)) = self.row_file(job_id, row_index)? {
                references.push(self.reference_for(job_id, row_index, &path, &filename)?);
            }
        }
        Ok(references)
    }

    fn delete_job(&self, job_id: &str) -> Result<usize, OutputError> {
        let count = self.rows(job_id)?.len();
        let dir = self.job_directory(job_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| OutputError::WriteFile { path: dir, source: e })?;
        }
        Ok(count)
    }
}
