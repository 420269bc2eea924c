pub mod collector;
pub mod filesystem;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::OutputError;

pub use collector::{OutputCollector, OutputNaming};
pub use filesystem::FileOutputStore;
pub use memory::MemoryOutputStore;

/// Metadata of a stored output, referenced from a `RowResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub job_id: String,
    pub row_index: usize,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
}

/// A generated document and its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub reference: OutputRef,
    pub content: Vec<u8>,
}

/// Keeps generated documents keyed by job id and row index.
pub trait OutputStore: Send + Sync {
    /// Stores `content` under `reference.job_id` / `reference.row_index`,
    /// replacing an earlier output for the same row.
    fn put(&self, reference: &OutputRef, content: &[u8]) -> Result<(), OutputError>;

    fn get(&self, job_id: &str, row_index: usize) -> Result<Output, OutputError>;

    /// Outputs of a job in row order.
    fn list(&self, job_id: &str) -> Result<Vec<OutputRef>, OutputError>;

    /// Removes all outputs of a job. Returns how many were removed.
    fn delete_job(&self, job_id: &str) -> Result<usize, OutputError>;
}

/// Content type for a generated file name.
pub fn content_type_for(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("output_0001.txt"), "text/plain");
        assert_eq!(content_type_for("bundle.zip"), "application/zip");
        assert_eq!(content_type_for("no_extension"), "application/octet-stream");
    }
}
