use serde::{Deserialize, Serialize};

use crate::mapping::{Confidence, SynonymGroup};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillConfig {
    pub version: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Per-row timeout in seconds; 0 disables it.
    #[serde(default = "default_row_timeout_secs")]
    pub row_timeout_secs: u64,
    /// Persist running job counters every N rows.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_row_timeout_secs() -> u64 {
    30
}

fn default_checkpoint_every() -> usize {
    10
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            worker_count: default_worker_count(),
            row_timeout_secs: default_row_timeout_secs(),
            checkpoint_every: default_checkpoint_every(),
            output: OutputConfig::default(),
            matcher: MatcherConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl FillConfig {
    pub fn row_timeout(&self) -> Option<std::time::Duration> {
        (self.row_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.row_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Outputs are kept in memory when unset.
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
    /// Column whose value names each output file.
    #[serde(default)]
    pub filename_field: Option<String>,
}

fn default_filename_prefix() -> String {
    "output".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            filename_prefix: default_filename_prefix(),
            filename_field: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_true")]
    pub include_builtin_synonyms: bool,
    #[serde(default)]
    pub synonyms: Vec<SynonymGroup>,
    /// Lowest tier turned into a draft mapping entry.
    #[serde(default = "default_auto_accept")]
    pub auto_accept: Confidence,
}

fn default_true() -> bool {
    true
}

fn default_auto_accept() -> Confidence {
    Confidence::Medium
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            include_builtin_synonyms: true,
            synonyms: Vec::new(),
            auto_accept: default_auto_accept(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; jobs and mappings stay in memory when unset.
    #[serde(default)]
    pub path: Option<String>,
}
