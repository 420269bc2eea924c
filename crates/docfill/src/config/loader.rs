use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::FillConfig;
use crate::error::ConfigError;
use crate::mapping::SynonymTable;

const SCHEMA_JSON: &str = include_str!("../../schema/fill-config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FillConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<FillConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: FillConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Semantic checks the schema cannot express. Also applied to configs
/// built in code.
pub fn validate_config(config: &FillConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.checkpoint_every == 0 {
        return Err(ConfigError::Validation {
            message: "checkpoint_every must be at least 1".to_string(),
        });
    }

    if config.output.filename_prefix.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "output.filename_prefix must not be blank".to_string(),
        });
    }

    let mut keys = HashSet::new();
    for group in &config.matcher.synonyms {
        if !keys.insert(group.key.as_str()) {
            return Err(ConfigError::InvalidSynonymGroup {
                key: group.key.clone(),
                reason: "Duplicate synonym group key".to_string(),
            });
        }
    }

    // Builds the table once to surface invalid groups at load time.
    SynonymTable::from_groups(
        config.matcher.include_builtin_synonyms,
        &config.matcher.synonyms,
    )?;

    Ok(())
}
