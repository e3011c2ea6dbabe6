use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tunables for folder users metadata jobs
///
/// Loaded from a TOML file; every field has a default.
///
/// ```toml
/// max_parallel_sub_jobs = 4
/// max_depth = 16
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// How many re-encryption sub-jobs a single job runs at once
    #[serde(default = "default_max_parallel_sub_jobs")]
    pub max_parallel_sub_jobs: usize,
    /// Maximum nesting of encrypted folders below the job's root
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_parallel_sub_jobs() -> usize {
    8
}

fn default_max_depth() -> usize {
    32
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_parallel_sub_jobs: default_max_parallel_sub_jobs(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl JobConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: JobConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_sub_jobs == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_sub_jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
