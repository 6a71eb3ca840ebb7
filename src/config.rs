//! Pipeline configuration.
//!
//! Loaded from YAML, then overridden by `LOGGRAPH_*` environment variables.
//! The CLI applies its own flags last.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConfigError, PatternError};
use crate::pattern::PatternRegistry;
use crate::serialization::OutputFormat;

pub const ENV_STORE: &str = "LOGGRAPH_STORE";
pub const ENV_PATTERNS: &str = "LOGGRAPH_PATTERNS";
pub const ENV_OUTPUT: &str = "LOGGRAPH_OUTPUT";
pub const ENV_FORMAT: &str = "LOGGRAPH_FORMAT";

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pattern file; the built-in registry is used when absent
    pub patterns: Option<PathBuf>,

    /// Template archive path
    pub store: PathBuf,

    /// Graph output path; stdout when absent
    pub output: Option<PathBuf>,

    pub format: OutputFormat,

    /// Namespace for N-Triples output
    pub base_iri: String,

    /// Type lines on the rayon thread pool
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            patterns: None,
            store: PathBuf::from("templates.json"),
            output: None,
            format: OutputFormat::Ndjson,
            base_iri: "http://example.org/loggraph/".to_string(),
            parallel: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Example
    /// ```ignore
    /// use loggraph::PipelineConfig;
    ///
    /// let config = PipelineConfig::load_from_file("config/loggraph.yaml")?;
    /// println!("Archive: {}", config.store.display());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml_str(&contents)?;
        info!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(store) = lookup(ENV_STORE) {
            self.store = PathBuf::from(store);
        }
        if let Some(patterns) = lookup(ENV_PATTERNS) {
            self.patterns = Some(PathBuf::from(patterns));
        }
        if let Some(output) = lookup(ENV_OUTPUT) {
            self.output = Some(PathBuf::from(output));
        }
        if let Some(format) = lookup(ENV_FORMAT) {
            self.format = OutputFormat::parse(&format).ok_or(ConfigError::InvalidValue {
                field: ENV_FORMAT,
                value: format,
            })?;
        }
        Ok(())
    }

    /// Pattern registry selected by this configuration.
    pub fn registry(&self) -> Result<PatternRegistry, PatternError> {
        match &self.patterns {
            Some(path) => PatternRegistry::load_from_file(path),
            None => PatternRegistry::builtin(),
        }
    }
}
