//! Configuration file handling for runem

use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::{ExecutionMode, Options, RunnerCommand};

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),
    #[error("Unable to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to parse YAML config file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON config file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Invalid config: {0}")]
    Validation(String),
}

/// Root configuration structure, every field optional
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub runem_version: Option<String>,
    pub ignore: Option<Vec<String>>,
    pub runner: Option<RunnerCommand>,
    pub mode: Option<ExecutionMode>,
    pub failure_code: Option<i32>,
}

/// List of supported configuration file names
const FILENAMES: [&str; 3] = [".runem.json", ".runem.yaml", ".runem.yml"];

impl Config {
    /// Loads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(file).map_err(|source| ConfigError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        let config: Config = if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        Ok(config)
    }

    /// Searches for a configuration file in `start` and its parents.
    #[must_use]
    pub fn find_config(start: &Path) -> Option<PathBuf> {
        let mut path = std::path::absolute(start).unwrap_or_else(|_| start.to_path_buf());
        debug!("Searching for config file from {}", path.display());
        loop {
            for file in &FILENAMES {
                let config_path = path.join(file);
                if config_path.is_file() {
                    info!("Found config file: {}", config_path.display());
                    return Some(config_path);
                }
            }
            if !path.pop() {
                return None;
            }
        }
    }

    /// Reject values that would make discovery or spawning misbehave.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(runner) = &self.runner
            && runner.program.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "runner program must not be empty".to_string(),
            ));
        }
        for name in self.ignore.iter().flatten() {
            validate_ignore_name(name)?;
        }
        Ok(())
    }

    /// Apply this config on top of `options`; ignore names are unioned.
    #[must_use]
    pub fn apply(self, mut options: Options) -> Options {
        for name in self.ignore.unwrap_or_default() {
            if !options.ignore.contains(&name) {
                options.ignore.push(name);
            }
        }
        if let Some(runner) = self.runner {
            options.runner = runner;
        }
        if let Some(mode) = self.mode {
            options.mode = mode;
        }
        if let Some(failure_code) = self.failure_code {
            options.failure_code = failure_code;
        }
        options
    }
}

/// Exclusions are matched against single path segments.
///
/// # Errors
///
/// Returns `ConfigError::Validation` for empty names or names containing a separator.
pub fn validate_ignore_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "ignore entries must not be empty".to_string(),
        ));
    }
    if name.contains(['/', '\\']) {
        return Err(ConfigError::Validation(format!(
            "ignore entry '{name}' must be a directory name, not a path"
        )));
    }
    Ok(())
}
