//! Core implementation of runem
//!
//! runem finds every `package.json` below a directory and either lists the
//! scripts each package declares or runs one script in every package that
//! declares it, streaming the combined output back to the caller.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config_file::{Config, ConfigError};
use crate::options::Options;

pub mod config_file;
pub mod list;
pub mod logger;
pub mod manifest;
pub mod options;
pub mod report;
pub mod run;

pub use list::{ScriptListing, list};
pub use options::{DEFAULT_IGNORE, ExecutionMode, RunnerCommand};
pub use run::{AggregateResult, RunError, RunEvent, RunHandle, run};

/// Build options from a config file (explicit, or discovered from `root` upward).
///
/// Returns the options and the config file they came from, if any. Without a
/// config file the defaults are used.
///
/// # Errors
///
/// Returns `ConfigError` if an explicit config file does not exist, or a config
/// file cannot be parsed or contains invalid values.
pub fn load_options(
    config_file: Option<&Path>,
    root: &Path,
) -> Result<(Options, Option<PathBuf>), ConfigError> {
    let config_path = match config_file {
        Some(file) => {
            if !file.exists() {
                return Err(ConfigError::ConfigNotFound(file.to_path_buf()));
            }
            Some(file.to_path_buf())
        }
        None => Config::find_config(root),
    };
    let Some(config_path) = config_path else {
        debug!("No config file found, using defaults");
        return Ok((Options::default(), None));
    };

    debug!("Loading options from {}", config_path.display());
    let config = Config::from_file(&config_path)?;
    if let Some(version) = &config.runem_version {
        validate_version(version);
    }
    config.validate()?;
    Ok((config.apply(Options::default()), Some(config_path)))
}

/// Warn if the config's `runem_version` doesn't match the binary version
fn validate_version(config_version: &str) {
    let binary_version = env!("CARGO_PKG_VERSION");
    if config_version != binary_version {
        warn!(
            "Config runem_version '{config_version}' differs from binary version '{binary_version}'"
        );
    }
}
