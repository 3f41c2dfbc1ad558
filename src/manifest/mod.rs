//! Package manifests and the scripts they declare

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

pub mod locate;

/// Errors that can occur while reading a single manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Unable to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A parsed manifest, script names in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub path: PathBuf,
    pub scripts: Vec<String>,
}

/// On-disk shape; everything except the keys of `scripts` is ignored.
#[derive(Debug, Deserialize)]
struct RawManifest {
    scripts: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Manifest {
    /// Parse manifest bytes read from `path`.
    ///
    /// A manifest without a `scripts` section has no scripts; that is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ManifestError::Parse` if `bytes` is not a JSON object of the expected shape.
    pub fn from_slice(path: &Path, bytes: &[u8]) -> Result<Self, ManifestError> {
        let raw: RawManifest =
            serde_json::from_slice(bytes).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            scripts: raw
                .scripts
                .unwrap_or_default()
                .into_iter()
                .map(|(name, _)| name)
                .collect(),
        })
    }

    #[must_use]
    pub fn script_names(&self) -> Vec<String> {
        self.scripts.clone()
    }

    #[must_use]
    pub fn declares(&self, script: &str) -> bool {
        self.scripts.iter().any(|s| s == script)
    }

    /// Directory the package runner is started in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        package_dir(&self.path)
    }
}

/// Containing directory of a manifest path, `.` for a bare file name.
#[must_use]
pub fn package_dir(manifest: &Path) -> &Path {
    match manifest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// One runnable unit: a script name inside one manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptRef {
    pub manifest: PathBuf,
    pub script: String,
}

impl fmt::Display for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.script, package_dir(&self.manifest).display())
    }
}

/// Read and parse the manifest at `path`.
///
/// # Errors
///
/// Returns `ManifestError::Io` if the file cannot be read, or
/// `ManifestError::Parse` if it is not valid JSON.
pub async fn read_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let manifest = Manifest::from_slice(path, &bytes)?;
    debug!(
        "Read {} scripts from {}",
        manifest.scripts.len(),
        path.display()
    );
    Ok(manifest)
}

/// Script names declared by the manifest at `path`, in declaration order.
///
/// # Errors
///
/// Same as [`read_manifest`].
pub async fn read_scripts(path: &Path) -> Result<Vec<String>, ManifestError> {
    Ok(read_manifest(path).await?.script_names())
}
