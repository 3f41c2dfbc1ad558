//! Listing the scripts declared across a directory tree

use std::path::{Path, PathBuf};

use futures::future::join_all;
use log::{debug, warn};

use crate::manifest::locate::{DiscoveryError, locate_async};
use crate::manifest::read_manifest;
use crate::options::Options;

/// A manifest that could not be read or parsed and was treated as having no scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedManifest {
    pub path: PathBuf,
    pub reason: String,
}

/// Manifest path to script names, in discovery order.
///
/// Only manifests declaring at least one script are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptListing {
    entries: Vec<(PathBuf, Vec<String>)>,
    /// Manifests skipped because they failed to read or parse.
    pub skipped: Vec<SkippedManifest>,
}

impl ScriptListing {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, manifest: &Path) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(path, _)| path == manifest)
            .map(|(_, scripts)| scripts.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[String])> {
        self.entries
            .iter()
            .map(|(path, scripts)| (path.as_path(), scripts.as_slice()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|(path, _)| path.as_path())
    }

    /// JSON object mapping each manifest path to its script names, key order preserved.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(path, scripts)| (path.display().to_string(), scripts.clone().into()))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// List the scripts of every manifest under `root`.
///
/// Manifests are read concurrently. A manifest that fails to read or parse is
/// recorded in [`ScriptListing::skipped`] instead of failing the call.
///
/// # Errors
///
/// Returns `DiscoveryError` if the directory tree cannot be walked.
pub async fn list(root: &Path, options: &Options) -> Result<ScriptListing, DiscoveryError> {
    let paths = locate_async(root, options.excluded_names()).await?;
    let manifests = join_all(paths.iter().map(|path| read_manifest(path))).await;

    let mut listing = ScriptListing::default();
    for (path, manifest) in paths.into_iter().zip(manifests) {
        match manifest {
            Ok(manifest) if manifest.scripts.is_empty() => {
                debug!("No scripts in {}", path.display());
            }
            Ok(manifest) => listing.entries.push((path, manifest.script_names())),
            Err(e) => {
                warn!("Skipping manifest: {e}");
                listing.skipped.push(SkippedManifest {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(listing)
}
