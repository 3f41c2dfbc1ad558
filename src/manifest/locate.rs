//! Manifest discovery under a root directory

use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// File name of the manifests being searched for.
pub const MANIFEST_FILE: &str = "package.json";

/// Errors raised while walking the directory tree
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Unable to walk directory tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Discovery task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Strip trailing separators and `.` segments so reported paths are built from a clean root.
fn normalize_root(root: &Path) -> PathBuf {
    let root: PathBuf = root.components().collect();
    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root
    }
}

/// Whether the walk must not descend into `entry`.
///
/// The root itself is never excluded, so a root that lives inside an
/// excluded directory is still searched.
fn is_excluded(entry: &DirEntry, excluded: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && excluded.iter().any(|name| entry.file_name() == name.as_str())
}

/// Entries below `root` in sorted order, never entering an excluded directory.
fn walk<'a>(
    root: &Path,
    excluded: &'a [String],
) -> impl Iterator<Item = walkdir::Result<DirEntry>> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| !is_excluded(entry, excluded))
}

/// Find every manifest under `root`, skipping subtrees named in `excluded`.
///
/// Results follow the sorted traversal order of the walk, so repeated calls on
/// an unchanged tree return the same sequence. A root that does not exist has
/// no manifests.
///
/// # Errors
///
/// Returns `DiscoveryError::Walk` if a directory that is searched cannot be read.
pub fn locate(root: &Path, excluded: &[String]) -> Result<Vec<PathBuf>, DiscoveryError> {
    let root = normalize_root(root);
    if !root.exists() {
        debug!("Root {} does not exist, no manifests", root.display());
        return Ok(Vec::new());
    }
    debug!("Searching manifests under {} (excluding {excluded:?})", root.display());

    let mut manifests = Vec::new();
    for entry in walk(&root, excluded) {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE {
            manifests.push(entry.into_path());
        }
    }
    debug!("Found {} manifests under {}", manifests.len(), root.display());
    Ok(manifests)
}

/// [`locate`] on the blocking pool, for use from async code.
///
/// # Errors
///
/// Same as [`locate`], plus `DiscoveryError::Join` if the blocking task panics.
pub async fn locate_async(
    root: &Path,
    excluded: Vec<String>,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || locate(&root, &excluded)).await?
}
