//! Module artifact discovery.
//!
//! Artifacts follow a one-directory-per-module layout:
//!
//! ```text
//! modules/
//! ├── echo/main.wasm      -> module "echo"
//! └── demos/hello/main.wasm -> module "hello"
//! ```
//!
//! The module name is the name of the directory directly containing the
//! artifact. Discovery is fail-fast: an unreadable artifact aborts startup
//! instead of silently shrinking the catalog.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use wasm_cgi_common::RuntimeError;

/// Raw bytes of one module artifact found on disk.
#[derive(Clone)]
pub struct ModuleArtifact {
    /// Logical module name (parent directory name).
    pub name: String,
    /// Where the artifact was read from.
    pub path: PathBuf,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ModuleArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleArtifact")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("bytes_len", &self.bytes.len())
            .finish()
    }
}

/// Discover and read every artifact named `artifact_name` under `root`.
///
/// Results are ordered by path.
///
/// # Errors
///
/// - [`RuntimeError::Discovery`] if the walk cannot run
/// - [`RuntimeError::NoModulesFound`] if nothing matches
/// - [`RuntimeError::ArtifactRead`] if a matched file cannot be read
pub fn discover(
    root: impl AsRef<Path>,
    artifact_name: &str,
) -> Result<Vec<ModuleArtifact>, RuntimeError> {
    let root = root.as_ref();
    let paths = find_artifacts(root, artifact_name)?;

    if paths.is_empty() {
        return Err(RuntimeError::NoModulesFound {
            root: root.to_path_buf(),
        });
    }

    let artifacts = paths
        .into_iter()
        .map(|path| read_artifact(root, path))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        root = %root.display(),
        count = artifacts.len(),
        "Module artifacts discovered"
    );

    Ok(artifacts)
}

/// Find the paths of all files named `artifact_name` under `root`.
///
/// The root is canonicalized first so that every match has a named parent
/// directory, even when `root` is `.`.
pub fn find_artifacts(root: &Path, artifact_name: &str) -> Result<Vec<PathBuf>, RuntimeError> {
    let canonical =
        std::fs::canonicalize(root).map_err(|e| RuntimeError::discovery(root, e.to_string()))?;

    if !canonical.is_dir() {
        return Err(RuntimeError::discovery(root, "not a directory"));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(&canonical).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| RuntimeError::discovery(root, e.to_string()))?;

        if entry.file_type().is_file() && entry.file_name() == OsStr::new(artifact_name) {
            debug!(path = %entry.path().display(), "Found module artifact");
            paths.push(entry.into_path());
        }
    }

    Ok(paths)
}

/// Derive the module name from an artifact path.
pub fn module_name(path: &Path) -> Option<&str> {
    path.parent()?.file_name()?.to_str()
}

fn read_artifact(root: &Path, path: PathBuf) -> Result<ModuleArtifact, RuntimeError> {
    let name = module_name(&path)
        .ok_or_else(|| {
            RuntimeError::discovery(
                root,
                format!("cannot derive a module name from {}", path.display()),
            )
        })?
        .to_string();

    let bytes = std::fs::read(&path).map_err(|source| RuntimeError::ArtifactRead {
        path: path.clone(),
        source,
    })?;

    Ok(ModuleArtifact { name, path, bytes })
}
