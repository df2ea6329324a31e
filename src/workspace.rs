//! Disposable sandbox used to reproduce a clean install.
//!
//! A workspace is created per run and removed when released or dropped, so
//! every exit path (error return, early return, panic unwinding) tears it
//! down.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

/// Registry configuration copied from the project so private packages
/// resolve the same way inside the sandbox.
pub const CREDENTIAL_FILES: &[&str] = &[".npmrc", ".yarnrc", ".yarnrc.yml"];

const WORKSPACE_PREFIX: &str = "node-patcher-";

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("failed to create temporary workspace: {0}")]
    Create(#[source] std::io::Error),

    #[error("failed to remove temporary workspace {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to copy {from} into workspace: {source}")]
    Copy {
        from: PathBuf,
        source: std::io::Error,
    },
}

/// Exclusively owned temporary directory for one pipeline run.
#[derive(Debug)]
pub struct IsolatedWorkspace {
    dir: TempDir,
}

impl IsolatedWorkspace {
    /// Allocate a uniquely named directory in the system temp location.
    pub fn acquire() -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()
            .map_err(WorkspaceError::Create)?;
        tracing::debug!(path = %dir.path().display(), "acquired workspace");
        Ok(Self { dir })
    }

    /// Allocate inside `parent` instead of the system temp location.
    pub fn acquire_in(parent: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(parent)
            .map_err(WorkspaceError::Create)?;
        tracing::debug!(path = %dir.path().display(), "acquired workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the workspace, reporting removal failures.
    ///
    /// Dropping the workspace also removes it but ignores errors.
    pub fn release(self) -> Result<(), WorkspaceError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| WorkspaceError::Remove { path: path.clone(), source })?;
        tracing::debug!(path = %path.display(), "released workspace");
        Ok(())
    }

    /// Copy registry credential files found at `project_root` into `dest`.
    ///
    /// Returns the names of the files copied.
    pub fn copy_registry_credentials(
        &self,
        project_root: &Path,
        dest: &Path,
    ) -> Result<Vec<&'static str>, WorkspaceError> {
        let mut copied = Vec::new();
        for name in CREDENTIAL_FILES {
            let from = project_root.join(name);
            if !from.is_file() {
                continue;
            }
            fs::create_dir_all(dest)
                .and_then(|()| fs::copy(&from, dest.join(name)))
                .map_err(|source| WorkspaceError::Copy {
                    from: from.clone(),
                    source,
                })?;
            copied.push(*name);
        }
        Ok(copied)
    }
}
