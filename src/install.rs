//! Baseline installation.
//!
//! Materialises a clean copy of one dependency inside an isolated workspace
//! by writing a single-dependency manifest and running the project's package
//! manager against it.

use crate::config::Options;
use crate::package_details::PackageDetails;
use crate::package_manager::PackageManager;
use crate::resolution::resolve_relative_file_dependencies;
use crate::runner::{CommandRunner, RunnerError};
use crate::workspace::{IsolatedWorkspace, WorkspaceError};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(
        "failed to install {package} with {package_manager}\n\
         first attempt: {first}\n\
         attempt with --ignore-scripts: {second}"
    )]
    Failed {
        package: String,
        package_manager: PackageManager,
        first: RunnerError,
        second: RunnerError,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to replace symlinked install at {path}: {source}")]
    Symlink {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// Manifest-level override sections carried into the sandbox.
const OVERRIDE_KEYS: &[&str] = &["resolutions", "overrides"];

/// What the installer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Directory holding the sandbox `package.json`
    pub npm_root: PathBuf,
    /// Lifecycle scripts had to be disabled
    pub used_fallback: bool,
    pub copied_credentials: Vec<&'static str>,
}

pub struct BaselineInstaller<'a> {
    runner: &'a dyn CommandRunner,
    options: Options,
}

impl<'a> BaselineInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner, options: Options) -> Self {
        Self { runner, options }
    }

    /// Install `details` at `version` inside `workspace`.
    ///
    /// The first attempt allows lifecycle scripts; if it fails the install is
    /// retried once with scripts disabled. Both failures are reported.
    pub fn install(
        &self,
        workspace: &IsolatedWorkspace,
        app_root: &Path,
        app_manifest: &Value,
        details: &PackageDetails,
        version: &str,
        package_manager: PackageManager,
    ) -> Result<InstallReport, InstallError> {
        let npm_root = npm_root(workspace.path(), details);
        fs::create_dir_all(&npm_root).map_err(|source| InstallError::Write {
            path: npm_root.clone(),
            source,
        })?;

        let manifest = baseline_manifest(&details.name, version, app_manifest, app_root);
        let manifest_path = npm_root.join("package.json");
        let write_err = |source| InstallError::Write {
            path: manifest_path.clone(),
            source,
        };
        let rendered = serde_json::to_string_pretty(&manifest)
            .map_err(|err| write_err(std::io::Error::from(err)))?;
        fs::write(&manifest_path, rendered).map_err(write_err)?;
        if self.options.debug {
            eprintln!("baseline manifest {}:\n{manifest:#}", manifest_path.display());
        }

        let copied_credentials = workspace.copy_registry_credentials(app_root, &npm_root)?;

        let strategy = package_manager.strategy();
        let first_argv: Vec<&str> = std::iter::once(strategy.program)
            .chain(strategy.install_args.iter().copied())
            .collect();

        let mut used_fallback = false;
        if let Err(first) = self.runner.run_checked(&first_argv, &npm_root, &[]) {
            tracing::warn!(
                package = %details.path_specifier,
                error = %first,
                "install failed, retrying with lifecycle scripts disabled"
            );
            used_fallback = true;
            let second_argv: Vec<&str> = std::iter::once(strategy.program)
                .chain(strategy.no_scripts_args.iter().copied())
                .collect();
            if let Err(second) = self.runner.run_checked(&second_argv, &npm_root, &[]) {
                return Err(InstallError::Failed {
                    package: format!("{}@{}", details.name, version),
                    package_manager,
                    first,
                    second,
                });
            }
        }

        if strategy.symlinked_install {
            normalize_symlinked_install(&workspace.path().join(&details.path))?;
        }

        Ok(InstallReport {
            npm_root,
            used_fallback,
            copied_credentials,
        })
    }
}

/// Directory whose `node_modules` directly contains the target package.
pub fn npm_root(workspace_root: &Path, details: &PackageDetails) -> PathBuf {
    let suffix = format!("node_modules/{}", details.name);
    let parent = details
        .path
        .strip_suffix(&suffix)
        .unwrap_or("")
        .trim_end_matches('/');
    if parent.is_empty() {
        workspace_root.to_path_buf()
    } else {
        workspace_root.join(parent)
    }
}

/// Manifest declaring only `name@version` plus the host's override rules.
pub fn baseline_manifest(
    name: &str,
    version: &str,
    app_manifest: &Value,
    app_root: &Path,
) -> Value {
    let mut manifest = Map::new();
    manifest.insert("dependencies".to_string(), json!({ name: version }));

    for key in OVERRIDE_KEYS {
        if let Some(rules) = app_manifest.get(*key) {
            manifest.insert(
                (*key).to_string(),
                resolve_relative_file_dependencies(app_root, rules),
            );
        }
    }
    if let Some(rules) = app_manifest.get("pnpm").and_then(|p| p.get("overrides")) {
        manifest.insert(
            "pnpm".to_string(),
            json!({ "overrides": resolve_relative_file_dependencies(app_root, rules) }),
        );
    }

    Value::Object(manifest)
}

/// Replace a symlinked package directory with the real directory it points to.
pub fn normalize_symlinked_install(package_path: &Path) -> Result<(), InstallError> {
    let is_symlink = fs::symlink_metadata(package_path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if !is_symlink {
        return Ok(());
    }

    let to_err = |source| InstallError::Symlink {
        path: package_path.to_path_buf(),
        source,
    };
    let real = fs::canonicalize(package_path).map_err(to_err)?;
    remove_symlink(package_path).map_err(to_err)?;
    fs::rename(&real, package_path).map_err(to_err)?;
    tracing::debug!(
        from = %real.display(),
        to = %package_path.display(),
        "unlinked symlinked install"
    );
    Ok(())
}

#[cfg(unix)]
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    fs::remove_file(path)
}

#[cfg(windows)]
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    // directory junctions and symlinks are removed like directories
    fs::remove_dir(path).or_else(|_| fs::remove_file(path))
}
