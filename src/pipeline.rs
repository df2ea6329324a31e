//! Patch generation pipeline.
//!
//! Resolver, workspace, installer, scribe, validator and writer run in that
//! order. The isolated workspace is released on every exit path before the
//! result is returned.

use crate::artifact::{ArtifactError, PatchArtifactWriter, WrittenPatch};
use crate::config::{read_manifest, ConfigError, MakePatchOptions};
use crate::filter::{FilterError, PathFilter};
use crate::install::{BaselineInstaller, InstallError};
use crate::issue;
use crate::package_details::PackageDetails;
use crate::package_manager::{detect_package_manager, PackageManager, ResolverError};
use crate::patch::{DiffValidator, ValidationError};
use crate::resolution::{installed_version, resolve_version, ResolutionError};
use crate::runner::CommandRunner;
use crate::scribe::{ScribeError, VersionControlScribe};
use crate::workspace::{IsolatedWorkspace, WorkspaceError};
use colored::Colorize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MakePatchError {
    #[error("'{0}' is not a valid package name or path")]
    InvalidSpecifier(String),

    #[error("no such package {package}: {} does not exist", .path.display())]
    TargetMissing { package: String, path: PathBuf },

    #[error(
        "not creating a patch file for {package}: there don't appear to be any changes. \
         Edit the files under node_modules first"
    )]
    EmptyDiff { package: String },

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Scribe(#[from] ScribeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl MakePatchError {
    /// The tool misread valid input, as opposed to a user-actionable failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::ParseFailed { .. }))
    }

    /// Diagnostic dump written for an internal error, if any.
    pub fn diagnostic_path(&self) -> Option<&Path> {
        match self {
            Self::Validation(ValidationError::ParseFailed {
                diagnostic_path: Some(path),
                ..
            }) => Some(path),
            _ => None,
        }
    }
}

/// Successful run.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub details: PackageDetails,
    /// Version recorded in the patch file name and header
    pub version: String,
    pub package_manager: PackageManager,
    pub patch: WrittenPatch,
    /// Number of files touched by the patch
    pub file_count: usize,
}

fn step(message: impl std::fmt::Display) {
    println!("{} {message}", "•".cyan());
}

/// Generate a patch for the dependency named by `spec`.
pub fn make_patch(
    spec: &str,
    opts: &MakePatchOptions,
    runner: &dyn CommandRunner,
) -> Result<PatchOutcome, MakePatchError> {
    let details = PackageDetails::from_cli_string(spec)
        .ok_or_else(|| MakePatchError::InvalidSpecifier(spec.to_string()))?;
    let app_root = opts.app_path.as_path();

    let detection = detect_package_manager(app_root, opts.package_manager)?;
    if let Some(notice) = &detection.notice {
        println!("{} {notice}", "!".yellow().bold());
    }
    let package_manager = detection.package_manager;
    tracing::info!(%package_manager, package = %details.path_specifier, "resolved package manager");

    let app_manifest = read_manifest(&app_root.join("package.json"))?;

    let installed_path = app_root.join(&details.path);
    if !installed_path.is_dir() {
        return Err(MakePatchError::TargetMissing {
            package: details.path_specifier.clone(),
            path: installed_path,
        });
    }

    let version = resolve_version(&details, package_manager, app_root)?;
    tracing::info!(package = %details.path_specifier, %version, "resolved version");
    // commit-pinned sources are named by their hash, everything else by the
    // version actually installed
    let artifact_version = if version.contains('#') {
        version.clone()
    } else {
        installed_version(app_root, &details)?
    };

    let filter = PathFilter::new(
        &opts.include,
        &opts.exclude,
        opts.case_sensitive_path_filtering,
    )?;

    step("Creating temporary folder");
    let workspace = match &opts.temp_root {
        Some(parent) => IsolatedWorkspace::acquire_in(parent)?,
        None => IsolatedWorkspace::acquire()?,
    };

    let diff = diff_in_workspace(
        &workspace,
        runner,
        opts,
        &app_manifest,
        &details,
        &version,
        package_manager,
        filter,
        &installed_path,
    );
    let released = workspace.release();
    let diff = match (diff, released) {
        (Ok(diff), Ok(())) => diff,
        (Ok(_), Err(err)) => return Err(err.into()),
        (Err(err), released) => {
            if let Err(release_err) = released {
                tracing::warn!(error = %release_err, "could not remove temporary folder");
            }
            return Err(err);
        }
    };

    if diff.trim().is_empty() {
        return Err(MakePatchError::EmptyDiff {
            package: details.path_specifier.clone(),
        });
    }

    let diagnostics_dir = match &opts.diagnostics_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let files = DiffValidator::new(diagnostics_dir).validate(&diff)?;

    let writer = PatchArtifactWriter::new(opts.patches_dir(), opts.invocation.clone());
    let patch = writer.write(&details, &artifact_version, &diff)?;
    for old in &patch.superseded {
        if *old != patch.file_name {
            println!("{} Deleted old patch file {}", "•".cyan(), old.dimmed());
        }
    }
    println!(
        "{} Created file {}",
        "✔".green(),
        Path::new(&opts.patch_dir).join(&patch.file_name).display().to_string().bold()
    );
    tracing::info!(patch = %patch.path.display(), files = files.len(), "wrote patch");

    issue::offer_issue_creation(
        app_root,
        &details,
        &artifact_version,
        &diff,
        package_manager,
        opts.create_issue,
    );

    Ok(PatchOutcome {
        details,
        version: artifact_version,
        package_manager,
        patch,
        file_count: files.len(),
    })
}

#[allow(clippy::too_many_arguments)]
fn diff_in_workspace(
    workspace: &IsolatedWorkspace,
    runner: &dyn CommandRunner,
    opts: &MakePatchOptions,
    app_manifest: &serde_json::Value,
    details: &PackageDetails,
    version: &str,
    package_manager: PackageManager,
    filter: PathFilter,
    installed_path: &Path,
) -> Result<String, MakePatchError> {
    step(format!(
        "Installing {}@{version} with {package_manager}",
        details.name
    ));
    let installer = BaselineInstaller::new(runner, opts.options);
    let report = installer.install(
        workspace,
        &opts.app_path,
        app_manifest,
        details,
        version,
        package_manager,
    )?;
    if report.used_fallback {
        println!(
            "{} install succeeded with lifecycle scripts disabled",
            "!".yellow().bold()
        );
    }

    step("Diffing your files with clean files");
    let scribe = VersionControlScribe::new(runner, workspace.path(), filter);
    scribe.commit_baseline(details)?;
    let diff = scribe.overlay_and_diff(details, installed_path)?;
    Ok(String::from_utf8_lossy(&diff).into_owned())
}
