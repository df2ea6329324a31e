//! Git snapshots of the baseline and the developer's copy.
//!
//! Phase one commits the clean install of a dependency; phase two overlays
//! the developer's modified copy and diffs the staged tree against that
//! commit. Only the dependency's subtree is ever tracked.

use crate::filter::{FilterError, PathFilter};
use crate::package_details::PackageDetails;
use crate::runner::{CommandRunner, RunnerError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const GIT_USER_NAME: &str = "node-patcher";
pub const GIT_USER_EMAIL: &str = "patches@node-patcher.local";
const BASELINE_COMMIT_MESSAGE: &str = "baseline";

/// Generated files at the top of a package that never belong in a patch.
pub const EXCLUDED_LOCKFILES: &[&str] = &[
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
];

/// Directories stripped from a package before it is tracked.
const NESTED_METADATA_DIRS: &[&str] = &["node_modules", ".git"];

#[derive(Error, Debug)]
pub enum ScribeError {
    #[error("git {step} failed: {source}")]
    Git {
        step: &'static str,
        source: RunnerError,
    },

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Filter(#[from] FilterError),
}

pub struct VersionControlScribe<'a> {
    runner: &'a dyn CommandRunner,
    repo_root: PathBuf,
    filter: PathFilter,
}

impl<'a> VersionControlScribe<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        repo_root: impl Into<PathBuf>,
        filter: PathFilter,
    ) -> Self {
        Self {
            runner,
            repo_root: repo_root.into(),
            filter,
        }
    }

    fn git(&self, step: &'static str, args: &[&str]) -> Result<Vec<u8>, ScribeError> {
        // isolate from the host's global and system git configuration
        let home = self.repo_root.to_string_lossy().into_owned();
        let env = [
            ("HOME", home.as_str()),
            ("XDG_CONFIG_HOME", home.as_str()),
            ("GIT_CONFIG_NOSYSTEM", "1"),
            ("GIT_TERMINAL_PROMPT", "0"),
        ];
        // paths with non-ASCII bytes are emitted verbatim instead of octal-quoted
        let argv: Vec<&str> = ["git", "-c", "core.quotepath=off"]
            .into_iter()
            .chain(args.iter().copied())
            .collect();
        self.runner
            .run_checked(&argv, &self.repo_root, &env)
            .map(|output| output.stdout)
            .map_err(|source| ScribeError::Git { step, source })
    }

    fn package_path(&self, details: &PackageDetails) -> PathBuf {
        self.repo_root.join(&details.path)
    }

    /// Strip nested metadata, apply the path filter and stage the package.
    fn stage_package(&self, details: &PackageDetails) -> Result<(), ScribeError> {
        let package_path = self.package_path(details);
        for dir in NESTED_METADATA_DIRS {
            remove_dir_if_exists(&package_path.join(dir))?;
        }
        self.filter.remove_ignored_files(&package_path)?;
        self.git("add", &["add", "-f", details.path.as_str()])?;
        Ok(())
    }

    /// Phase one: commit the clean install as the baseline.
    pub fn commit_baseline(&self, details: &PackageDetails) -> Result<(), ScribeError> {
        self.git("init", &["init", "-q"])?;
        self.git("config", &["config", "--local", "user.name", GIT_USER_NAME])?;
        self.git("config", &["config", "--local", "user.email", GIT_USER_EMAIL])?;
        self.git("config", &["config", "--local", "commit.gpgsign", "false"])?;

        self.stage_package(details)?;
        self.git(
            "commit",
            &["commit", "-q", "--allow-empty", "--no-verify", "-m", BASELINE_COMMIT_MESSAGE],
        )?;
        tracing::debug!(package = %details.path_specifier, "committed baseline");
        Ok(())
    }

    /// Phase two: replace the baseline with `modified_package` and diff.
    ///
    /// Returns the raw diff, empty when nothing changed.
    pub fn overlay_and_diff(
        &self,
        details: &PackageDetails,
        modified_package: &Path,
    ) -> Result<Vec<u8>, ScribeError> {
        let package_path = self.package_path(details);
        remove_dir_if_exists(&package_path)?;
        copy_package(modified_package, &package_path)?;

        self.stage_package(details)?;

        let excludes: Vec<String> = EXCLUDED_LOCKFILES
            .iter()
            .map(|lockfile| format!(":(exclude){}/{}", details.path, lockfile))
            .collect();
        let mut args = vec![
            "diff",
            "--cached",
            "--no-color",
            "--ignore-space-at-eol",
            "--no-ext-diff",
            "--src-prefix=a/",
            "--dst-prefix=b/",
            "--",
            details.path.as_str(),
        ];
        args.extend(excludes.iter().map(String::as_str));

        let diff = self.git("diff", &args)?;
        tracing::debug!(package = %details.path_specifier, bytes = diff.len(), "computed diff");
        Ok(diff)
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<(), ScribeError> {
    let removed = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return Ok(()),
    };
    removed.map_err(|source| ScribeError::Remove {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy a package tree, following symlinks and skipping the package's own
/// `node_modules`.
///
/// Deeper `node_modules` directories shipped by the package are copied, the
/// same way staging only strips the top-level one.
pub fn copy_package(from: &Path, to: &Path) -> Result<(), ScribeError> {
    let walker = WalkDir::new(from)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| entry.depth() != 1 || entry.file_name() != "node_modules");

    for entry in walker {
        let entry = entry.map_err(|source| ScribeError::Walk {
            path: from.to_path_buf(),
            source,
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        let copy_err = |source| ScribeError::Copy {
            from: entry.path().to_path_buf(),
            to: target.clone(),
            source,
        };

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(copy_err)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(copy_err)?;
            }
            fs::copy(entry.path(), &target).map_err(copy_err)?;
        }
    }
    Ok(())
}
