//! Package manager detection.
//!
//! Decides which installer dialect governs a project from the lockfiles
//! present on disk and an optional explicit override. The decision is made
//! once per run and never changes afterwards.

use crate::config::loader::read_manifest;
use clap::ValueEnum;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const NPM_LOCKFILE: &str = "package-lock.json";
pub const NPM_SHRINKWRAP: &str = "npm-shrinkwrap.json";
pub const YARN_LOCKFILE: &str = "yarn.lock";
pub const PNPM_LOCKFILE: &str = "pnpm-lock.yaml";
pub const PNPM_WORKSPACE_MARKER: &str = "pnpm-workspace.yaml";

/// Installer dialects this tool can reproduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum PackageManager {
    Npm,
    Yarn,
    #[value(name = "npm-shrinkwrap")]
    NpmShrinkwrap,
    Pnpm,
}

/// How a dialect installs the baseline copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallStrategy {
    pub program: &'static str,
    /// Arguments for the first attempt, lifecycle scripts enabled
    pub install_args: &'static [&'static str],
    /// Arguments for the fallback attempt
    pub no_scripts_args: &'static [&'static str],
    /// Installed packages are symlinks into a content store
    pub symlinked_install: bool,
}

const NPM_STRATEGY: InstallStrategy = InstallStrategy {
    program: "npm",
    install_args: &["i", "--force"],
    no_scripts_args: &["i", "--ignore-scripts", "--force"],
    symlinked_install: false,
};

const YARN_STRATEGY: InstallStrategy = InstallStrategy {
    program: "yarn",
    install_args: &["install", "--ignore-engines"],
    no_scripts_args: &["install", "--ignore-engines", "--ignore-scripts"],
    symlinked_install: false,
};

const PNPM_STRATEGY: InstallStrategy = InstallStrategy {
    program: "pnpm",
    install_args: &["i", "--force"],
    no_scripts_args: &["i", "--ignore-scripts", "--force"],
    symlinked_install: true,
};

impl PackageManager {
    pub fn strategy(self) -> &'static InstallStrategy {
        match self {
            PackageManager::Npm | PackageManager::NpmShrinkwrap => &NPM_STRATEGY,
            PackageManager::Yarn => &YARN_STRATEGY,
            PackageManager::Pnpm => &PNPM_STRATEGY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::NpmShrinkwrap => "npm-shrinkwrap",
            PackageManager::Pnpm => "pnpm",
        }
    }

    /// Lockfile this dialect reads resolved versions from.
    pub fn lockfile_name(self) -> &'static str {
        match self {
            PackageManager::Npm => NPM_LOCKFILE,
            PackageManager::NpmShrinkwrap => NPM_SHRINKWRAP,
            PackageManager::Yarn => YARN_LOCKFILE,
            PackageManager::Pnpm => PNPM_LOCKFILE,
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error(
        "the package manager was set to yarn, but no yarn.lock was found in {}",
        .root.display()
    )]
    MissingYarnLockfile { root: PathBuf },

    #[error(
        "no package-lock.json, npm-shrinkwrap.json, yarn.lock or pnpm-lock.yaml found in {}; \
         run your package manager's install command first",
        .root.display()
    )]
    NoLockfile { root: PathBuf },
}

/// Outcome of detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub package_manager: PackageManager,
    /// Set when both npm and yarn lockfiles exist and a default was chosen
    pub notice: Option<String>,
}

/// Detect the package manager governing `project_root`.
pub fn detect_package_manager(
    project_root: &Path,
    override_pm: Option<PackageManager>,
) -> Result<Detection, ResolverError> {
    let package_lock_exists = project_root.join(NPM_LOCKFILE).exists();
    let shrinkwrap_exists = project_root.join(NPM_SHRINKWRAP).exists();
    let yarn_lock_exists = project_root.join(YARN_LOCKFILE).exists();
    let npm_family = if shrinkwrap_exists {
        PackageManager::NpmShrinkwrap
    } else {
        PackageManager::Npm
    };

    if (package_lock_exists || shrinkwrap_exists) && yarn_lock_exists {
        if let Some(pm) = override_pm {
            return Ok(Detection {
                package_manager: pm,
                notice: None,
            });
        }
        return Ok(Detection {
            package_manager: npm_family,
            notice: Some(format!(
                "found both {YARN_LOCKFILE} and an npm lockfile; defaulting to npm. \
                 Pass --package-manager yarn to use yarn instead"
            )),
        });
    }

    if package_lock_exists || shrinkwrap_exists {
        if override_pm == Some(PackageManager::Yarn) {
            return Err(ResolverError::MissingYarnLockfile {
                root: project_root.to_path_buf(),
            });
        }
        return Ok(Detection {
            package_manager: npm_family,
            notice: None,
        });
    }

    if yarn_lock_exists || find_yarn_workspace_root(project_root).is_some() {
        return Ok(Detection {
            package_manager: PackageManager::Yarn,
            notice: None,
        });
    }

    if let Some(root) = find_pnpm_workspace_root(project_root) {
        if root.join(PNPM_LOCKFILE).exists() {
            return Ok(Detection {
                package_manager: PackageManager::Pnpm,
                notice: None,
            });
        }
        tracing::debug!(root = %root.display(), "pnpm workspace has no lockfile at its root");
    }

    Err(ResolverError::NoLockfile {
        root: project_root.to_path_buf(),
    })
}

/// Walk upward from `start` looking for the pnpm workspace marker.
///
/// Stops at the filesystem root.
pub fn find_pnpm_workspace_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PNPM_WORKSPACE_MARKER).is_file())
        .map(Path::to_path_buf)
}

/// Find the yarn workspace root containing `project_root`, if any.
///
/// A workspace root is the nearest ancestor (inclusive) whose `package.json`
/// declares `workspaces`, either as an array of globs or as
/// `{ "packages": [...] }`. The project itself must be the root or match one
/// of the globs.
pub fn find_yarn_workspace_root(project_root: &Path) -> Option<PathBuf> {
    for dir in project_root.ancestors() {
        let manifest_path = dir.join("package.json");
        if !manifest_path.is_file() {
            continue;
        }
        let Ok(manifest) = read_manifest(&manifest_path) else {
            continue;
        };
        let Some(patterns) = workspace_patterns(&manifest) else {
            continue;
        };

        if dir == project_root {
            return Some(dir.to_path_buf());
        }

        let relative = project_root.strip_prefix(dir).ok()?;
        let relative = relative.to_string_lossy().replace('\\', "/");
        let included = patterns.iter().any(|pattern| {
            glob::Pattern::new(pattern.trim_end_matches('/'))
                .map(|p| p.matches(&relative))
                .unwrap_or(false)
        });
        return included.then(|| dir.to_path_buf());
    }
    None
}

fn workspace_patterns(manifest: &serde_json::Value) -> Option<Vec<String>> {
    let workspaces = manifest.get("workspaces")?;
    let list = workspaces
        .as_array()
        .or_else(|| workspaces.get("packages").and_then(|p| p.as_array()))?;
    Some(
        list.iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}
