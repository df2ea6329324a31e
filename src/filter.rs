//! Include/exclude path filtering of a package tree.

use regex::{Regex, RegexBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("invalid {kind} pattern '{pattern}': {source}")]
    Pattern {
        kind: &'static str,
        pattern: String,
        source: regex::Error,
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
}

/// Compiled include/exclude pair.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Regex,
    exclude: Regex,
}

impl PathFilter {
    pub fn new(include: &str, exclude: &str, case_sensitive: bool) -> Result<Self, FilterError> {
        Ok(Self {
            include: compile("include", include, case_sensitive)?,
            exclude: compile("exclude", exclude, case_sensitive)?,
        })
    }

    /// Whether a root-relative, `/`-separated path is kept.
    pub fn keeps(&self, relative: &str) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }

    /// Delete every file under `root` this filter does not keep.
    ///
    /// Returns how many files were removed.
    pub fn remove_ignored_files(&self, root: &Path) -> Result<usize, FilterError> {
        let mut removed = 0;
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|source| FilterError::Walk {
                path: root.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if self.keeps(&relative) {
                continue;
            }
            fs::remove_file(entry.path()).map_err(|source| FilterError::Remove {
                path: entry.path().to_path_buf(),
                source,
            })?;
            removed += 1;
        }
        tracing::trace!(root = %root.display(), removed, "filtered package files");
        Ok(removed)
    }
}

fn compile(kind: &'static str, pattern: &str, case_sensitive: bool) -> Result<Regex, FilterError> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|source| FilterError::Pattern {
            kind,
            pattern: pattern.to_string(),
            source,
        })
}

/// Convenience wrapper compiling the patterns for a single call.
pub fn remove_ignored_files(
    root: &Path,
    include: &str,
    exclude: &str,
    case_sensitive: bool,
) -> Result<usize, FilterError> {
    PathFilter::new(include, exclude, case_sensitive)?.remove_ignored_files(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_EXCLUDE, DEFAULT_INCLUDE};

    fn tree(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }
        dir
    }

    #[test]
    fn test_default_filter_drops_package_json() {
        let dir = tree(&["package.json", "index.js", "lib/util.js"]);
        let removed =
            remove_ignored_files(dir.path(), DEFAULT_INCLUDE, DEFAULT_EXCLUDE, false).unwrap();
        assert_eq!(removed, 1);
        assert!(!dir.path().join("package.json").exists());
        assert!(dir.path().join("lib/util.js").exists());
    }

    #[test]
    fn test_include_limits_tree() {
        let dir = tree(&["lib/a.js", "test/a.spec.js", "README.md"]);
        remove_ignored_files(dir.path(), "^lib/", "$^", false).unwrap();
        assert!(dir.path().join("lib/a.js").exists());
        assert!(!dir.path().join("test/a.spec.js").exists());
        assert!(!dir.path().join("README.md").exists());
    }

    #[test]
    fn test_case_sensitivity() {
        let insensitive = PathFilter::new(".*", "readme", false).unwrap();
        assert!(!insensitive.keeps("README.md"));

        let sensitive = PathFilter::new(".*", "readme", true).unwrap();
        assert!(sensitive.keeps("README.md"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PathFilter::new("(", ".*", false).unwrap_err();
        assert!(matches!(err, FilterError::Pattern { kind: "include", .. }));
    }
}
