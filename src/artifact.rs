//! Patch artifact naming, listing and persistence.
//!
//! A patch file is named after the dependency's alias chain and resolved
//! version, e.g. `@babel+core+7.0.0.patch` or `react-native++left-pad+1.3.0.patch`.
//! At most one artifact per dependency path exists in a patches directory.

use crate::package_details::PackageDetails;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const PATCH_EXTENSION: &str = "patch";
/// Separates alias names in a file name
pub const NAME_SEPARATOR: &str = "++";
/// Stands in for `/` inside scoped names and before the version
pub const JOINER: char = '+';
pub const CANONICAL_NAME: &str = env!("CARGO_PKG_NAME");
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to list patches in {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// Version component of a patch file name.
///
/// Source references keep only the commit after `#`; path separators are
/// flattened so the version never introduces a directory.
pub fn version_for_file_name(version: &str) -> String {
    let version = match version.split_once('#') {
        Some((_, commit)) => commit,
        None => version,
    };
    version.replace(['/', '\\'], "_")
}

/// Deterministic file name for `details` at `version`.
pub fn patch_file_name(details: &PackageDetails, version: &str) -> String {
    let names = details
        .names
        .iter()
        .map(|name| name.replace('/', &JOINER.to_string()))
        .collect::<Vec<_>>()
        .join(NAME_SEPARATOR);
    format!(
        "{names}{JOINER}{}.{PATCH_EXTENSION}",
        version_for_file_name(version)
    )
}

/// What a patch file name says about the dependency it patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedPackage {
    pub names: Vec<String>,
    pub path_specifier: String,
    pub version: String,
    /// File name relative to the patches directory
    pub patch_filename: String,
}

fn decode_name(segment: &str) -> Option<String> {
    if segment.is_empty() {
        return None;
    }
    match segment.strip_prefix('@') {
        Some(scoped) => {
            let (scope, name) = scoped.split_once(JOINER)?;
            Some(format!("@{scope}/{name}"))
        }
        None => Some(segment.to_string()),
    }
}

/// Inverse of [`patch_file_name`]. Returns `None` for unrelated files.
pub fn package_details_from_patch_filename(patch_filename: &str) -> Option<PatchedPackage> {
    let base = Path::new(patch_filename).file_name()?.to_str()?;
    let stem = base.strip_suffix(&format!(".{PATCH_EXTENSION}"))?;

    let mut segments: Vec<&str> = stem.split(NAME_SEPARATOR).collect();
    let last = segments.pop()?;

    // the final segment is `<name>+<version>`, where a scoped name has one `+`
    let skip = usize::from(last.starts_with('@'));
    let split = last
        .match_indices(JOINER)
        .nth(skip)
        .map(|(index, _)| index)?;
    let version = &last[split + 1..];
    if version.is_empty() {
        return None;
    }

    let mut names = segments
        .into_iter()
        .map(decode_name)
        .collect::<Option<Vec<_>>>()?;
    names.push(decode_name(&last[..split])?);

    Some(PatchedPackage {
        path_specifier: names.join("/"),
        names,
        version: version.to_string(),
        patch_filename: patch_filename.to_string(),
    })
}

/// All `*.patch` files under `patches_dir`, relative to it, sorted.
///
/// A missing directory has no patches.
pub fn get_patch_files(patches_dir: &Path) -> Result<Vec<String>, ArtifactError> {
    if !patches_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(patches_dir) {
        let entry = entry.map_err(|source| ArtifactError::Walk {
            path: patches_dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some(PATCH_EXTENSION)
        {
            if let Ok(relative) = entry.path().strip_prefix(patches_dir) {
                files.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    files.sort();
    Ok(files)
}

fn quote_argument(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Re-quote an invocation with the program replaced by its public name.
pub fn render_command_line(invocation: &[String]) -> String {
    std::iter::once(CANONICAL_NAME.to_string())
        .chain(invocation.iter().skip(1).map(|arg| quote_argument(arg)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Comment block placed above the diff body.
pub fn render_header(details: &PackageDetails, version: &str, invocation: &[String]) -> String {
    let mut header = format!(
        "# generated by {CANONICAL_NAME} {GENERATOR_VERSION}\n\
         # command: {}\n\
         # {}: {version}\n",
        render_command_line(invocation),
        details.name,
    );
    if details.has_aliases() {
        header.push_str(&format!("# path: {}\n", details.human_readable_path_specifier));
    }
    header.push('\n');
    header
}

/// Atomic file write: tempfile + fsync + rename.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = path.parent().ok_or_else(|| {
        io_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ))
    })?;
    fs::create_dir_all(parent).map_err(io_err)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(content).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Result of writing one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPatch {
    pub path: PathBuf,
    pub file_name: String,
    /// Earlier artifacts for the same dependency path that were deleted
    pub superseded: Vec<String>,
    pub contents: String,
}

pub struct PatchArtifactWriter {
    patches_dir: PathBuf,
    invocation: Vec<String>,
}

impl PatchArtifactWriter {
    pub fn new(patches_dir: impl Into<PathBuf>, invocation: Vec<String>) -> Self {
        Self {
            patches_dir: patches_dir.into(),
            invocation,
        }
    }

    /// Delete existing artifacts for the same dependency path, any version.
    pub fn supersede(&self, details: &PackageDetails) -> Result<Vec<String>, ArtifactError> {
        let mut removed = Vec::new();
        for file in get_patch_files(&self.patches_dir)? {
            let Some(existing) = package_details_from_patch_filename(&file) else {
                continue;
            };
            if existing.path_specifier != details.path_specifier {
                continue;
            }
            let path = self.patches_dir.join(&file);
            fs::remove_file(&path).map_err(|source| ArtifactError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(patch = %file, "removed superseded patch");
            removed.push(file);
        }
        Ok(removed)
    }

    pub fn write(
        &self,
        details: &PackageDetails,
        version: &str,
        diff: &str,
    ) -> Result<WrittenPatch, ArtifactError> {
        let superseded = self.supersede(details)?;

        let file_name = patch_file_name(details, version);
        let path = self.patches_dir.join(&file_name);
        let contents = format!("{}{diff}", render_header(details, version, &self.invocation));
        atomic_write(&path, contents.as_bytes())?;

        Ok(WrittenPatch {
            path,
            file_name,
            superseded,
            contents,
        })
    }
}
