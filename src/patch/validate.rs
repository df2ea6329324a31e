//! Diff validation and internal-error diagnostics.

use super::parse::{parse_patch, PatchParseError};
use super::FilePatch;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::backtrace::Backtrace;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DIAGNOSTIC_FILE_NAME: &str = "node-patcher-error.json.gz";

/// git's mode for symbolic links
const SYMLINK_MODE: &str = "120000";

#[derive(Error, Debug)]
pub enum ValidationError {
    /// The diff creates or modifies a symbolic link.
    #[error(
        "the changes include a symbolic link, which patch files cannot represent; \
         use --include or --exclude to leave it out of the patch"
    )]
    SymlinkRejected,

    /// The parser could not handle a diff git produced.
    #[error("failed to parse the generated diff: {source}")]
    ParseFailed {
        source: PatchParseError,
        /// Compressed diagnostic dump, when it could be written
        diagnostic_path: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct DiagnosticError<'a> {
    message: String,
    stack: &'a str,
}

#[derive(Serialize)]
struct Diagnostic<'a> {
    error: DiagnosticError<'a>,
    patch: &'a str,
}

/// Write `{error: {message, stack}, patch}` as gzip-compressed JSON.
pub fn write_diagnostic(
    dir: &Path,
    error: &(dyn std::error::Error + 'static),
    patch: &str,
) -> std::io::Result<PathBuf> {
    let mut stack = String::new();
    let mut cause = error.source();
    while let Some(err) = cause {
        stack.push_str(&format!("caused by: {err}\n"));
        cause = err.source();
    }
    stack.push_str(&Backtrace::force_capture().to_string());

    let payload = Diagnostic {
        error: DiagnosticError {
            message: error.to_string(),
            stack: &stack,
        },
        patch,
    };
    let json = serde_json::to_vec(&payload)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;

    let path = dir.join(DIAGNOSTIC_FILE_NAME);
    fs::write(&path, compressed)?;
    Ok(path)
}

/// Confirms a freshly generated diff can be parsed back.
#[derive(Debug, Clone)]
pub struct DiffValidator {
    diagnostics_dir: PathBuf,
}

impl DiffValidator {
    pub fn new(diagnostics_dir: impl Into<PathBuf>) -> Self {
        Self {
            diagnostics_dir: diagnostics_dir.into(),
        }
    }

    pub fn validate(&self, diff: &str) -> Result<Vec<FilePatch>, ValidationError> {
        match parse_patch(diff) {
            Ok(files) => Ok(files),
            Err(PatchParseError::UnexpectedFileMode(mode)) if mode == SYMLINK_MODE => {
                Err(ValidationError::SymlinkRejected)
            }
            Err(source) => {
                let diagnostic_path = match write_diagnostic(&self.diagnostics_dir, &source, diff) {
                    Ok(path) => Some(path),
                    Err(err) => {
                        tracing::warn!(error = %err, "could not write diagnostic file");
                        None
                    }
                };
                Err(ValidationError::ParseFailed {
                    source,
                    diagnostic_path,
                })
            }
        }
    }
}
