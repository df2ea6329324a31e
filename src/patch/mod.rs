//! Git-style unified diff model, parser and validation.
//!
//! The parser understands the subset of `git diff` output that patch
//! artifacts contain: extended headers (modes, renames, binary markers),
//! `---`/`+++` paths and hunks. Lines before the first `diff --git` are
//! treated as comments.

pub mod parse;
pub mod validate;

pub use parse::{parse_patch, PatchParseError};
pub use validate::{write_diagnostic, DiffValidator, ValidationError, DIAGNOSTIC_FILE_NAME};

/// Regular or executable file; git emits no other modes for plain files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Regular,
    Executable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePatchKind {
    Modified,
    Created,
    Deleted,
    Renamed { from: String },
}

/// Changes to a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    /// Path after the change (before it, for deletions)
    pub path: String,
    pub kind: FilePatchKind,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    pub binary: bool,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    pub fn mode_changed(&self) -> bool {
        matches!(self.kind, FilePatchKind::Modified | FilePatchKind::Renamed { .. })
            && self.old_mode.is_some()
            && self.new_mode.is_some()
            && self.old_mode != self.new_mode
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub original_start: usize,
    pub original_len: usize,
    pub patched_start: usize,
    pub patched_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Insertion(String),
    Deletion(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub header: HunkHeader,
    pub lines: Vec<HunkLine>,
    /// `\ No newline at end of file` followed the original side
    pub original_no_newline_at_eof: bool,
    /// `\ No newline at end of file` followed the patched side
    pub patched_no_newline_at_eof: bool,
}
