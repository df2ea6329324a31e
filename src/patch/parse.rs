use super::{FileMode, FilePatch, FilePatchKind, Hunk, HunkHeader, HunkLine};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchParseError {
    #[error("Unexpected file mode string: {0}")]
    UnexpectedFileMode(String),

    #[error("malformed diff header on line {line_number}: {line}")]
    BadDiffHeader { line_number: usize, line: String },

    #[error("malformed hunk header on line {line_number}: {line}")]
    BadHunkHeader { line_number: usize, line: String },

    #[error(
        "hunk at line {line_number} in {path} does not match its header \
         (expected {expected_original} original and {expected_patched} patched lines)"
    )]
    HunkLengthMismatch {
        path: String,
        line_number: usize,
        expected_original: usize,
        expected_patched: usize,
    },

    #[error("unexpected line {line_number}: {line}")]
    UnexpectedLine { line_number: usize, line: String },
}

fn hunk_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")
            .expect("hunk header regex is valid")
    })
}

fn parse_mode(mode: &str) -> Result<FileMode, PatchParseError> {
    match mode.trim() {
        "100644" | "644" => Ok(FileMode::Regular),
        "100755" | "755" => Ok(FileMode::Executable),
        other => Err(PatchParseError::UnexpectedFileMode(other.to_string())),
    }
}

fn parse_hunk_header(line: &str, line_number: usize) -> Result<HunkHeader, PatchParseError> {
    let bad = || PatchParseError::BadHunkHeader {
        line_number,
        line: line.to_string(),
    };
    let caps = hunk_header_regex().captures(line).ok_or_else(bad)?;
    let number = |i: usize, default: usize| -> Result<usize, PatchParseError> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().map_err(|_| bad()),
            None => Ok(default),
        }
    };
    Ok(HunkHeader {
        original_start: number(1, 0)?,
        original_len: number(2, 1)?,
        patched_start: number(3, 0)?,
        patched_len: number(4, 1)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastSide {
    None,
    Context,
    Original,
    Patched,
}

struct PendingHunk {
    hunk: Hunk,
    line_number: usize,
    remaining_original: usize,
    remaining_patched: usize,
    last: LastSide,
}

impl PendingHunk {
    fn new(header: HunkHeader, line_number: usize) -> Self {
        Self {
            hunk: Hunk {
                header,
                lines: Vec::new(),
                original_no_newline_at_eof: false,
                patched_no_newline_at_eof: false,
            },
            line_number,
            remaining_original: header.original_len,
            remaining_patched: header.patched_len,
            last: LastSide::None,
        }
    }

    fn is_open(&self) -> bool {
        self.remaining_original > 0 || self.remaining_patched > 0
    }

    fn mismatch(&self, path: &str) -> PatchParseError {
        PatchParseError::HunkLengthMismatch {
            path: path.to_string(),
            line_number: self.line_number,
            expected_original: self.hunk.header.original_len,
            expected_patched: self.hunk.header.patched_len,
        }
    }

    fn mark_no_newline(&mut self) {
        match self.last {
            LastSide::Original => self.hunk.original_no_newline_at_eof = true,
            LastSide::Patched => self.hunk.patched_no_newline_at_eof = true,
            LastSide::Context | LastSide::None => {
                self.hunk.original_no_newline_at_eof = true;
                self.hunk.patched_no_newline_at_eof = true;
            }
        }
    }

    fn push(&mut self, line: &str, path: &str) -> Result<(), PatchParseError> {
        let body = line.get(1..).unwrap_or("").to_string();
        match line.as_bytes().first() {
            Some(b' ') | None => {
                if self.remaining_original == 0 || self.remaining_patched == 0 {
                    return Err(self.mismatch(path));
                }
                self.remaining_original -= 1;
                self.remaining_patched -= 1;
                self.hunk.lines.push(HunkLine::Context(body));
                self.last = LastSide::Context;
            }
            Some(b'-') => {
                if self.remaining_original == 0 {
                    return Err(self.mismatch(path));
                }
                self.remaining_original -= 1;
                self.hunk.lines.push(HunkLine::Deletion(body));
                self.last = LastSide::Original;
            }
            Some(b'+') => {
                if self.remaining_patched == 0 {
                    return Err(self.mismatch(path));
                }
                self.remaining_patched -= 1;
                self.hunk.lines.push(HunkLine::Insertion(body));
                self.last = LastSide::Patched;
            }
            Some(b'\\') => self.mark_no_newline(),
            Some(_) => return Err(self.mismatch(path)),
        }
        Ok(())
    }
}

/// Undo git's C-style quoting at the start of `input`.
///
/// Returns the decoded path and the text after the closing quote.
fn unquote_c_style(input: &str) -> Option<(String, &str)> {
    let quoted = input.strip_prefix('"')?;
    let mut bytes = Vec::new();
    let mut chars = quoted.char_indices();
    while let Some((index, c)) = chars.next() {
        match c {
            '"' => return Some((String::from_utf8(bytes).ok()?, &quoted[index + 1..])),
            '\\' => {
                let (_, escaped) = chars.next()?;
                let byte = match escaped {
                    'a' => 0x07,
                    'b' => 0x08,
                    't' => b'\t',
                    'n' => b'\n',
                    'v' => 0x0b,
                    'f' => 0x0c,
                    'r' => b'\r',
                    '"' => b'"',
                    '\\' => b'\\',
                    '0'..='7' => {
                        let mut octal = String::from(escaped);
                        for _ in 0..2 {
                            octal.push(chars.next()?.1);
                        }
                        u8::from_str_radix(&octal, 8).ok()?
                    }
                    _ => return None,
                };
                bytes.push(byte);
            }
            c => bytes.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
        }
    }
    None
}

/// A path field from an extended header line, quoted or not.
fn header_path(raw: &str) -> Option<String> {
    if raw.starts_with('"') {
        match unquote_c_style(raw)? {
            (path, "") => Some(path),
            _ => None,
        }
    } else {
        Some(raw.to_string())
    }
}

#[derive(Default)]
struct FileBuilder {
    from_path: String,
    to_path: String,
    created: bool,
    deleted: bool,
    rename_from: Option<String>,
    old_mode: Option<FileMode>,
    new_mode: Option<FileMode>,
    binary: bool,
    hunks: Vec<Hunk>,
}

impl FileBuilder {
    fn from_diff_line(line: &str, line_number: usize) -> Result<Self, PatchParseError> {
        let bad = || PatchParseError::BadDiffHeader {
            line_number,
            line: line.to_string(),
        };
        let rest = line.strip_prefix("diff --git ").ok_or_else(bad)?;
        let (from, rest) = if rest.starts_with('"') {
            let (from, rest) = unquote_c_style(rest).ok_or_else(bad)?;
            (from, rest.strip_prefix(' ').ok_or_else(bad)?)
        } else {
            let split = rest
                .find(" b/")
                .or_else(|| rest.find(" \"b/"))
                .ok_or_else(bad)?;
            (rest[..split].to_string(), &rest[split + 1..])
        };
        let to = header_path(rest).ok_or_else(bad)?;

        let from_path = from.strip_prefix("a/").ok_or_else(bad)?.to_string();
        let to_path = to.strip_prefix("b/").ok_or_else(bad)?.to_string();
        Ok(Self {
            from_path,
            to_path,
            ..Self::default()
        })
    }

    fn header_line(&mut self, line: &str, line_number: usize) -> Result<(), PatchParseError> {
        let unexpected = || PatchParseError::UnexpectedLine {
            line_number,
            line: line.to_string(),
        };
        if let Some(mode) = line.strip_prefix("new file mode ") {
            self.created = true;
            self.new_mode = Some(parse_mode(mode)?);
        } else if let Some(mode) = line.strip_prefix("deleted file mode ") {
            self.deleted = true;
            self.old_mode = Some(parse_mode(mode)?);
        } else if let Some(mode) = line.strip_prefix("old mode ") {
            self.old_mode = Some(parse_mode(mode)?);
        } else if let Some(mode) = line.strip_prefix("new mode ") {
            self.new_mode = Some(parse_mode(mode)?);
        } else if let Some(rest) = line.strip_prefix("index ") {
            // `index <from>..<to> [mode]`, mode present when unchanged
            if let Some(mode) = rest.split_whitespace().nth(1) {
                let mode = parse_mode(mode)?;
                self.old_mode.get_or_insert(mode);
                self.new_mode.get_or_insert(mode);
            }
        } else if let Some(from) = line.strip_prefix("rename from ") {
            self.rename_from = Some(header_path(from).ok_or_else(unexpected)?);
        } else if let Some(to) = line.strip_prefix("rename to ") {
            self.to_path = header_path(to).ok_or_else(unexpected)?;
        } else if line.starts_with("Binary files ") || line == "GIT binary patch" {
            self.binary = true;
        } else if line.starts_with("similarity index ")
            || line.starts_with("dissimilarity index ")
            || line.starts_with("--- ")
            || line.starts_with("+++ ")
            || line.is_empty()
        {
            // paths already known from the `diff --git` line
        } else {
            return Err(unexpected());
        }
        Ok(())
    }

    fn path(&self) -> &str {
        if self.deleted {
            &self.from_path
        } else {
            &self.to_path
        }
    }

    fn finish(self) -> FilePatch {
        let kind = if self.deleted {
            FilePatchKind::Deleted
        } else if self.created {
            FilePatchKind::Created
        } else if let Some(from) = self.rename_from.clone() {
            FilePatchKind::Renamed { from }
        } else {
            FilePatchKind::Modified
        };
        FilePatch {
            path: self.path().to_string(),
            kind,
            old_mode: self.old_mode,
            new_mode: self.new_mode,
            binary: self.binary,
            hunks: self.hunks,
        }
    }
}

/// Parse git diff output into per-file patches.
pub fn parse_patch(text: &str) -> Result<Vec<FilePatch>, PatchParseError> {
    let lines: Vec<&str> = text.split('\n').collect();
    let last_index = lines.len().saturating_sub(1);

    let mut files = Vec::new();
    let mut current: Option<FileBuilder> = None;
    let mut hunk: Option<PendingHunk> = None;

    for (index, raw) in lines.iter().enumerate() {
        let line_number = index + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let trailing_empty = index == last_index && line.is_empty();

        if let Some(pending) = hunk.as_mut() {
            let path = current.as_ref().map(FileBuilder::path).unwrap_or_default();
            if pending.is_open() && !trailing_empty {
                pending.push(line, path)?;
                continue;
            }
            if line.starts_with('\\') {
                pending.mark_no_newline();
                continue;
            }
            if pending.is_open() {
                return Err(pending.mismatch(path));
            }
            if let (Some(done), Some(file)) = (hunk.take(), current.as_mut()) {
                file.hunks.push(done.hunk);
            }
        }

        if line.starts_with("diff --git ") {
            if let Some(file) = current.take() {
                files.push(file.finish());
            }
            current = Some(FileBuilder::from_diff_line(line, line_number)?);
            continue;
        }

        let Some(file) = current.as_mut() else {
            // preamble before the first file, e.g. header comments
            continue;
        };

        if line.starts_with("@@ ") {
            hunk = Some(PendingHunk::new(parse_hunk_header(line, line_number)?, line_number));
        } else {
            file.header_line(line, line_number)?;
        }
    }

    if let Some(pending) = hunk.take() {
        let path = current.as_ref().map(FileBuilder::path).unwrap_or_default();
        if pending.is_open() {
            return Err(pending.mismatch(path));
        }
        if let Some(file) = current.as_mut() {
            file.hunks.push(pending.hunk);
        }
    }
    if let Some(file) = current.take() {
        files.push(file.finish());
    }

    Ok(files)
}
