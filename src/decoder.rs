//! Archive restorer

use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use base64::Engine;

use crate::archive::{classify, is_safe_relative, Line};
use crate::error::{Error, Result};

/// A recoverable problem met while restoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreWarning {
    /// A BEGIN or EMPTY DIR marker arrived while a file was still open
    MissingEnd { line: usize, path: String },
    /// END marker disagrees with the BEGIN that opened the file
    EndMismatch {
        line: usize,
        expected: String,
        expected_binary: bool,
        found: String,
        found_binary: bool,
    },
    /// END marker with no open file
    UnmatchedEnd { line: usize, path: String },
    /// Archive ended before the last file's END marker
    Truncated { path: String },
    /// Binary content was not valid base64, the file was left empty
    InvalidBase64 { path: String, message: String },
}

impl fmt::Display for RestoreWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreWarning::MissingEnd { line, path } => {
                write!(f, "line {}: new marker before END FILE for '{}', closing it", line, path)
            }
            RestoreWarning::EndMismatch {
                line,
                expected,
                expected_binary,
                found,
                found_binary,
            } => write!(
                f,
                "line {}: END FILE marker mismatch, expected path='{}' binary={}, got path='{}' binary={}",
                line, expected, expected_binary, found, found_binary
            ),
            RestoreWarning::UnmatchedEnd { line, path } => {
                write!(f, "line {}: END FILE marker for '{}' but no file is open", line, path)
            }
            RestoreWarning::Truncated { path } => {
                write!(f, "archive ended while '{}' was still open", path)
            }
            RestoreWarning::InvalidBase64 { path, message } => {
                write!(f, "could not decode base64 content of '{}': {}", path, message)
            }
        }
    }
}

/// Outcome of a successful restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub files: usize,
    pub dirs: usize,
    pub warnings: Vec<RestoreWarning>,
}

impl RestoreReport {
    fn warn(&mut self, warning: RestoreWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// An entry named by an archive marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File { path: String, is_binary: bool },
    EmptyDir { path: String },
}

/// The single target file being written during replay
struct OpenFile {
    path: String,
    is_binary: bool,
    target: PathBuf,
    handle: fs::File,
    buffer: Vec<u8>,
}

impl OpenFile {
    fn create(root: &Path, path: &str, is_binary: bool) -> Result<Self> {
        let target = root.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let handle = fs::File::create(&target).map_err(|source| Error::Write {
            path: target.clone(),
            source,
        })?;
        Ok(Self {
            path: path.to_string(),
            is_binary,
            target,
            handle,
            buffer: Vec::new(),
        })
    }

    /// Decode the buffered content, write it and close the file
    fn finish(mut self, report: &mut RestoreReport) -> Result<()> {
        let data = if self.buffer.is_empty() {
            None
        } else if self.is_binary {
            match decode_binary(&self.buffer) {
                Ok(data) => Some(data),
                Err(message) => {
                    report.warn(RestoreWarning::InvalidBase64 {
                        path: self.path.clone(),
                        message,
                    });
                    None
                }
            }
        } else {
            Some(decode_text(&self.buffer).to_vec())
        };

        if let Some(data) = data {
            self.handle.write_all(&data).map_err(|source| Error::Write {
                path: self.target.clone(),
                source,
            })?;
        }
        self.handle.flush().map_err(|source| Error::Write {
            path: self.target,
            source,
        })?;
        report.files += 1;
        Ok(())
    }
}

/// Undo the newline the flattener appends to text without a trailing one.
///
/// Content ending in a blank line is kept as is. Otherwise a single trailing
/// `\n` is removed, so files that originally ended with exactly one newline
/// lose it.
pub fn decode_text(buffer: &[u8]) -> &[u8] {
    match buffer {
        [.., b'\n', b'\n'] => buffer,
        [rest @ .., b'\n'] => rest,
        _ => buffer,
    }
}

/// Decode the first buffered line as standard base64
pub fn decode_binary(buffer: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let line = buffer.split(|&b| b == b'\n').next().unwrap_or_default();
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    base64::engine::general_purpose::STANDARD
        .decode(line)
        .map_err(|e| e.to_string())
}

/// Restores a directory tree from a scrip archive
#[derive(Debug, Clone, Default)]
pub struct Restorer {
    allow_unsafe_paths: bool,
}

impl Restorer {
    /// Create a restorer that rejects paths escaping the destination
    pub fn new() -> Self {
        Self {
            allow_unsafe_paths: false,
        }
    }

    /// Accept absolute paths and `..` components in archive markers
    pub fn allow_unsafe_paths(mut self, allow: bool) -> Self {
        self.allow_unsafe_paths = allow;
        self
    }

    /// Restore the archive file at `archive` into `destination`
    pub fn restore(&self, archive: &Path, destination: &Path) -> Result<RestoreReport> {
        if !archive.is_file() {
            return Err(Error::InvalidInput {
                path: archive.to_path_buf(),
                expected: "file",
            });
        }
        let file = fs::File::open(archive).map_err(|source| Error::Read {
            path: archive.to_path_buf(),
            source,
        })?;

        let report = self.restore_from(BufReader::new(file), destination)?;

        tracing::info!(
            archive = %archive.display(),
            destination = %destination.display(),
            files = report.files,
            dirs = report.dirs,
            warnings = report.warnings.len(),
            "restored archive"
        );
        Ok(report)
    }

    /// Restore from any seekable reader.
    ///
    /// All conflicts are checked before anything is written. Once writing
    /// starts there is no rollback: a failure leaves earlier output on disk.
    pub fn restore_from<R: BufRead + Seek>(
        &self,
        mut reader: R,
        destination: &Path,
    ) -> Result<RestoreReport> {
        self.check_conflicts(&mut reader, destination)?;

        reader.seek(SeekFrom::Start(0)).map_err(Error::Input)?;
        fs::create_dir_all(destination).map_err(|source| Error::Write {
            path: destination.to_path_buf(),
            source,
        })?;
        replay(reader, destination)
    }

    /// Pass 1: collect every archive path that already exists under `destination`
    fn check_conflicts<R: BufRead>(&self, reader: &mut R, destination: &Path) -> Result<()> {
        let mut conflicts = Vec::new();

        for_each_line(reader, |line_num, raw| {
            let path = match classify(&marker_text(raw)) {
                Line::Begin { path, .. } | Line::EmptyDir { path } => path.to_string(),
                Line::End { .. } | Line::Content => return Ok(()),
            };
            if !self.allow_unsafe_paths && !is_safe_relative(&path) {
                return Err(Error::UnsafePath { line: line_num, path });
            }
            if fs::symlink_metadata(destination.join(&path)).is_ok() {
                conflicts.push(path);
            }
            Ok(())
        })?;

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(Error::PathConflict {
                root: destination.to_path_buf(),
                paths: conflicts,
            })
        }
    }
}

/// Pass 2: materialize every record under `root`
fn replay<R: BufRead>(mut reader: R, root: &Path) -> Result<RestoreReport> {
    let mut report = RestoreReport::default();
    let mut current: Option<OpenFile> = None;

    for_each_line(&mut reader, |line_num, raw| {
        match classify(&marker_text(raw)) {
            Line::Begin { path, is_binary } => {
                if let Some(open) = current.take() {
                    report.warn(RestoreWarning::MissingEnd {
                        line: line_num,
                        path: open.path.clone(),
                    });
                    open.finish(&mut report)?;
                }
                tracing::debug!(path, is_binary, "restoring file");
                current = Some(OpenFile::create(root, path, is_binary)?);
            }
            Line::EmptyDir { path } => {
                if let Some(open) = current.take() {
                    report.warn(RestoreWarning::MissingEnd {
                        line: line_num,
                        path: open.path.clone(),
                    });
                    open.finish(&mut report)?;
                }
                tracing::debug!(path, "restoring empty directory");
                let target = root.join(path);
                fs::create_dir_all(&target).map_err(|source| Error::Write {
                    path: target,
                    source,
                })?;
                report.dirs += 1;
            }
            Line::End { path, is_binary } => match current.take() {
                Some(open) => {
                    if open.path != path || open.is_binary != is_binary {
                        report.warn(RestoreWarning::EndMismatch {
                            line: line_num,
                            expected: open.path.clone(),
                            expected_binary: open.is_binary,
                            found: path.to_string(),
                            found_binary: is_binary,
                        });
                    }
                    open.finish(&mut report)?;
                }
                None => report.warn(RestoreWarning::UnmatchedEnd {
                    line: line_num,
                    path: path.to_string(),
                }),
            },
            Line::Content => {
                if let Some(open) = current.as_mut() {
                    open.buffer.extend_from_slice(raw);
                }
            }
        }
        Ok(())
    })?;

    if let Some(open) = current.take() {
        report.warn(RestoreWarning::Truncated {
            path: open.path.clone(),
        });
        open.finish(&mut report)?;
    }

    Ok(report)
}

/// List the entries named by an archive's BEGIN and EMPTY DIR markers
pub fn list_entries<R: BufRead>(mut reader: R) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for_each_line(&mut reader, |_, raw| {
        match classify(&marker_text(raw)) {
            Line::Begin { path, is_binary } => entries.push(Entry::File {
                path: path.to_string(),
                is_binary,
            }),
            Line::EmptyDir { path } => entries.push(Entry::EmptyDir {
                path: path.to_string(),
            }),
            Line::End { .. } | Line::Content => {}
        }
        Ok(())
    })?;
    Ok(entries)
}

/// Restore the archive at `archive` into `destination` with default settings
pub fn restore_directory(
    archive: impl AsRef<Path>,
    destination: impl AsRef<Path>,
) -> Result<RestoreReport> {
    Restorer::new().restore(archive.as_ref(), destination.as_ref())
}

/// Feed each raw line (terminator included) to `f` with its 1-based number
fn for_each_line<R, F>(reader: &mut R, mut f: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(usize, &[u8]) -> Result<()>,
{
    let mut buf = Vec::new();
    let mut line_num = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).map_err(Error::Input)? == 0 {
            return Ok(());
        }
        line_num += 1;
        f(line_num, &buf)?;
    }
}

/// The line with its `\n` or `\r\n` terminator removed, for marker matching
fn marker_text(raw: &[u8]) -> std::borrow::Cow<'_, str> {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line)
}
