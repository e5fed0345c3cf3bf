//! Directory flattener

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use walkdir::WalkDir;

use crate::archive::{Content, Record};
use crate::error::{Error, Result};

/// Number of leading bytes inspected by [`NullByteSniff`]
pub const DEFAULT_SNIFF_LEN: usize = 1024;

/// Decides whether a file is archived as base64 or as text
pub trait BinaryDetector {
    fn is_binary(&self, path: &Path) -> bool;
}

impl<F> BinaryDetector for F
where
    F: Fn(&Path) -> bool,
{
    fn is_binary(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Treats a file as binary if its first bytes contain a NUL.
///
/// Files that can't be opened are reported as text.
#[derive(Debug, Clone, Copy)]
pub struct NullByteSniff {
    len: usize,
}

impl NullByteSniff {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Default for NullByteSniff {
    fn default() -> Self {
        Self::new(DEFAULT_SNIFF_LEN)
    }
}

impl BinaryDetector for NullByteSniff {
    fn is_binary(&self, path: &Path) -> bool {
        let Ok(file) = fs::File::open(path) else {
            return false;
        };
        let mut chunk = Vec::with_capacity(self.len);
        match file.take(self.len as u64).read_to_end(&mut chunk) {
            Ok(_) => chunk.contains(&0),
            Err(_) => false,
        }
    }
}

/// Counts of what went into an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenSummary {
    /// File records written, binary ones included
    pub files: usize,
    pub binary_files: usize,
    pub empty_dirs: usize,
    /// Files archived with an error placeholder instead of their content
    pub unreadable: Vec<String>,
}

/// Flattens a directory tree into the scrip archive format
pub struct Flattener {
    detector: Box<dyn BinaryDetector>,
}

impl Flattener {
    /// Create a flattener using the NUL-byte sniff
    pub fn new() -> Self {
        Self {
            detector: Box::new(NullByteSniff::default()),
        }
    }

    /// Replace the binary detection predicate
    pub fn with_detector(mut self, detector: impl BinaryDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    /// Write the archive of `source` to `out`.
    ///
    /// Entries are visited depth-first with siblings sorted by name, so the
    /// same tree always yields the same archive.
    pub fn flatten<W: Write>(&self, source: &Path, out: W) -> Result<FlattenSummary> {
        self.write_archive(source, out, None)
    }

    /// Flatten `source` into a new file at `output`, truncating any existing one.
    ///
    /// When `output` lies inside `source` it is left out of the archive.
    pub fn flatten_to_file(&self, source: &Path, output: &Path) -> Result<FlattenSummary> {
        if !source.is_dir() {
            return Err(Error::InvalidInput {
                path: source.to_path_buf(),
                expected: "directory",
            });
        }

        let file = fs::File::create(output).map_err(|source| Error::Write {
            path: output.to_path_buf(),
            source,
        })?;
        let skip = relative_output(source, output);
        let summary = self.write_archive(source, BufWriter::new(file), skip.as_deref())?;

        tracing::info!(
            source = %source.display(),
            output = %output.display(),
            files = summary.files,
            empty_dirs = summary.empty_dirs,
            "flattened directory"
        );
        Ok(summary)
    }

    fn write_archive<W: Write>(
        &self,
        source: &Path,
        mut out: W,
        skip: Option<&str>,
    ) -> Result<FlattenSummary> {
        if !source.is_dir() {
            return Err(Error::InvalidInput {
                path: source.to_path_buf(),
                expected: "directory",
            });
        }

        let mut summary = FlattenSummary::default();
        let walker = WalkDir::new(source).min_depth(1).sort_by_file_name();

        for entry in walker {
            let entry = entry?;
            if skip.is_some_and(|skip| relative_name(source, entry.path()) == skip) {
                tracing::debug!(path = %entry.path().display(), "skipping archive output");
                continue;
            }
            let Some(record) = self.record_for(source, entry.path(), entry.file_type())? else {
                continue;
            };

            match &record {
                Record::EmptyDir { .. } => summary.empty_dirs += 1,
                Record::File {
                    path,
                    is_binary,
                    content,
                } => {
                    summary.files += 1;
                    if *is_binary {
                        summary.binary_files += 1;
                    }
                    if let Content::Unreadable(_) = content {
                        summary.unreadable.push(path.clone());
                    }
                }
            }

            tracing::debug!(path = record.path(), "writing record");
            record.write_to(&mut out).map_err(Error::Output)?;
        }

        out.flush().map_err(Error::Output)?;
        Ok(summary)
    }

    /// Build the record for one walked entry, or `None` for entries that
    /// aren't archived (non-empty directories, dangling links, special files).
    ///
    /// Symlinks are followed: a link to a file is archived with the file's
    /// content and a link to an empty directory as an empty directory.
    fn record_for(
        &self,
        root: &Path,
        path: &Path,
        file_type: fs::FileType,
    ) -> Result<Option<Record>> {
        let relative = relative_name(root, path);
        let is_link = file_type.is_symlink();
        let file_type = if is_link {
            match fs::metadata(path) {
                Ok(meta) => meta.file_type(),
                Err(err) => {
                    tracing::debug!(path = %relative, error = %err, "skipping dangling symlink");
                    return Ok(None);
                }
            }
        } else {
            file_type
        };

        if file_type.is_dir() {
            let mut children = fs::read_dir(path).map_err(|source| Error::Read {
                path: path.to_path_buf(),
                source,
            })?;
            if children.next().is_some() {
                if is_link {
                    tracing::warn!(
                        path = %relative,
                        "contents of symlinked directory not archived"
                    );
                }
                return Ok(None);
            }
            return Ok(Some(Record::EmptyDir { path: relative }));
        }

        if !file_type.is_file() {
            tracing::debug!(path = %relative, "skipping non-regular entry");
            return Ok(None);
        }

        let is_binary = self.detector.is_binary(path);
        let content = match fs::read(path) {
            Ok(data) => Content::Bytes(data),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "could not read file, writing placeholder"
                );
                Content::Unreadable(err.to_string())
            }
        };

        Ok(Some(Record::File {
            path: relative,
            is_binary,
            content,
        }))
    }
}

impl Default for Flattener {
    fn default() -> Self {
        Self::new()
    }
}

/// `/`-separated path of `path` relative to `root`
fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Relative name of `output` inside `source`, if it lies there
fn relative_output(source: &Path, output: &Path) -> Option<String> {
    let root = fs::canonicalize(source).ok()?;
    let output = fs::canonicalize(output).ok()?;
    let relative = output.strip_prefix(&root).ok()?;
    Some(relative_name(Path::new(""), relative))
}

/// Flatten `source` into the file at `output` with default settings
pub fn flatten_directory(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<FlattenSummary> {
    Flattener::new().flatten_to_file(source.as_ref(), output.as_ref())
}

/// Convenience for tests and in-memory use
pub fn flatten_to_string(source: &Path) -> Result<String> {
    let mut out = Vec::new();
    Flattener::new().flatten(source, &mut out)?;
    String::from_utf8(out)
        .map_err(|err| Error::Output(io::Error::new(io::ErrorKind::InvalidData, err)))
}
