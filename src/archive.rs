//! Archive records and the marker-line frame parser

use std::io::{self, Write};
use std::path::{Component, Path};

use base64::Engine;

// Scrip format constants
pub const BEGIN_FILE_PREFIX: &str = "--- BEGIN FILE: ";
pub const END_FILE_PREFIX: &str = "--- END FILE: ";
pub const EMPTY_DIR_PREFIX: &str = "--- EMPTY DIR: ";
pub const MARKER_SUFFIX: &str = " ---";
pub const BINARY_MARKER: &str = " (BINARY - BASE64 ENCODED)";

/// Placeholder written in place of content when a source file can't be read
pub const READ_ERROR_PREFIX: &str = "Error reading file content: ";

/// Content of a file record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Raw bytes read from the source file
    Bytes(Vec<u8>),
    /// The file could not be read; holds the error message
    Unreadable(String),
}

/// A single logical unit of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A file framed by BEGIN/END markers
    File {
        path: String,
        is_binary: bool,
        content: Content,
    },
    /// A directory that had no children when the archive was made
    EmptyDir { path: String },
}

impl Record {
    /// Relative path of the record
    pub fn path(&self) -> &str {
        match self {
            Record::File { path, .. } | Record::EmptyDir { path } => path,
        }
    }

    /// Serialize the record, markers included.
    ///
    /// Text content is decoded lossily as UTF-8 and always followed by a
    /// newline so the END marker starts its own line. Binary content is a
    /// single unwrapped base64 line.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Record::EmptyDir { path } => writeln!(out, "{}", empty_dir_marker(path)),
            Record::File {
                path,
                is_binary,
                content,
            } => {
                writeln!(out, "{}", begin_marker(path, *is_binary))?;
                match content {
                    Content::Unreadable(message) => {
                        writeln!(out, "{}{}", READ_ERROR_PREFIX, message)?;
                    }
                    Content::Bytes(data) if *is_binary => {
                        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
                        writeln!(out, "{}", encoded)?;
                    }
                    Content::Bytes(data) => {
                        out.write_all(String::from_utf8_lossy(data).as_bytes())?;
                        if !data.ends_with(b"\n") {
                            out.write_all(b"\n")?;
                        }
                    }
                }
                writeln!(out, "{}", end_marker(path, *is_binary))
            }
        }
    }
}

/// Structural classification of one archive line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Begin { path: &'a str, is_binary: bool },
    End { path: &'a str, is_binary: bool },
    EmptyDir { path: &'a str },
    Content,
}

/// Classify a line (without its line terminator).
///
/// Markers are matched purely on prefix and suffix, there is no escaping.
/// A content line that happens to spell out a marker is read as that marker.
pub fn classify(line: &str) -> Line<'_> {
    if let Some((path, is_binary)) = parse_begin(line) {
        return Line::Begin { path, is_binary };
    }
    if let Some(path) = parse_empty_dir(line) {
        return Line::EmptyDir { path };
    }
    if let Some((path, is_binary)) = parse_end(line) {
        return Line::End { path, is_binary };
    }
    Line::Content
}

/// Parse a line like `--- BEGIN FILE: path ---`
pub fn parse_begin(line: &str) -> Option<(&str, bool)> {
    parse_file_marker(line, BEGIN_FILE_PREFIX)
}

/// Parse a line like `--- END FILE: path ---`
pub fn parse_end(line: &str) -> Option<(&str, bool)> {
    parse_file_marker(line, END_FILE_PREFIX)
}

/// Parse a line like `--- EMPTY DIR: path ---`
pub fn parse_empty_dir(line: &str) -> Option<&str> {
    line.strip_prefix(EMPTY_DIR_PREFIX)?.strip_suffix(MARKER_SUFFIX)
}

fn parse_file_marker<'a>(line: &'a str, prefix: &str) -> Option<(&'a str, bool)> {
    let inner = line.strip_prefix(prefix)?.strip_suffix(MARKER_SUFFIX)?;
    match inner.strip_suffix(BINARY_MARKER) {
        Some(path) => Some((path, true)),
        None => Some((inner, false)),
    }
}

pub fn begin_marker(path: &str, is_binary: bool) -> String {
    format!("{}{}{}", BEGIN_FILE_PREFIX, tagged(path, is_binary), MARKER_SUFFIX)
}

pub fn end_marker(path: &str, is_binary: bool) -> String {
    format!("{}{}{}", END_FILE_PREFIX, tagged(path, is_binary), MARKER_SUFFIX)
}

pub fn empty_dir_marker(path: &str) -> String {
    format!("{}{}{}", EMPTY_DIR_PREFIX, path, MARKER_SUFFIX)
}

fn tagged(path: &str, is_binary: bool) -> String {
    if is_binary {
        format!("{}{}", path, BINARY_MARKER)
    } else {
        path.to_string()
    }
}

/// Whether an archive path stays inside the destination root.
///
/// Rejects empty paths, absolute paths and any `..` component.
pub fn is_safe_relative(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    let mut normal = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    normal > 0
}
