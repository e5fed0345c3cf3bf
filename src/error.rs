//! Error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal errors of flatten and restore.
///
/// Recoverable conditions are not errors: see
/// [`FlattenSummary`](crate::FlattenSummary) and
/// [`RestoreWarning`](crate::RestoreWarning).
#[derive(Debug, Error)]
pub enum Error {
    #[error("'{}' is not a valid {expected}", .path.display())]
    InvalidInput { path: PathBuf, expected: &'static str },

    #[error(
        "The following paths already exist in {}. Please remove them or choose a different output directory:\n{}",
        .root.display(),
        .paths.join("\n")
    )]
    PathConflict { root: PathBuf, paths: Vec<String> },

    #[error("line {line}: path '{path}' escapes the destination directory")]
    UnsafePath { line: usize, path: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read archive: {0}")]
    Input(#[source] io::Error),

    #[error("failed to traverse directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to write archive: {0}")]
    Output(#[source] io::Error),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
