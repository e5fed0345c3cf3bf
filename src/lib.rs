//! # scrip
//!
//! Flatten a directory tree into a single human-readable text archive and
//! restore the tree from it.
//!
//! ## Archive Format
//!
//! An archive is a sequence of records, one marker per line. Text files are
//! embedded as is:
//!
//! ```text
//! --- BEGIN FILE: src/main.rs ---
//! fn main() {}
//! --- END FILE: src/main.rs ---
//! ```
//!
//! Binary files are stored as a single base64 line and tagged on both markers:
//!
//! ```text
//! --- BEGIN FILE: logo.png (BINARY - BASE64 ENCODED) ---
//! iVBORw0KGgoAAAANSUhEUgAA...
//! --- END FILE: logo.png (BINARY - BASE64 ENCODED) ---
//! ```
//!
//! Directories without any children get their own marker:
//!
//! ```text
//! --- EMPTY DIR: build/cache ---
//! ```
//!
//! There is no header, footer or escaping. A line inside a text file that
//! spells out a marker exactly will be read back as that marker.
//!
//! ## Binary Detection
//!
//! A file is archived as binary when its first 1024 bytes contain a NUL byte.
//! Any [`BinaryDetector`] can be plugged into the [`Flattener`] instead.
//!
//! ## Trailing Newlines
//!
//! The flattener appends a newline to text content that lacks one so the END
//! marker starts its own line. Restoring strips a single trailing newline
//! unless the content ends in a blank line. Files without a trailing newline,
//! or ending in a blank line, round-trip exactly; a file ending in exactly one
//! newline comes back without it.
//!
//! Only the `\n` is stripped. A CRLF file ending in `\r\n` is restored
//! ending in a stray `\r`, so `x\r\n` comes back as `x\r`.
//!
//! ## Restoring
//!
//! [`Restorer`] reads the archive twice. The first pass checks every path
//! against the destination and fails with [`Error::PathConflict`] before
//! touching the filesystem. The second pass writes files and directories;
//! malformed framing and bad base64 produce [`RestoreWarning`]s instead of
//! errors.

pub mod archive;
pub mod decoder;
pub mod encoder;
pub mod error;

pub use archive::{Content, Line, Record};
pub use decoder::{
    list_entries, restore_directory, Entry, RestoreReport, RestoreWarning, Restorer,
};
pub use encoder::{
    flatten_directory, flatten_to_string, BinaryDetector, FlattenSummary, Flattener, NullByteSniff,
};
pub use error::{Error, Result};
