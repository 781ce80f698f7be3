// src/error.rs

//! Error types for the kpm library
//!
//! A single error enum is used across the library. Variants carry a
//! formatted message describing the failing operation; callers add context
//! with `map_err` at the call site.

use thiserror::Error;

/// All errors produced by the kpm library
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input before any work started (bad URL scheme, bad flag value)
    #[error("Initialization error: {0}")]
    InitError(String),

    /// Filesystem or stream I/O failure
    #[error("I/O error: {0}")]
    IoError(String),

    /// HTTP fetch or byte download failure
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Malformed JSON, version array, constraint string, or tar structure
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A package, artifact, or file that was expected to exist does not
    #[error("Not found: {0}")]
    NotFound(String),

    /// An archive entry path attempts to escape the extraction root
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// An archive entry type that cannot be represented
    #[error("Unsupported entry: {0}")]
    UnsupportedEntry(String),

    /// The backtracking search exhausted all candidates
    #[error("Resolution error: {0}")]
    ResolutionError(String),

    /// An install/uninstall hook failed
    #[error("Hook error: {0}")]
    HookError(String),

    /// The ambient cancellation signal was tripped
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;
