//! Error types for Trawl core operations.
//!
//! This module defines well-structured error types using `thiserror` for
//! library-level errors, while higher-level code can use `anyhow` for
//! convenient error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using TrawlError
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Core error types for Trawl operations.
///
/// Only [`TrawlError::Source`] is fatal to a running query. Archive,
/// metadata and I/O errors raised while inspecting a single entry are soft
/// failures: the entry is dropped and the query continues.
#[derive(Error, Debug)]
pub enum TrawlError {
    // === Configuration Errors ===
    /// Invalid search pattern (e.g., bad regex or unclosed glob class)
    #[error("invalid search pattern: {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// An operation was requested in a state that does not allow it
    #[error("cannot {operation} while query is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    // === Source Errors ===
    /// The entry source failed; the query terminates with this error's code
    #[error(transparent)]
    Source(#[from] SourceError),

    // === Per-entry Errors ===
    /// A document archive could not be opened or lacks its payload
    #[error("archive error in {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    /// Metadata could not be extracted from a file
    #[error("metadata error in {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrawlError {
    /// Returns true if this error should only drop the current entry
    pub fn is_soft_failure(&self) -> bool {
        matches!(
            self,
            TrawlError::Archive { .. } | TrawlError::Metadata { .. } | TrawlError::Io(_)
        )
    }

    /// Returns true if this error was caused by the query configuration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            TrawlError::InvalidPattern { .. } | TrawlError::ConfigError { .. }
        )
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        TrawlError::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an archive error
    pub fn archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TrawlError::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a metadata error
    pub fn metadata(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TrawlError::Metadata {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure reported by an entry source.
///
/// The numeric code of the underlying provider (an OS error number for
/// listings and process spawns) is passed through unmodified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Listing the search root failed
    #[error("cannot list {path}: {message}")]
    Io {
        path: PathBuf,
        code: i32,
        message: String,
    },

    /// The external index program could not be started
    #[error("cannot run {program}: {message}")]
    Spawn {
        program: String,
        code: i32,
        message: String,
    },

    /// The source was cancelled before it finished
    #[error("listing cancelled")]
    Cancelled,
}

impl SourceError {
    /// Build a listing error from an I/O error
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            code: err.raw_os_error().unwrap_or(UNKNOWN_IO_CODE),
            message: err.to_string(),
        }
    }

    /// Build a spawn error from an I/O error
    pub fn spawn(program: impl Into<String>, err: &std::io::Error) -> Self {
        SourceError::Spawn {
            program: program.into(),
            code: err.raw_os_error().unwrap_or(UNKNOWN_IO_CODE),
            message: err.to_string(),
        }
    }

    /// The provider code carried by this error
    pub fn code(&self) -> i32 {
        match self {
            SourceError::Io { code, .. } | SourceError::Spawn { code, .. } => *code,
            SourceError::Cancelled => crate::controller::RESULT_CANCELLED,
        }
    }
}

/// Code used when an I/O error has no OS error number (EIO)
const UNKNOWN_IO_CODE: i32 = 5;
