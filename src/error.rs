//! Unified error type and exit codes for the deeprepo binary.
//!
//! Each subsystem keeps its own error enum (`LspError`, `DocumentError`,
//! `ScanError`, `ConfigError`, `GraphError`). Those are bridged into
//! [`DeepRepoError`] (see `error_bridges.rs`) before being rendered as JSON.
//!
//! ## Exit codes
//!
//! - `2`: invalid arguments or configuration
//! - `3`: transport failure (language server process or protocol)
//! - `4`: graph integrity failure (cycle, bad indices, malformed file)
//! - `5`: I/O failure
//! - `10`: internal error

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output and process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Bad input from the caller or an invalid configuration value.
    InvalidArguments = 2,
    /// The language server could not be started or stopped answering.
    TransportError = 3,
    /// The graph is cyclic or structurally inconsistent.
    GraphIntegrity = 4,
    /// Reading or writing a file failed.
    IoError = 5,
    /// Bugs, unexpected state.
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum DeepRepoError {
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("graph integrity error: {message}")]
    GraphIntegrity { message: String },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DeepRepoError {
    pub fn invalid_args(message: impl Into<String>) -> Self {
        DeepRepoError::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DeepRepoError::Internal {
            message: message.into(),
        }
    }
}

impl From<&DeepRepoError> for OutputErrorCode {
    fn from(err: &DeepRepoError) -> Self {
        match err {
            DeepRepoError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            DeepRepoError::Transport { .. } => OutputErrorCode::TransportError,
            DeepRepoError::GraphIntegrity { .. } => OutputErrorCode::GraphIntegrity,
            DeepRepoError::Io { .. } => OutputErrorCode::IoError,
            DeepRepoError::Internal { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<DeepRepoError> for OutputErrorCode {
    fn from(err: DeepRepoError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// JSON Rendering
// ============================================================================

/// Error body printed on stdout by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Always `"error"`.
    pub status: String,
    pub error: ErrorInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    pub code: u8,
    pub message: String,
}

impl ErrorResponse {
    pub fn from_error(err: &DeepRepoError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            error: ErrorInfo {
                code: OutputErrorCode::from(err).code(),
                message: err.to_string(),
            },
        }
    }
}
