//! `impl From<X> for DeepRepoError` conversions from subsystem errors.
//!
//! These live in the root crate because `GraphError` comes from
//! `deeprepo-core`, which knows nothing about the unified error.

use deeprepo_core::error::GraphError;

use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::error::DeepRepoError;
use crate::lsp::LspError;
use crate::scanner::ScanError;

// ============================================================================
// Bridge: LspError -> DeepRepoError
// ============================================================================

impl From<LspError> for DeepRepoError {
    fn from(err: LspError) -> Self {
        DeepRepoError::Transport {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Bridge: DocumentError / ScanError -> DeepRepoError
// ============================================================================

impl From<DocumentError> for DeepRepoError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Server(_) => DeepRepoError::Transport {
                message: err.to_string(),
            },
            DocumentError::NotAFile { .. } => DeepRepoError::InvalidArguments {
                message: err.to_string(),
            },
            DocumentError::CodeBlock { .. } => DeepRepoError::Io {
                message: err.to_string(),
            },
        }
    }
}

impl From<ScanError> for DeepRepoError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Document(doc_err) => doc_err.into(),
            ScanError::Server(_) => DeepRepoError::Transport {
                message: err.to_string(),
            },
            ScanError::OutsideWorkspace { .. } => DeepRepoError::InvalidArguments {
                message: err.to_string(),
            },
        }
    }
}

// ============================================================================
// Bridge: GraphError -> DeepRepoError
// ============================================================================

impl From<GraphError> for DeepRepoError {
    fn from(err: GraphError) -> Self {
        let message = err.to_string();
        match err {
            GraphError::CycleDetected { .. }
            | GraphError::CountMismatch { .. }
            | GraphError::DuplicateIndex { .. }
            | GraphError::IndexOutOfRange { .. }
            | GraphError::DanglingDependency { .. }
            | GraphError::Json(_) => DeepRepoError::GraphIntegrity { message },
            GraphError::Io(_) => DeepRepoError::Io { message },
            GraphError::UnknownNode { .. } | GraphError::Context { .. } => {
                DeepRepoError::Internal { message }
            }
        }
    }
}

// ============================================================================
// Bridge: ConfigError / io::Error -> DeepRepoError
// ============================================================================

impl From<ConfigError> for DeepRepoError {
    fn from(err: ConfigError) -> Self {
        let message = err.to_string();
        match err {
            ConfigError::Io { .. } => DeepRepoError::Io { message },
            ConfigError::Toml { .. } | ConfigError::InvalidValue { .. } => {
                DeepRepoError::InvalidArguments { message }
            }
        }
    }
}

impl From<std::io::Error> for DeepRepoError {
    fn from(err: std::io::Error) -> Self {
        DeepRepoError::Io {
            message: err.to_string(),
        }
    }
}
