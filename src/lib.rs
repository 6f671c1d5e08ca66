//! DeepRepo: dependency-ordered symbol graphs of a codebase, extracted by
//! driving an external language server.
//!
//! Starting from an entry file, the [`scanner::Scanner`] asks the server for
//! each file's symbols, tokenizes every function body with the [`lexer`],
//! resolves each token through `textDocument/definition`, and records an
//! edge whenever the definition lands on an already-committed function
//! inside the workspace. The resulting graph is exported as a node list that
//! [`preprocess::Preprocessor`] orders leaves-first.

// Data model and graph algorithms - re-exported from deeprepo-core
pub use deeprepo_core::context;
pub use deeprepo_core::graph;
pub use deeprepo_core::preprocess;
pub use deeprepo_core::symbol;
pub use deeprepo_core::text;
pub use deeprepo_core::types;
pub use deeprepo_core::document::Document;
pub use deeprepo_core::error::{GraphError, GraphResult};

// Language server transport
pub mod lsp;

// Extraction and graph building
pub mod document;
pub mod lexer;
pub mod scanner;

pub mod config;
pub mod error;

// Error bridges - converts subsystem errors to DeepRepoError
mod error_bridges;

#[cfg(test)]
mod test_helpers;
