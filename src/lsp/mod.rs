//! Language server plumbing.
//!
//! - [`framing`]: `Content-Length` codec
//! - [`protocol`]: serde types for the messages we exchange
//! - [`client`]: the process-backed transport
//! - [`profile`]: lexical rules and launch settings per language
//!
//! Consumers depend on the [`LanguageServer`] trait rather than on
//! [`LspClient`] so they can run against an in-memory server in tests.

pub mod client;
pub mod framing;
pub mod profile;
pub mod protocol;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ClientOptions, LspClient, LspError, LspResult};
pub use profile::LanguageProfile;

use deeprepo_core::types::{Location, Position};

use protocol::DocumentSymbolResponse;

/// The two queries graph construction needs from a language server.
///
/// # Contract
///
/// - `Ok(None)` means "no answer": a timeout, a `null` result, or an error
///   response. Callers treat it as a miss.
/// - `Err` is reserved for transport failures that make further queries
///   pointless.
pub trait LanguageServer {
    /// Transport failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// `textDocument/documentSymbol` for one file.
    fn document_symbols(&mut self, uri: &str) -> Result<Option<DocumentSymbolResponse>, Self::Error>;

    /// `textDocument/definition` at one position, first target only.
    fn definition(&mut self, uri: &str, position: Position) -> Result<Option<Location>, Self::Error>;
}
