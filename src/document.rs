//! Document extraction: the symbols one file declares, classified into the
//! graph's closed set of kinds.
//!
//! A function's declaration key uses the position of its name. Hierarchical
//! results give that directly as `selectionRange.start`. For flat results the
//! name is searched on the first line of the function's range, falling back
//! to `range.start`.
//!
//! Function bodies are read from disk, not fetched from the server.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use deeprepo_core::document::Document;
use deeprepo_core::symbol::{Class, CodeBlock, Function, Symbol, Variable};
use deeprepo_core::text::{find_utf16, normalize_uri, read_line_range, uri_to_path};
use deeprepo_core::types::{Location, Position, Range};

use crate::lsp::protocol::{DocumentSymbol, DocumentSymbolResponse, SymbolClass, SymbolInformation};
use crate::lsp::LanguageServer;

/// Errors raised while extracting a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The transport failed.
    #[error("language server failure: {0}")]
    Server(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The URI does not name a local file.
    #[error("not a file URI: {uri}")]
    NotAFile { uri: String },

    /// A function body could not be read.
    #[error("failed to read {path}: {source}")]
    CodeBlock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for extraction.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Extraction settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Also record symbols nested inside other symbols (methods, inner
    /// functions). Top-level only when false.
    pub include_nested: bool,
}

/// Build the [`Document`] for `uri`.
///
/// An empty or missing symbol list yields an empty document.
pub fn extract<S: LanguageServer>(
    server: &mut S,
    uri: &str,
    options: ExtractOptions,
) -> DocumentResult<Document> {
    let mut doc = Document::new(uri);
    let response = server
        .document_symbols(uri)
        .map_err(|e| DocumentError::Server(Box::new(e)))?;
    let Some(response) = response else {
        debug!(uri, "no symbols");
        return Ok(doc);
    };

    let path = uri_to_path(uri).ok_or_else(|| DocumentError::NotAFile {
        uri: uri.to_string(),
    })?;
    let mut builder = Builder {
        uri,
        canonical: normalize_uri(uri),
        path,
        doc: &mut doc,
    };

    match &response {
        DocumentSymbolResponse::Nested(symbols) => {
            for symbol in symbols {
                builder.nested(symbol, options.include_nested)?;
            }
        }
        DocumentSymbolResponse::Flat(symbols) => {
            for symbol in symbols {
                if symbol.container_name.is_some() && !options.include_nested {
                    continue;
                }
                builder.flat(symbol)?;
            }
        }
    }

    debug!(uri, symbols = doc.len(), "document extracted");
    Ok(doc)
}

struct Builder<'a> {
    uri: &'a str,
    /// `uri` in canonical form, for comparing against server-reported URIs.
    canonical: String,
    path: PathBuf,
    doc: &'a mut Document,
}

impl Builder<'_> {
    fn nested(&mut self, symbol: &DocumentSymbol, recurse: bool) -> DocumentResult<()> {
        self.record(
            symbol.kind.classify(),
            &symbol.name,
            symbol.range,
            Some(symbol.selection_range.start),
        )?;
        if recurse {
            for child in &symbol.children {
                self.nested(child, recurse)?;
            }
        }
        Ok(())
    }

    fn flat(&mut self, symbol: &SymbolInformation) -> DocumentResult<()> {
        if normalize_uri(&symbol.location.uri) != self.canonical {
            return Ok(());
        }
        self.record(symbol.kind.classify(), &symbol.name, symbol.location.range, None)
    }

    fn record(
        &mut self,
        class: Option<SymbolClass>,
        name: &str,
        range: Range,
        name_pos: Option<Position>,
    ) -> DocumentResult<()> {
        let Some(class) = class else {
            return Ok(());
        };
        let at = |pos: Position| Location::new(self.uri, pos);

        let symbol = match class {
            SymbolClass::Variable => Symbol::Variable(Variable {
                name: name.to_string(),
                location: at(name_pos.unwrap_or(range.start)),
            }),
            SymbolClass::Class => Symbol::Class(Class {
                name: name.to_string(),
                location: at(name_pos.unwrap_or(range.start)),
                range,
            }),
            SymbolClass::Function => {
                let lines = read_line_range(&self.path, range.start.line, range.end.line).map_err(
                    |source| DocumentError::CodeBlock {
                        path: self.path.clone(),
                        source,
                    },
                )?;
                let pos = name_pos.unwrap_or_else(|| {
                    lines
                        .first()
                        .and_then(|first| find_utf16(first, name, range.start.character))
                        .map_or(range.start, |col| Position::new(range.start.line, col))
                });
                let code = CodeBlock::new(self.uri, lines, range.start.line);
                Symbol::Function(Function::new(name, at(pos), range.end, code))
            }
        };
        self.doc.insert(symbol);
        Ok(())
    }
}
