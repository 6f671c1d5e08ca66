//! Test helpers: an in-memory language server and an on-disk workspace.

use std::collections::HashMap;

use tempfile::TempDir;
use thiserror::Error;

use deeprepo_core::text::{path_to_uri, read_uri};
use deeprepo_core::types::{Location, Position, Range};

use crate::lsp::protocol::{DocumentSymbol, DocumentSymbolResponse, SymbolInformation, SymbolKind};
use crate::lsp::LanguageServer;

#[derive(Debug, Error)]
#[error("mock transport failure")]
pub struct MockError;

/// A [`LanguageServer`] answering from tables.
///
/// Definitions resolve by exact position first, then by the word found at
/// the requested position in the file on disk.
#[derive(Debug, Default)]
pub struct MockServer {
    symbols: HashMap<String, DocumentSymbolResponse>,
    by_position: HashMap<(String, Position), Location>,
    by_name: HashMap<String, Location>,
    fail_symbols: bool,
    pub symbol_requests: Vec<String>,
    pub definition_requests: usize,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_symbols(&mut self, uri: &str, symbols: Vec<DocumentSymbol>) {
        self.symbols
            .insert(uri.to_string(), DocumentSymbolResponse::Nested(symbols));
    }

    pub fn set_flat_symbols(&mut self, uri: &str, symbols: Vec<SymbolInformation>) {
        self.symbols
            .insert(uri.to_string(), DocumentSymbolResponse::Flat(symbols));
    }

    pub fn define_at(&mut self, uri: &str, position: Position, target: Location) {
        self.by_position.insert((uri.to_string(), position), target);
    }

    /// Resolve every occurrence of `name` to `target`.
    pub fn define(&mut self, name: &str, target: Location) {
        self.by_name.insert(name.to_string(), target);
    }

    pub fn fail_symbols(&mut self) {
        self.fail_symbols = true;
    }

    fn word_at(uri: &str, position: Position) -> Option<String> {
        let text = read_uri(uri).ok()?;
        let line = text.lines().nth(position.line as usize)?;
        let word: String = line
            .chars()
            .skip(position.character as usize)
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if word.is_empty() {
            None
        } else {
            Some(word)
        }
    }
}

impl LanguageServer for MockServer {
    type Error = MockError;

    fn document_symbols(&mut self, uri: &str) -> Result<Option<DocumentSymbolResponse>, MockError> {
        if self.fail_symbols {
            return Err(MockError);
        }
        self.symbol_requests.push(uri.to_string());
        Ok(self.symbols.get(uri).cloned())
    }

    fn definition(&mut self, uri: &str, position: Position) -> Result<Option<Location>, MockError> {
        self.definition_requests += 1;
        if let Some(target) = self.by_position.get(&(uri.to_string(), position)) {
            return Ok(Some(target.clone()));
        }
        Ok(Self::word_at(uri, position).and_then(|w| self.by_name.get(&w).cloned()))
    }
}

/// `def name(...)` spanning `start..=end`, name at column `name_col`.
pub fn function_symbol(name: &str, start: u32, end: u32, name_col: u32) -> DocumentSymbol {
    DocumentSymbol {
        name: name.to_string(),
        detail: None,
        kind: SymbolKind::FUNCTION,
        range: Range::new(Position::new(start, 0), Position::new(end, 80)),
        selection_range: Range::new(
            Position::new(start, name_col),
            Position::new(start, name_col + name.len() as u32),
        ),
        children: Vec::new(),
    }
}

pub fn variable_symbol(name: &str, line: u32, col: u32) -> DocumentSymbol {
    let at = Position::new(line, col);
    DocumentSymbol {
        name: name.to_string(),
        detail: None,
        kind: SymbolKind::VARIABLE,
        range: Range::new(at, Position::new(line, col + name.len() as u32)),
        selection_range: Range::new(at, Position::new(line, col + name.len() as u32)),
        children: Vec::new(),
    }
}

/// A temporary workspace directory.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Workspace {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        self.dir.path()
    }

    pub fn root_uri(&self) -> String {
        path_to_uri(self.dir.path())
    }

    /// Write `rel` under the root and return its URI.
    pub fn write(&self, rel: &str, text: &str) -> String {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, text).unwrap();
        path_to_uri(&path)
    }

    pub fn uri(&self, rel: &str) -> String {
        path_to_uri(&self.dir.path().join(rel))
    }
}
