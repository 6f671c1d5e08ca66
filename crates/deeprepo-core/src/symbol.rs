//! Symbol entities extracted from a document.
//!
//! The set of kinds is closed: it mirrors the subset of the language server's
//! symbol-kind enumeration that the graph cares about. Everything else the
//! server reports is dropped during extraction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DeclKey, Location, Position, Range};

// ============================================================================
// Node Index
// ============================================================================

/// Stable identity of a committed graph node.
///
/// Indices are dense and assigned in commit order, so they double as the
/// `index` field of the serialized graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIndex(pub usize);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Code Block
// ============================================================================

/// Contiguous source lines of a declaration, read straight from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// URI of the file the lines came from.
    pub uri: String,
    /// The lines, without terminators.
    pub lines: Vec<String>,
    /// File line number of `lines[0]`.
    pub base_line: u32,
    /// Column offset added to every column inside the block. Zero when the
    /// block holds whole lines.
    #[serde(default)]
    pub base_character: u32,
}

impl CodeBlock {
    pub fn new(uri: impl Into<String>, lines: Vec<String>, base_line: u32) -> Self {
        CodeBlock {
            uri: uri.into(),
            lines,
            base_line,
            base_character: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines in the block.
    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

impl fmt::Display for CodeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

// ============================================================================
// Symbol Kinds
// ============================================================================

/// A module-level variable or constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub location: Location,
}

/// A function or method, the unit the graph is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Position of the function's name.
    pub location: Location,
    /// End of the function's full range.
    pub end: Position,
    pub code: CodeBlock,
    /// Assigned once the function is committed to the graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<NodeIndex>,
    /// Generated downstream; empty until then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Committed functions this one calls, in discovery order.
    #[serde(default)]
    pub dependencies: Vec<NodeIndex>,
}

impl Function {
    pub fn new(name: impl Into<String>, location: Location, end: Position, code: CodeBlock) -> Self {
        Function {
            name: name.into(),
            location,
            end,
            code,
            index: None,
            context: None,
            dependencies: Vec::new(),
        }
    }

    /// Record a dependency edge. Repeated edges to the same node are kept
    /// once.
    pub fn add_dependency(&mut self, index: NodeIndex) {
        if !self.dependencies.contains(&index) {
            self.dependencies.push(index);
        }
    }
}

/// A class declaration. Recorded for lookups, never scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    pub location: Location,
    pub range: Range,
}

/// Closed union of symbol kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Symbol {
    Variable(Variable),
    Function(Function),
    Class(Class),
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Variable(v) => &v.name,
            Symbol::Function(f) => &f.name,
            Symbol::Class(c) => &c.name,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Symbol::Variable(v) => &v.location,
            Symbol::Function(f) => &f.location,
            Symbol::Class(c) => &c.location,
        }
    }

    /// Declaration key derived from the symbol's location.
    pub fn key(&self) -> DeclKey {
        self.location().key()
    }

    /// Kind label used in serialized output.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Symbol::Variable(_) => "Variable",
            Symbol::Function(_) => "Function",
            Symbol::Class(_) => "Class",
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Symbol::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut Function> {
        match self {
            Symbol::Function(f) => Some(f),
            _ => None,
        }
    }
}
