//! Positional types shared by every module.
//!
//! Coordinates follow the language server convention:
//! - `line`: 0-indexed line number
//! - `character`: 0-indexed column
//!
//! A [`DeclKey`] is the identity of a declaration inside the knowledge graph.
//! It is derived from `(uri, line, character)` and is injective within a
//! document because the two numeric components are always the trailing
//! `:`-separated fields.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Position / Range
// ============================================================================

/// Zero-based position inside a text document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Position { line, character }
    }

    /// Key fragment `line:character`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.line, self.character)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.character)
    }
}

/// Half-open range as reported by the language server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Range { start, end }
    }
}

// ============================================================================
// Location
// ============================================================================

/// A lexical position inside a specific file.
///
/// Used both as a symbol's own declaration site and as the target of a
/// dependency reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Document URI (`file://...`).
    pub uri: String,
    /// Position of the declaration name.
    pub position: Position,
}

impl Location {
    pub fn new(uri: impl Into<String>, position: Position) -> Self {
        Location {
            uri: uri.into(),
            position,
        }
    }

    /// Declaration key for this location.
    pub fn key(&self) -> DeclKey {
        DeclKey::new(&self.uri, self.position)
    }

    /// Comparison key for deterministic sorting: (uri, line, character).
    fn sort_key(&self) -> (&str, u32, u32) {
        (&self.uri, self.position.line, self.position.character)
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uri, self.position)
    }
}

// ============================================================================
// Declaration Key
// ============================================================================

/// Identity of a declaration: `uri:line:character`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclKey(String);

impl DeclKey {
    pub fn new(uri: &str, position: Position) -> Self {
        DeclKey(format!("{}:{}", uri, position.key()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a key back into its location.
    ///
    /// Parses from the right so URIs containing `:` (every `file://` URI)
    /// survive the round trip.
    pub fn parse(&self) -> Option<Location> {
        let parts: Vec<&str> = self.0.rsplitn(3, ':').collect();
        if parts.len() != 3 {
            return None;
        }
        let character: u32 = parts[0].parse().ok()?;
        let line: u32 = parts[1].parse().ok()?;
        Some(Location::new(parts[2], Position::new(line, character)))
    }
}

impl fmt::Display for DeclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Location> for DeclKey {
    fn from(loc: &Location) -> Self {
        loc.key()
    }
}

// ============================================================================
// Tests
// ============================================================================
