//! Serde types for the subset of the Language Server Protocol we use.
//!
//! Positions and ranges reuse [`deeprepo_core::types`], which already has the
//! protocol's `{line, character}` / `{start, end}` shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use deeprepo_core::types::{Location, Range};

// ============================================================================
// Symbol Kinds
// ============================================================================

/// Numeric `SymbolKind` as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolKind(pub u32);

impl SymbolKind {
    pub const FILE: SymbolKind = SymbolKind(1);
    pub const MODULE: SymbolKind = SymbolKind(2);
    pub const CLASS: SymbolKind = SymbolKind(5);
    pub const METHOD: SymbolKind = SymbolKind(6);
    pub const PROPERTY: SymbolKind = SymbolKind(7);
    pub const FIELD: SymbolKind = SymbolKind(8);
    pub const CONSTRUCTOR: SymbolKind = SymbolKind(9);
    pub const FUNCTION: SymbolKind = SymbolKind(12);
    pub const VARIABLE: SymbolKind = SymbolKind(13);
    pub const CONSTANT: SymbolKind = SymbolKind(14);

    /// Map onto the kinds the graph keeps. Everything else is dropped.
    pub fn classify(self) -> Option<SymbolClass> {
        match self {
            SymbolKind::VARIABLE | SymbolKind::CONSTANT => Some(SymbolClass::Variable),
            SymbolKind::FUNCTION | SymbolKind::METHOD => Some(SymbolClass::Function),
            SymbolKind::CLASS => Some(SymbolClass::Class),
            _ => None,
        }
    }
}

/// The closed set of kinds a document records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolClass {
    Variable,
    Function,
    Class,
}

// ============================================================================
// Document Symbols
// ============================================================================

/// Hierarchical symbol (`DocumentSymbol`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSymbol {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub kind: SymbolKind,
    pub range: Range,
    pub selection_range: Range,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocumentSymbol>,
}

/// Flat symbol (`SymbolInformation`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInformation {
    pub name: String,
    pub kind: SymbolKind,
    pub location: LspLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

/// Either form of a `textDocument/documentSymbol` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentSymbolResponse {
    Nested(Vec<DocumentSymbol>),
    Flat(Vec<SymbolInformation>),
}

impl DocumentSymbolResponse {
    pub fn len(&self) -> usize {
        match self {
            DocumentSymbolResponse::Nested(v) => v.len(),
            DocumentSymbolResponse::Flat(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Locations
// ============================================================================

/// `Location` as sent on the wire: a URI and a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspLocation {
    pub uri: String,
    pub range: Range,
}

impl LspLocation {
    pub fn start(&self) -> Location {
        Location::new(self.uri.clone(), self.range.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_selection_range: Option<Range>,
    pub target_uri: String,
    pub target_range: Range,
    pub target_selection_range: Range,
}

/// Result of `textDocument/definition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefinitionResponse {
    Scalar(LspLocation),
    Array(Vec<LspLocation>),
    Links(Vec<LocationLink>),
}

impl DefinitionResponse {
    /// The first target, at the start of its name.
    pub fn first(&self) -> Option<Location> {
        match self {
            DefinitionResponse::Scalar(loc) => Some(loc.start()),
            DefinitionResponse::Array(locs) => locs.first().map(LspLocation::start),
            DefinitionResponse::Links(links) => links
                .first()
                .map(|l| Location::new(l.target_uri.clone(), l.target_selection_range.start)),
        }
    }

    /// Decode a raw result. `null` and unrecognized shapes are `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        if value.is_null() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

/// Flatten the `contents` of a hover result into plain text.
///
/// Handles `MarkupContent`, a single `MarkedString` (string or
/// `{language, value}`), and arrays of `MarkedString`.
pub fn hover_text(result: &Value) -> Option<String> {
    fn marked(v: &Value) -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("value").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }

    let contents = result.get("contents")?;
    let text = match contents {
        Value::Array(items) => items.iter().filter_map(marked).collect::<Vec<_>>().join("\n"),
        other => marked(other)?,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ============================================================================
// Message Envelopes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response to one of our requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: u64,
    pub result: Value,
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The result, or `None` for an error response or a `null` result.
    pub fn into_result(self) -> Option<Value> {
        if self.error.is_some() || self.result.is_null() {
            None
        } else {
            Some(self.result)
        }
    }
}

/// One decoded message from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response(Response),
    /// A request the server expects us to answer.
    Request { id: Value, method: String, params: Value },
    Notification { method: String, params: Value },
}

impl Incoming {
    /// Classify a decoded JSON-RPC message.
    ///
    /// A message with both `id` and `method` is a server request, never a
    /// response, even when its id matches one of ours.
    pub fn from_value(mut value: Value) -> Option<Incoming> {
        let obj = value.as_object_mut()?;
        let method = obj.remove("method").and_then(|m| m.as_str().map(str::to_string));
        let id = obj.remove("id").filter(|id| !id.is_null());
        let params = obj.remove("params").unwrap_or(Value::Null);

        match (id, method) {
            (Some(id), Some(method)) => Some(Incoming::Request { id, method, params }),
            (None, Some(method)) => Some(Incoming::Notification { method, params }),
            (Some(id), None) => {
                let id = id
                    .as_u64()
                    .or_else(|| id.as_str().and_then(|s| s.parse().ok()))?;
                let error = obj
                    .remove("error")
                    .and_then(|e| serde_json::from_value(e).ok());
                let result = obj.remove("result").unwrap_or(Value::Null);
                Some(Incoming::Response(Response { id, result, error }))
            }
            (None, None) => None,
        }
    }
}

/// Build a request envelope.
pub fn request(id: u64, method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Build a notification envelope.
pub fn notification(method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}

/// Build a response envelope for a server request.
pub fn response(id: Value, result: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}
