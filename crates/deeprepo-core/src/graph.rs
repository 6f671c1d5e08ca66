//! The knowledge graph built by scanning.
//!
//! # Layout
//!
//! ```text
//! docs_map : uri     -> Document      (parse cache, one entry per scanned file)
//! decl_map : DeclKey -> NodeIndex     (durable output)
//! nodes    : NodeIndex -> Function    (arena, dense, commit order)
//! ```
//!
//! A function's dependencies are [`NodeIndex`] values into the arena, never
//! owned copies. Because an edge may only point at a node that was already
//! committed, every dependency index is smaller than the index of the node
//! holding it, so the committed graph is acyclic and arena order is already
//! a valid processing order.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::document::Document;
use crate::error::GraphResult;
use crate::preprocess::RawNode;
use crate::symbol::{Function, NodeIndex, Symbol};
use crate::types::DeclKey;

/// Nodes and edges discovered by a scan.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    base_uri: String,
    docs_map: HashMap<String, Document>,
    decl_map: HashMap<DeclKey, NodeIndex>,
    nodes: Vec<Function>,
}

impl KnowledgeGraph {
    pub fn new(base_uri: impl Into<String>) -> Self {
        KnowledgeGraph {
            base_uri: base_uri.into(),
            ..Default::default()
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    // ------------------------------------------------------------------------
    // Parse cache
    // ------------------------------------------------------------------------

    pub fn has_document(&self, uri: &str) -> bool {
        self.docs_map.contains_key(uri)
    }

    pub fn document(&self, uri: &str) -> Option<&Document> {
        self.docs_map.get(uri)
    }

    pub fn document_mut(&mut self, uri: &str) -> Option<&mut Document> {
        self.docs_map.get_mut(uri)
    }

    /// Register a document. Returns `false` (and keeps the existing entry)
    /// if the URI was already cached.
    pub fn insert_document(&mut self, doc: Document) -> bool {
        if self.docs_map.contains_key(doc.uri()) {
            return false;
        }
        self.docs_map.insert(doc.uri().to_string(), doc);
        true
    }

    pub fn document_count(&self) -> usize {
        self.docs_map.len()
    }

    // ------------------------------------------------------------------------
    // Committed nodes
    // ------------------------------------------------------------------------

    /// Commit a function under its declaration key and return its index.
    ///
    /// Committing a key twice returns the first index and leaves the arena
    /// unchanged.
    pub fn commit(&mut self, mut function: Function) -> NodeIndex {
        let key = function.location.key();
        if let Some(&existing) = self.decl_map.get(&key) {
            return existing;
        }
        let index = NodeIndex(self.nodes.len());
        function.index = Some(index);
        self.decl_map.insert(key, index);
        self.nodes.push(function);
        index
    }

    pub fn index_of(&self, key: &DeclKey) -> Option<NodeIndex> {
        self.decl_map.get(key).copied()
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Function> {
        self.nodes.get(index.0)
    }

    pub fn lookup(&self, key: &DeclKey) -> Option<&Function> {
        self.index_of(key).and_then(|idx| self.node(idx))
    }

    /// Committed functions in index order.
    pub fn nodes(&self) -> &[Function] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|f| f.dependencies.len()).sum()
    }

    // ------------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------------

    /// Serialized node list consumed by the preprocessor.
    pub fn to_raw_nodes(&self) -> Vec<RawNode> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, f)| {
                let dependencies: Vec<usize> = f.dependencies.iter().map(|d| d.0).collect();
                RawNode {
                    index,
                    kind: "Function".to_string(),
                    name: f.name.clone(),
                    uri: f.location.uri.clone(),
                    code_content: f.code.to_string(),
                    dependencies_count: dependencies.len(),
                    dependencies,
                }
            })
            .collect()
    }

    /// Write the serialized node list as pretty JSON.
    pub fn save_raw(&self, path: &Path) -> GraphResult<()> {
        let json = serde_json::to_string_pretty(&self.to_raw_nodes())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn display_key<'a>(&self, key: &'a str) -> &'a str {
        if self.base_uri.is_empty() {
            return key;
        }
        key.strip_prefix(self.base_uri.as_str())
            .map(|k| k.trim_start_matches('/'))
            .unwrap_or(key)
    }

    /// Graphviz rendering. Functions are light blue, variables light green.
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        dot.push_str("digraph KnowledgeGraph {\n");
        dot.push_str("  rankdir=LR;\n");
        dot.push_str("  node [shape=box, style=filled, fontname=\"Arial\"];\n");
        dot.push_str("  edge [fontname=\"Arial\", fontsize=10];\n\n");

        for f in &self.nodes {
            let key = f.location.key();
            let _ = writeln!(
                dot,
                "  \"{}\" [label=\"{}\\n{}\", fillcolor=\"lightblue\"];",
                escape_dot(key.as_str()),
                escape_dot(&f.name),
                escape_dot(self.display_key(key.as_str()))
            );
        }
        let mut variables: Vec<(DeclKey, &str)> = self
            .docs_map
            .values()
            .flat_map(|doc| doc.symbols())
            .filter_map(|sym| match sym {
                Symbol::Variable(v) => Some((v.location.key(), v.name.as_str())),
                _ => None,
            })
            .collect();
        variables.sort();
        for (key, name) in variables {
            let _ = writeln!(
                dot,
                "  \"{}\" [label=\"{}\\n{}\", fillcolor=\"lightgreen\"];",
                escape_dot(key.as_str()),
                escape_dot(name),
                escape_dot(self.display_key(key.as_str()))
            );
        }

        dot.push('\n');
        for f in &self.nodes {
            let from = f.location.key();
            for dep in &f.dependencies {
                if let Some(target) = self.node(*dep) {
                    let _ = writeln!(
                        dot,
                        "  \"{}\" -> \"{}\";",
                        escape_dot(from.as_str()),
                        escape_dot(target.location.key().as_str())
                    );
                }
            }
        }
        dot.push_str("}\n");
        dot
    }

    /// `{nodes, edges}` form for generic graph viewers.
    pub fn to_visual_json(&self) -> GraphResult<String> {
        let nodes = self
            .nodes
            .iter()
            .map(|f| VisualNode {
                id: f.location.key().to_string(),
                kind: "Function",
                name: &f.name,
                uri: &f.location.uri,
                line: f.location.position.line,
                character: f.location.position.character,
                dependencies_count: f.dependencies.len(),
            })
            .collect();

        let mut edges = Vec::new();
        for f in &self.nodes {
            for dep in &f.dependencies {
                if let Some(target) = self.node(*dep) {
                    edges.push(VisualEdge {
                        source: f.location.key().to_string(),
                        target: target.location.key().to_string(),
                        source_name: &f.name,
                        target_name: &target.name,
                    });
                }
            }
        }

        Ok(serde_json::to_string_pretty(&VisualGraph { nodes, edges })?)
    }

    pub fn summary(&self) -> GraphSummary {
        let variables = self
            .docs_map
            .values()
            .flat_map(|d| d.symbols())
            .filter(|s| matches!(s, Symbol::Variable(_)))
            .count();
        let dependencies = self.edge_count();
        let functions = self.nodes.len();

        let mut top: Vec<(String, usize)> = self
            .nodes
            .iter()
            .map(|f| (f.name.clone(), f.dependencies.len()))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(10);

        GraphSummary {
            documents: self.docs_map.len(),
            functions,
            variables,
            dependencies,
            average_dependencies: if functions > 0 {
                dependencies as f64 / functions as f64
            } else {
                0.0
            },
            top_functions: top,
        }
    }
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Serialize)]
struct VisualGraph<'a> {
    nodes: Vec<VisualNode<'a>>,
    edges: Vec<VisualEdge<'a>>,
}

#[derive(Serialize)]
struct VisualNode<'a> {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    uri: &'a str,
    line: u32,
    character: u32,
    dependencies_count: usize,
}

#[derive(Serialize)]
struct VisualEdge<'a> {
    source: String,
    target: String,
    source_name: &'a str,
    target_name: &'a str,
}

/// Counts describing a scanned graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    pub documents: usize,
    pub functions: usize,
    pub variables: usize,
    pub dependencies: usize,
    pub average_dependencies: f64,
    /// Up to ten `(name, dependency count)` pairs, most dependencies first.
    pub top_functions: Vec<(String, usize)>,
}
