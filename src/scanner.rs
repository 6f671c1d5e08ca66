//! Graph construction: resolve every candidate token in every function to
//! its declaration and record an edge when the target is an internal
//! function that already has an index.
//!
//! # Traversal
//!
//! ```text
//! scan_file(uri)
//!   ├─ already in docs_map? → return
//!   ├─ extract Document, insert into docs_map   (before any recursion)
//!   └─ for each function in document order:
//!        for each token:
//!          definition(token) → internal? → scan_file(target file) → edge
//!        commit function → NodeIndex
//! ```
//!
//! Inserting the document before recursing is what makes cyclic imports
//! terminate: a cycle back to a file in progress stops at the first check.
//!
//! # Ordering
//!
//! A function gets its index only after all of its tokens are processed, and
//! edges may only point at functions that already have an index. The graph is
//! therefore acyclic by construction. The cost is that a call to a function
//! that has not been committed yet (declared later in the same file, or on a
//! file that is still in progress further up the recursion) is dropped.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use deeprepo_core::graph::KnowledgeGraph;
use deeprepo_core::symbol::{CodeBlock, NodeIndex};
use deeprepo_core::text::{expand_tabs, find_utf16, normalize_uri};
use deeprepo_core::types::{DeclKey, Location, Position};

use crate::document::{extract, DocumentError, ExtractOptions};
use crate::lexer::{tokens, Token};
use crate::lsp::{LanguageProfile, LanguageServer};

/// Directory names that never hold internal code.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".venv",
    "venv",
    "site-packages",
    "node_modules",
    "__pycache__",
    ".git",
    "target",
];

/// Errors that abort a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// A definition query failed at the transport level.
    #[error("language server failure: {0}")]
    Server(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The entry file is not inside the workspace.
    #[error("entry {uri} is outside the workspace {root}")]
    OutsideWorkspace { uri: String, root: String },
}

/// Result type for scanning.
pub type ScanResult<T> = Result<T, ScanError>;

/// Scan settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Directory names excluded from "internal", matched per path segment.
    pub exclude_dirs: Vec<String>,
    pub include_nested: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            include_nested: false,
        }
    }
}

/// Counters collected while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub files: usize,
    pub functions: usize,
    pub tokens: usize,
    /// Tokens with no definition (timeouts included).
    pub unresolved: usize,
    /// Definitions outside the workspace or in excluded directories.
    pub external: usize,
    pub edges: usize,
    /// Internal function targets without an index yet.
    pub dropped: usize,
}

/// Depth-first graph builder over one language server.
pub struct Scanner<'a, S: LanguageServer> {
    server: &'a mut S,
    profile: &'a LanguageProfile,
    /// Workspace root URI with a trailing `/`.
    root_prefix: String,
    options: ScanOptions,
    graph: KnowledgeGraph,
    stats: ScanStats,
}

impl<'a, S: LanguageServer> Scanner<'a, S> {
    /// `root` may be a path or a `file://` URI.
    pub fn new(server: &'a mut S, profile: &'a LanguageProfile, root: &str, options: ScanOptions) -> Self {
        let root_uri = normalize_uri(root).trim_end_matches('/').to_string();
        Scanner {
            server,
            profile,
            root_prefix: format!("{}/", root_uri),
            options,
            graph: KnowledgeGraph::new(root_uri),
            stats: ScanStats::default(),
        }
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn into_graph(self) -> KnowledgeGraph {
        self.graph
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Whether `uri` is under the workspace root and outside every excluded
    /// directory. Any spelling of the URI is accepted.
    pub fn is_internal(&self, uri: &str) -> bool {
        let uri = normalize_uri(uri);
        let Some(rest) = uri.strip_prefix(self.root_prefix.as_str()) else {
            return false;
        };
        let mut segments: Vec<&str> = rest.split('/').collect();
        segments.pop();
        !segments
            .iter()
            .any(|seg| self.options.exclude_dirs.iter().any(|ex| ex == seg))
    }

    /// Scan from an entry file. `entry` may be a path or a `file://` URI.
    pub fn scan(&mut self, entry: &str) -> ScanResult<&KnowledgeGraph> {
        let uri = normalize_uri(entry);
        if !self.is_internal(&uri) {
            return Err(ScanError::OutsideWorkspace {
                uri,
                root: self.graph.base_uri().to_string(),
            });
        }
        self.scan_canonical(&uri)?;
        info!(
            files = self.stats.files,
            functions = self.stats.functions,
            edges = self.stats.edges,
            "scan complete"
        );
        Ok(&self.graph)
    }

    /// Scan one file and everything it reaches. No-op for files already seen.
    pub fn scan_file(&mut self, uri: &str) -> ScanResult<()> {
        let uri = normalize_uri(uri);
        self.scan_canonical(&uri)
    }

    /// `uri` must already be in [`normalize_uri`] form: it keys `docs_map`.
    fn scan_canonical(&mut self, uri: &str) -> ScanResult<()> {
        if self.graph.has_document(uri) {
            return Ok(());
        }
        info!(uri, "scanning file");

        let options = ExtractOptions {
            include_nested: self.options.include_nested,
        };
        let doc = extract(&mut *self.server, uri, options)?;
        let keys = doc.function_keys();
        self.graph.insert_document(doc);
        self.stats.files += 1;

        for key in keys {
            self.scan_function(uri, &key)?;
        }
        Ok(())
    }

    fn scan_function(&mut self, uri: &str, key: &DeclKey) -> ScanResult<()> {
        if self.graph.index_of(key).is_some() {
            return Ok(());
        }
        let Some(code) = self
            .graph
            .document(uri)
            .and_then(|d| d.function(key))
            .map(|f| f.code.clone())
        else {
            return Ok(());
        };

        // Collected up front: resolving a token may recurse into other files.
        let candidates: Vec<Token> = tokens(&code, self.profile).collect();
        let mut deps: Vec<NodeIndex> = Vec::new();

        for token in candidates {
            self.stats.tokens += 1;
            if let Some(idx) = self.resolve(uri, key, &code, &token)? {
                if !deps.contains(&idx) {
                    deps.push(idx);
                }
            }
        }

        let Some(mut function) = self
            .graph
            .document(uri)
            .and_then(|d| d.function(key))
            .cloned()
        else {
            return Ok(());
        };
        for &dep in &deps {
            function.add_dependency(dep);
        }
        let index = self.graph.commit(function);
        if let Some(f) = self.graph.document_mut(uri).and_then(|d| d.function_mut(key)) {
            f.index = Some(index);
            f.dependencies = deps.clone();
        }

        self.stats.functions += 1;
        self.stats.edges += deps.len();
        debug!(key = %key, %index, dependencies = deps.len(), "function committed");
        Ok(())
    }

    /// Resolve one token to the index of the internal function it names.
    ///
    /// A miss at the token's own position is retried once where the profile's
    /// locator places the same word in the block, if that differs.
    fn resolve(
        &mut self,
        uri: &str,
        current: &DeclKey,
        code: &CodeBlock,
        token: &Token,
    ) -> ScanResult<Option<NodeIndex>> {
        let mut definition = self
            .server
            .definition(uri, token.position)
            .map_err(|e| ScanError::Server(Box::new(e)))?;
        if definition.is_none() {
            if let Some(position) = self.relocate(code, token) {
                debug!(token = %token.text, from = %token.position, to = %position, "retrying definition");
                definition = self
                    .server
                    .definition(uri, position)
                    .map_err(|e| ScanError::Server(Box::new(e)))?;
            }
        }
        let Some(definition) = definition else {
            self.stats.unresolved += 1;
            debug!(token = %token.text, position = %token.position, "unresolved");
            return Ok(None);
        };
        let definition = Location::new(normalize_uri(&definition.uri), definition.position);
        if !self.is_internal(&definition.uri) {
            self.stats.external += 1;
            return Ok(None);
        }

        if !self.graph.has_document(&definition.uri) {
            self.scan_canonical(&definition.uri)?;
        }

        let target = definition.key();
        if target == *current {
            return Ok(None);
        }
        let is_function = self
            .graph
            .document(&definition.uri)
            .is_some_and(|d| d.function(&target).is_some());
        if !is_function {
            return Ok(None);
        }

        match self.graph.index_of(&target) {
            Some(idx) => Ok(Some(idx)),
            None => {
                self.stats.dropped += 1;
                debug!(token = %token.text, target = %target, "target not indexed yet, edge dropped");
                Ok(None)
            }
        }
    }

    /// Where the locator puts `token`'s word, when that is not the token itself.
    fn relocate(&self, code: &CodeBlock, token: &Token) -> Option<Position> {
        let line = token.position.line.checked_sub(code.base_line)?;
        let character = token.position.character.saturating_sub(code.base_character);
        let found = self.profile.locate(&code.lines, line, character + 1, &token.text);
        // the locator's fallback is not a match
        let text = code.lines.get(found.line as usize)?;
        let expanded = expand_tabs(text, self.profile.tab_width);
        if find_utf16(&expanded, &token.text, 0) != Some(found.character) {
            return None;
        }
        let position = Position::new(
            found.line + code.base_line,
            found.character + code.base_character,
        );
        (position != token.position).then_some(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{function_symbol, variable_symbol, MockServer, Workspace};

    fn names(graph: &KnowledgeGraph, idx: &[NodeIndex]) -> Vec<String> {
        idx.iter()
            .map(|i| graph.node(*i).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn cross_file_call_becomes_edge() {
        let ws = Workspace::new();
        let util = ws.write("pkg/util.py", "def helper(x):\n    return x\n");
        let main = ws.write(
            "main.py",
            "from pkg.util import helper\n\ndef run():\n    return helper(1)\n",
        );

        let mut server = MockServer::new();
        server.set_symbols(&util, vec![function_symbol("helper", 0, 1, 4)]);
        server.set_symbols(&main, vec![function_symbol("run", 2, 3, 4)]);
        server.define("helper", Location::new(&util, Position::new(0, 4)));
        server.define("run", Location::new(&main, Position::new(2, 4)));

        let profile = LanguageProfile::python();
        let mut scanner = Scanner::new(&mut server, &profile, &ws.root_uri(), ScanOptions::default());
        scanner.scan(&main).unwrap();
        let stats = scanner.stats();
        let graph = scanner.into_graph();

        assert_eq!(graph.len(), 2);
        let run = graph.lookup(&DeclKey::new(&main, Position::new(2, 4))).unwrap();
        assert_eq!(names(&graph, &run.dependencies), vec!["helper"]);
        let helper = graph.lookup(&DeclKey::new(&util, Position::new(0, 4))).unwrap();
        assert!(helper.dependencies.is_empty());
        assert!(helper.index < run.index);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.edges, 1);
    }

    #[test]
    fn escaped_definition_uris_stay_internal() {
        let ws = Workspace::new();
        let util = ws.write("c++tools/util.py", "def helper(x):\n    return x\n");
        let main = ws.write(
            "c++tools/main.py",
            "from util import helper\n\ndef run():\n    return helper(1)\n",
        );
        let escaped_util = util.replace("c++tools", "c%2B%2Btools");

        let mut server = MockServer::new();
        server.set_symbols(&util, vec![function_symbol("helper", 0, 1, 4)]);
        server.set_symbols(&main, vec![function_symbol("run", 2, 3, 4)]);
        server.define("helper", Location::new(&escaped_util, Position::new(0, 4)));

        let profile = LanguageProfile::python();
        let root = ws.uri("c++tools");
        let mut scanner = Scanner::new(&mut server, &profile, &root, ScanOptions::default());
        assert!(scanner.is_internal(&escaped_util));
        scanner.scan(&main).unwrap();
        // scanning the escaped spelling again must not extract a second copy
        scanner.scan_file(&escaped_util).unwrap();
        let stats = scanner.stats();
        let graph = scanner.into_graph();

        assert_eq!(stats.edges, 1);
        assert_eq!(stats.external, 0);
        assert_eq!(graph.document_count(), 2);
        let run = graph.lookup(&DeclKey::new(&main, Position::new(2, 4))).unwrap();
        assert_eq!(names(&graph, &run.dependencies), vec!["helper"]);
        assert_eq!(server.symbol_requests.len(), 2);
    }

    #[test]
    fn missed_definition_is_retried_at_located_word() {
        let ws = Workspace::new();
        let util = ws.write("util.py", "def helper(x):\n    return x\n");
        let main = ws.write("main.py", "def run():\n    return \"helper: \" + helper(1)\n");

        let mut server = MockServer::new();
        server.set_symbols(&util, vec![function_symbol("helper", 0, 1, 4)]);
        server.set_symbols(&main, vec![function_symbol("run", 0, 1, 4)]);
        // only the first spelling on the line resolves, the call itself misses
        server.define_at(&main, Position::new(1, 12), Location::new(&util, Position::new(0, 4)));

        let profile = LanguageProfile::python();
        let mut scanner = Scanner::new(&mut server, &profile, &ws.root_uri(), ScanOptions::default());
        scanner.scan(&main).unwrap();
        let stats = scanner.stats();
        let graph = scanner.into_graph();

        assert_eq!(stats.edges, 1);
        let run = graph.lookup(&DeclKey::new(&main, Position::new(0, 4))).unwrap();
        assert_eq!(names(&graph, &run.dependencies), vec!["helper"]);
        assert!(server.definition_requests > stats.tokens);
    }

    #[test]
    fn only_external_calls_give_empty_dependencies() {
        let ws = Workspace::new();
        let main = ws.write(
            "main.py",
            "import os\n\ndef run(path):\n    return os.path.join(path, 'x')\n",
        );

        let mut server = MockServer::new();
        server.set_symbols(&main, vec![function_symbol("run", 2, 3, 4)]);
        server.define("os", Location::new("file:///usr/lib/python3/os.py", Position::new(0, 0)));
        server.define("join", Location::new("file:///usr/lib/python3/posixpath.py", Position::new(70, 4)));

        let profile = LanguageProfile::python();
        let mut scanner = Scanner::new(&mut server, &profile, &ws.root_uri(), ScanOptions::default());
        scanner.scan(&main).unwrap();
        let stats = scanner.stats();
        let graph = scanner.into_graph();

        assert_eq!(graph.len(), 1);
        assert!(graph.nodes()[0].dependencies.is_empty());
        assert!(stats.external >= 2);
        assert_eq!(server.symbol_requests, vec![main]);
    }

    #[test]
    fn no_self_edges_for_recursion() {
        let ws = Workspace::new();
        let main = ws.write("main.py", "def fact(n):\n    return n * fact(n - 1)\n");
        let mut server = MockServer::new();
        server.set_symbols(&main, vec![function_symbol("fact", 0, 1, 4)]);
        server.define("fact", Location::new(&main, Position::new(0, 4)));

        let profile = LanguageProfile::python();
        let mut scanner = Scanner::new(&mut server, &profile, &ws.root_uri(), ScanOptions::default());
        scanner.scan(&main).unwrap();
        assert!(scanner.graph().nodes()[0].dependencies.is_empty());
    }

    #[test]
    fn forward_reference_in_same_file_is_dropped() {
        let ws = Workspace::new();
        let main = ws.write(
            "main.py",
            "def first():\n    return second()\n\ndef second():\n    return 1\n\ndef third():\n    return second()\n",
        );
        let mut server = MockServer::new();
        server.set_symbols(
            &main,
            vec![
                function_symbol("first", 0, 1, 4),
                function_symbol("second", 3, 4, 4),
                function_symbol("third", 6, 7, 4),
            ],
        );
        server.define("second", Location::new(&main, Position::new(3, 4)));

        let profile = LanguageProfile::python();
        let mut scanner = Scanner::new(&mut server, &profile, &ws.root_uri(), ScanOptions::default());
        scanner.scan(&main).unwrap();
        let stats = scanner.stats();
        let graph = scanner.into_graph();

        let first = graph.lookup(&DeclKey::new(&main, Position::new(0, 4))).unwrap();
        let third = graph.lookup(&DeclKey::new(&main, Position::new(6, 4))).unwrap();
        assert!(first.dependencies.is_empty());
        assert_eq!(names(&graph, &third.dependencies), vec!["second"]);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn cyclic_imports_terminate_and_stay_acyclic() {
        let ws = Workspace::new();
        let a = ws.write("a.py", "def ping():\n    return pong()\n");
        let b = ws.write("b.py", "def pong():\n    return ping()\n");
        let mut server = MockServer::new();
        server.set_symbols(&a, vec![function_symbol("ping", 0, 1, 4)]);
        server.set_symbols(&b, vec![function_symbol("pong", 0, 1, 4)]);
        server.define("ping", Location::new(&a, Position::new(0, 4)));
        server.define("pong", Location::new(&b, Position::new(0, 4)));

        let profile = LanguageProfile::python();
        let mut scanner = Scanner::new(&mut server, &profile, &ws.root_uri(), ScanOptions::default());
        scanner.scan(&a).unwrap();
        let graph = scanner.into_graph();

        assert_eq!(graph.len(), 2);
        for node in graph.nodes() {
            let own = node.index.unwrap();
            assert!(node.dependencies.iter().all(|d| *d < own));
        }
        // each file extracted once
        assert_eq!(server.symbol_requests.len(), 2);
    }

    #[test]
    fn excluded_directories_are_external() {
        let ws = Workspace::new();
        let vendored = ws.write(".venv/lib/requests.py", "def get(url):\n    return url\n");
        let main = ws.write("main.py", "def run():\n    return get('u')\n");
        let mut server = MockServer::new();
        server.set_symbols(&main, vec![function_symbol("run", 0, 1, 4)]);
        server.set_symbols(&vendored, vec![function_symbol("get", 0, 1, 4)]);
        server.define("get", Location::new(&vendored, Position::new(0, 4)));

        let profile = LanguageProfile::python();
        let mut scanner = Scanner::new(&mut server, &profile, &ws.root_uri(), ScanOptions::default());
        assert!(!scanner.is_internal(&vendored));
        assert!(scanner.is_internal(&main));
        scanner.scan(&main).unwrap();
        assert_eq!(scanner.graph().len(), 1);
        assert!(!scanner.graph().has_document(&vendored));
    }

    #[test]
    fn variables_are_not_dependencies() {
        let ws = Workspace::new();
        let main = ws.write("main.py", "LIMIT = 3\n\ndef run():\n    return LIMIT\n");
        let mut server = MockServer::new();
        server.set_symbols(
            &main,
            vec![variable_symbol("LIMIT", 0, 0), function_symbol("run", 2, 3, 4)],
        );
        server.define("LIMIT", Location::new(&main, Position::new(0, 0)));

        let profile = LanguageProfile::python();
        let mut scanner = Scanner::new(&mut server, &profile, &ws.root_uri(), ScanOptions::default());
        scanner.scan(&main).unwrap();
        assert!(scanner.graph().nodes()[0].dependencies.is_empty());
    }

    #[test]
    fn entry_outside_workspace_is_rejected() {
        let ws = Workspace::new();
        let mut server = MockServer::new();
        let profile = LanguageProfile::python();
        let mut scanner = Scanner::new(&mut server, &profile, &ws.root_uri(), ScanOptions::default());
        let err = scanner.scan("file:///elsewhere/x.py").unwrap_err();
        assert!(matches!(err, ScanError::OutsideWorkspace { .. }));
    }

    #[test]
    fn raw_export_orders_cleanly() {
        let ws = Workspace::new();
        let a = ws.write("a.py", "def low():\n    return 1\n\ndef mid():\n    return low()\n");
        let b = ws.write("b.py", "def top():\n    return mid() + low()\n");
        let mut server = MockServer::new();
        server.set_symbols(&a, vec![function_symbol("low", 0, 1, 4), function_symbol("mid", 3, 4, 4)]);
        server.set_symbols(&b, vec![function_symbol("top", 0, 1, 4)]);
        server.define("low", Location::new(&a, Position::new(0, 4)));
        server.define("mid", Location::new(&a, Position::new(3, 4)));
        server.define_at(&b, Position::new(1, 11), Location::new(&a, Position::new(3, 4)));

        let profile = LanguageProfile::python();
        let mut scanner = Scanner::new(&mut server, &profile, ws.root().to_str().unwrap(), ScanOptions::default());
        scanner.scan(&b).unwrap();
        let raw = scanner.graph().to_raw_nodes();
        let sorted = deeprepo_core::preprocess::topological_sort(&raw).unwrap();
        let order: Vec<&str> = sorted.iter().map(|n| n.node.name.as_str()).collect();
        assert_eq!(order, vec!["low", "mid", "top"]);
        assert_eq!(raw[2].dependencies, vec![1, 0]);
    }
}
