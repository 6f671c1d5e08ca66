//! End-to-end pipeline against an in-memory language server:
//! scan -> serialize -> preprocess -> fill contexts.

use std::collections::HashMap;
use std::convert::Infallible;

use deeprepo::context::{ContextProvider, DependencyContext};
use deeprepo::lsp::protocol::{DocumentSymbol, DocumentSymbolResponse, SymbolKind};
use deeprepo::lsp::{LanguageProfile, LanguageServer};
use deeprepo::preprocess::{NodeInfo, Preprocessor};
use deeprepo::scanner::{ScanOptions, Scanner};
use deeprepo::text::{path_to_uri, read_uri};
use deeprepo::types::{Location, Position, Range};
use tempfile::TempDir;

/// Answers symbols from a table and definitions by the word under the cursor.
#[derive(Default)]
struct TableServer {
    symbols: HashMap<String, Vec<DocumentSymbol>>,
    definitions: HashMap<String, Location>,
}

impl TableServer {
    fn function(&mut self, uri: &str, name: &str, start: u32, end: u32) {
        let name_at = Position::new(start, 4);
        self.symbols.entry(uri.to_string()).or_default().push(DocumentSymbol {
            name: name.to_string(),
            detail: None,
            kind: SymbolKind::FUNCTION,
            range: Range::new(Position::new(start, 0), Position::new(end, 80)),
            selection_range: Range::new(name_at, Position::new(start, 4 + name.len() as u32)),
            children: Vec::new(),
        });
        self.definitions
            .insert(name.to_string(), Location::new(uri, name_at));
    }
}

impl LanguageServer for TableServer {
    type Error = Infallible;

    fn document_symbols(&mut self, uri: &str) -> Result<Option<DocumentSymbolResponse>, Infallible> {
        Ok(self
            .symbols
            .get(uri)
            .cloned()
            .map(DocumentSymbolResponse::Nested))
    }

    fn definition(&mut self, uri: &str, position: Position) -> Result<Option<Location>, Infallible> {
        let Ok(text) = read_uri(uri) else {
            return Ok(None);
        };
        let word: String = text
            .lines()
            .nth(position.line as usize)
            .unwrap_or("")
            .chars()
            .skip(position.character as usize)
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        Ok(self.definitions.get(&word).cloned())
    }
}

struct Summaries;

impl ContextProvider for Summaries {
    type Error = Infallible;

    fn generate(&mut self, node: &NodeInfo, deps: &[DependencyContext<'_>]) -> Result<String, Infallible> {
        let inner: Vec<&str> = deps.iter().filter_map(|d| d.context).collect();
        Ok(format!("{}[{}]", node.name, inner.join(",")))
    }
}

fn write(root: &TempDir, rel: &str, text: &str) -> String {
    let path = root.path().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, text).unwrap();
    path_to_uri(&path)
}

#[test]
fn scan_then_order_puts_dependencies_first() {
    let ws = TempDir::new().unwrap();
    let db = write(&ws, "store/db.py", "def connect():\n    return 1\n\ndef query(sql):\n    return connect()\n");
    let api = write(
        &ws,
        "api.py",
        "from store.db import query\n\ndef handler(req):\n    # query is mentioned here but stripped\n    return query(\"select\")\n",
    );
    let main = write(&ws, "main.py", "from api import handler\n\ndef main():\n    print(handler(None))\n");

    let mut server = TableServer::default();
    server.function(&db, "connect", 0, 1);
    server.function(&db, "query", 3, 4);
    server.function(&api, "handler", 2, 4);
    server.function(&main, "main", 2, 3);

    let profile = LanguageProfile::python();
    let root_uri = path_to_uri(ws.path());
    let mut scanner = Scanner::new(&mut server, &profile, &root_uri, ScanOptions::default());
    scanner.scan(&main).unwrap();
    let graph = scanner.into_graph();

    assert_eq!(graph.len(), 4);
    assert_eq!(graph.edge_count(), 3);
    assert_eq!(graph.document_count(), 3);

    let raw_path = ws.path().join("graph.json");
    graph.save_raw(&raw_path).unwrap();

    let mut preprocessor = Preprocessor::new(&raw_path);
    let ordered = preprocessor.load().unwrap();
    let names: Vec<&str> = ordered.iter().map(|s| s.node.name.as_str()).collect();
    assert_eq!(names, vec!["connect", "query", "handler", "main"]);

    let mut processed = preprocessor.into_graph().unwrap();
    processed.fill_contexts(&mut Summaries).unwrap();
    let last = processed.iter().last().unwrap();
    assert_eq!(last.context.as_deref(), Some("main[handler[query[connect[]]]]"));

    let out = ws.path().join("processed.json");
    processed.save(&out).unwrap();
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert!(saved.is_object() || saved.is_array());
}

#[test]
fn dot_export_labels_are_relative() {
    let ws = TempDir::new().unwrap();
    let main = write(&ws, "app/main.py", "def run():\n    return 0\n");
    let mut server = TableServer::default();
    server.function(&main, "run", 0, 1);

    let profile = LanguageProfile::python();
    let root_uri = path_to_uri(ws.path());
    let mut scanner = Scanner::new(&mut server, &profile, &root_uri, ScanOptions::default());
    scanner.scan(&main).unwrap();

    let dot = scanner.graph().to_dot();
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("label=\"run\\napp/main.py:0:4\""));
    assert!(dot.contains("lightblue"));
}
