//! Per-file symbol table.

use std::collections::HashMap;

use crate::symbol::{Function, Symbol};
use crate::types::DeclKey;

/// Symbols declared in one file, keyed by declaration key.
///
/// Iteration follows insertion order, which is the order the language server
/// reported the symbols in. Inserting a key that already exists replaces the
/// symbol in place, so repeated extraction of the same file is idempotent.
#[derive(Debug, Clone, Default)]
pub struct Document {
    uri: String,
    symbols: Vec<Symbol>,
    by_key: HashMap<DeclKey, usize>,
}

impl Document {
    pub fn new(uri: impl Into<String>) -> Self {
        Document {
            uri: uri.into(),
            symbols: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn insert(&mut self, symbol: Symbol) {
        let key = symbol.key();
        match self.by_key.get(&key) {
            Some(&slot) => self.symbols[slot] = symbol,
            None => {
                self.by_key.insert(key, self.symbols.len());
                self.symbols.push(symbol);
            }
        }
    }

    pub fn get(&self, key: &DeclKey) -> Option<&Symbol> {
        self.by_key.get(key).map(|&slot| &self.symbols[slot])
    }

    pub fn get_mut(&mut self, key: &DeclKey) -> Option<&mut Symbol> {
        self.by_key.get(key).map(|&slot| &mut self.symbols[slot])
    }

    pub fn function(&self, key: &DeclKey) -> Option<&Function> {
        self.get(key).and_then(Symbol::as_function)
    }

    pub fn function_mut(&mut self, key: &DeclKey) -> Option<&mut Function> {
        self.get_mut(key).and_then(Symbol::as_function_mut)
    }

    pub fn contains(&self, key: &DeclKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeclKey, &Symbol)> {
        self.symbols.iter().map(|s| (s.key(), s))
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Keys of the Function symbols, in document order.
    pub fn function_keys(&self) -> Vec<DeclKey> {
        self.symbols
            .iter()
            .filter(|s| matches!(s, Symbol::Function(_)))
            .map(Symbol::key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{CodeBlock, Variable};
    use crate::types::{Location, Position};

    const URI: &str = "file:///w/a.py";

    fn function(name: &str, line: u32, character: u32) -> Symbol {
        let loc = Location::new(URI, Position::new(line, character));
        let code = CodeBlock::new(URI, vec![format!("def {}():", name), "    pass".into()], line);
        Symbol::Function(Function::new(name, loc, Position::new(line + 1, 8), code))
    }

    fn variable(name: &str, line: u32) -> Symbol {
        Symbol::Variable(Variable {
            name: name.to_string(),
            location: Location::new(URI, Position::new(line, 0)),
        })
    }

    #[test]
    fn lookup_by_derived_key_returns_original() {
        let mut doc = Document::new(URI);
        doc.insert(function("load", 3, 4));
        doc.insert(variable("LIMIT", 0));
        doc.insert(function("save", 10, 4));

        for (line, character, name) in [(3, 4, "load"), (0, 0, "LIMIT"), (10, 4, "save")] {
            let key = DeclKey::new(URI, Position::new(line, character));
            assert_eq!(doc.get(&key).unwrap().name(), name);
        }
    }

    #[test]
    fn reinsert_is_idempotent() {
        let mut doc = Document::new(URI);
        doc.insert(function("load", 3, 4));
        doc.insert(function("load", 3, 4));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn function_keys_skip_variables_and_keep_order() {
        let mut doc = Document::new(URI);
        doc.insert(function("b", 5, 4));
        doc.insert(variable("X", 0));
        doc.insert(function("a", 1, 4));

        let keys: Vec<String> = doc.function_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec![format!("{}:5:4", URI), format!("{}:1:4", URI)]);
    }

    #[test]
    fn function_accessor_rejects_variables() {
        let mut doc = Document::new(URI);
        doc.insert(variable("X", 0));
        let key = DeclKey::new(URI, Position::new(0, 0));
        assert!(doc.get(&key).is_some());
        assert!(doc.function(&key).is_none());
    }
}
