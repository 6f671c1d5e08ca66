//! Per-language lexical rules and server launch settings.

use std::collections::HashSet;

use deeprepo_core::text::{expand_tabs, find_utf16};
use deeprepo_core::types::Position;

/// How far around the reported line [`LanguageProfile::locate`] searches.
const LOCATE_WINDOW: u32 = 5;

/// Lexical and launch settings for one language.
#[derive(Debug, Clone)]
pub struct LanguageProfile {
    /// `languageId` sent in `didOpen`.
    pub language_id: String,
    /// Default launch command, program first.
    pub server_command: Vec<String>,
    /// File extensions the server handles, with the leading dot.
    pub extensions: Vec<String>,
    /// Characters that end a candidate word.
    pub separators: HashSet<char>,
    /// Words never emitted as candidates.
    pub reserved: HashSet<String>,
    pub inline_comment: Option<String>,
    pub block_comment: Option<(String, String)>,
    /// `(open, close)` pairs. Matched longest opener first.
    pub string_delimiters: Vec<(String, String)>,
    /// Skips the following character inside a string.
    pub escape: Option<char>,
    pub tab_width: usize,
}

const PY_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield", "match", "case", "type", "_",
];

const PY_EXTRA: &[&str] = &["self", "cls", "setter", "getter", "+", "-"];

const PY_BUILTINS: &[&str] = &[
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool", "breakpoint", "bytearray",
    "bytes", "callable", "chr", "classmethod", "compile", "complex", "delattr", "dict", "dir",
    "divmod", "enumerate", "eval", "exec", "filter", "float", "format", "frozenset", "getattr",
    "globals", "hasattr", "hash", "help", "hex", "id", "input", "int", "isinstance",
    "issubclass", "iter", "len", "list", "locals", "map", "max", "memoryview", "min", "next",
    "object", "oct", "open", "ord", "pow", "print", "property", "range", "repr", "reversed",
    "round", "set", "setattr", "slice", "sorted", "staticmethod", "str", "sum", "super",
    "tuple", "vars", "zip", "__import__", "__name__", "__file__", "__doc__", "__init__",
    "NotImplemented", "Ellipsis", "BaseException", "Exception", "ArithmeticError",
    "AssertionError", "AttributeError", "EOFError", "ImportError", "IndexError", "KeyError",
    "KeyboardInterrupt", "LookupError", "MemoryError", "ModuleNotFoundError", "NameError",
    "NotImplementedError", "OSError", "OverflowError", "RecursionError", "RuntimeError",
    "StopIteration", "StopAsyncIteration", "SyntaxError", "SystemExit", "TimeoutError",
    "TypeError", "UnicodeDecodeError", "UnicodeEncodeError", "ValueError", "ZeroDivisionError",
    "FileNotFoundError", "FileExistsError", "PermissionError", "ConnectionError",
    "DeprecationWarning", "UserWarning", "Warning",
];

const PY_TYPING: &[&str] = &[
    "Any", "AnyStr", "Callable", "ClassVar", "Dict", "Final", "FrozenSet", "Generator",
    "Generic", "Iterable", "Iterator", "List", "Literal", "Mapping", "NamedTuple", "NoReturn",
    "Optional", "Protocol", "Sequence", "Set", "Tuple", "Type", "TypeVar", "TypedDict",
    "Union", "Awaitable", "Coroutine", "AsyncIterator", "AsyncGenerator", "cast", "overload",
    "TYPE_CHECKING", "typing", "Self", "ParamSpec", "Annotated",
];

impl LanguageProfile {
    /// Built-in profile for Python served by pyright.
    pub fn python() -> Self {
        let reserved = PY_KEYWORDS
            .iter()
            .chain(PY_EXTRA)
            .chain(PY_BUILTINS)
            .chain(PY_TYPING)
            .map(|s| s.to_string())
            .collect();

        LanguageProfile {
            language_id: "python".to_string(),
            server_command: vec!["pyright-langserver".to_string(), "--stdio".to_string()],
            extensions: vec![".py".to_string(), ".pyi".to_string()],
            separators: " \n\t.,!?;(){}[]<>:'\"#*/=@+-%&|^~\\".chars().collect(),
            reserved,
            inline_comment: Some("#".to_string()),
            block_comment: Some(("\"\"\"".to_string(), "\"\"\"".to_string())),
            string_delimiters: vec![
                ("'''".to_string(), "'''".to_string()),
                ("\"".to_string(), "\"".to_string()),
                ("'".to_string(), "'".to_string()),
            ],
            escape: Some('\\'),
            tab_width: 4,
        }
    }

    /// Look up a built-in profile by language name.
    pub fn for_language(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "python" | "py" => Some(Self::python()),
            _ => None,
        }
    }

    pub fn is_separator(&self, ch: char) -> bool {
        self.separators.contains(&ch)
    }

    pub fn is_reserved(&self, word: &str) -> bool {
        self.reserved.contains(word)
    }

    /// Refine an approximate position to the column where `keyword` starts.
    ///
    /// Candidate lines are tried in order: `line`, `line - 1`, then every
    /// line within five of `line`, top to bottom. Lines are tab-expanded
    /// before searching. If nothing matches, the result is
    /// `(line - 1, character - 1)` clamped to the file.
    pub fn locate<S: AsRef<str>>(&self, lines: &[S], line: u32, character: u32, keyword: &str) -> Position {
        let last = lines.len().saturating_sub(1) as u32;
        let clamp = |idx: i64| -> u32 { idx.clamp(0, last as i64) as u32 };

        let line_i = line as i64;
        let mut candidates = vec![clamp(line_i), clamp(line_i - 1)];
        let window = LOCATE_WINDOW as i64;
        let mut nearby: Vec<u32> = (line_i - window..=line_i + window).map(clamp).collect();
        nearby.dedup();
        candidates.extend(nearby);

        for idx in candidates {
            let Some(text) = lines.get(idx as usize) else {
                continue;
            };
            let expanded = expand_tabs(text.as_ref(), self.tab_width);
            if let Some(col) = find_utf16(&expanded, keyword, 0) {
                return Position::new(idx, col);
            }
        }

        Position::new(clamp(line_i - 1), character.saturating_sub(1))
    }
}
