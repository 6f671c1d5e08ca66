//! Text utilities: tab expansion, column arithmetic, file URIs, line ranges.
//!
//! ## Coordinate Conventions
//!
//! - Lines and columns are **0-indexed** (language server convention)
//! - Columns are counted in **UTF-16 code units**, which is what servers
//!   assume unless another position encoding is negotiated
//! - Tabs are expanded to the next multiple of the configured width before
//!   any column is computed

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped in the path part of a `file://` URI.
const PATH_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const FILE_SCHEME: &str = "file://";

// ============================================================================
// Tabs and Columns
// ============================================================================

/// Expand tabs to the next multiple of `width`.
///
/// A width of `0` leaves the line untouched.
pub fn expand_tabs(line: &str, width: usize) -> String {
    if width == 0 || !line.contains('\t') {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + 8);
    let mut col = 0usize;
    for ch in line.chars() {
        if ch == '\t' {
            let pad = width - (col % width);
            out.extend(std::iter::repeat(' ').take(pad));
            col += pad;
        } else {
            out.push(ch);
            col += 1;
        }
    }
    out
}

/// Find `needle` in `line` at or after UTF-16 column `from`, returning the
/// UTF-16 column of the match.
pub fn find_utf16(line: &str, needle: &str, from: u32) -> Option<u32> {
    if needle.is_empty() {
        return None;
    }
    let mut col = 0u32;
    for (byte_idx, ch) in line.char_indices() {
        if col >= from && line[byte_idx..].starts_with(needle) {
            return Some(col);
        }
        col += ch.len_utf16() as u32;
    }
    None
}

// ============================================================================
// File URIs
// ============================================================================

/// Convert a filesystem path into a `file://` URI.
///
/// Relative paths are resolved against the current directory first.
pub fn path_to_uri(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    encode_path(&absolute.to_string_lossy())
}

/// Canonical URI for a decoded path string. Drive letters are lowercased,
/// matching what servers built on `vscode-uri` produce.
fn encode_path(decoded: &str) -> String {
    let mut raw = decoded.replace('\\', "/");
    if !raw.starts_with('/') {
        raw.insert(0, '/');
    }
    let bytes = raw.as_bytes();
    if bytes.len() >= 3 && bytes[2] == b':' && bytes[1].is_ascii_alphabetic() {
        let letter = (bytes[1] as char).to_ascii_lowercase();
        raw.replace_range(1..2, &letter.to_string());
    }
    format!("{}{}", FILE_SCHEME, utf8_percent_encode(&raw, PATH_ESCAPE))
}

/// Convert a `file://` URI back into a path. Returns `None` for other schemes.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix(FILE_SCHEME)?;
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    let decoded = percent_decode_str(rest).decode_utf8().ok()?;

    // `/C:/x` on Windows-style URIs
    let bytes = decoded.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'/' && bytes[2] == b':' && bytes[1].is_ascii_alphabetic() {
        return Some(PathBuf::from(&decoded[1..]));
    }
    Some(PathBuf::from(decoded.as_ref()))
}

/// Accept either a path or a `file://` URI and return the canonical URI.
///
/// Percent-escapes are decoded and re-applied with one escape set, so two
/// spellings of the same file (`c++` and `c%2B%2B`, `C:` and `c%3A`) map to
/// the same string.
pub fn normalize_uri(path_or_uri: &str) -> String {
    let Some(rest) = path_or_uri.strip_prefix(FILE_SCHEME) else {
        return path_to_uri(Path::new(path_or_uri));
    };
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    match percent_decode_str(rest).decode_utf8() {
        Ok(decoded) => encode_path(&decoded),
        Err(_) => path_or_uri.to_string(),
    }
}

// ============================================================================
// Line Ranges
// ============================================================================

/// Read lines `start..=end` (0-indexed, inclusive) from a file.
///
/// Line terminators are stripped. A range running past the end of the file
/// is truncated to the lines that exist.
pub fn read_line_range(path: &Path, start: u32, end: u32) -> io::Result<Vec<String>> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let idx = idx as u32;
        if idx > end {
            break;
        }
        let line = line?;
        if idx >= start {
            lines.push(line.trim_end_matches('\r').to_string());
        }
    }

    Ok(lines)
}

/// Read an entire file addressed by a `file://` URI.
pub fn read_uri(uri: &str) -> io::Result<String> {
    let path = uri_to_path(uri).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file URI: {}", uri),
        )
    })?;
    fs::read_to_string(path)
}

// ============================================================================
// Tests
// ============================================================================
