//! `Content-Length` framing for the language server's stdio streams.
//!
//! Wire format:
//!
//! ```text
//! Content-Length: <N>\r\n
//! [other headers]\r\n
//! \r\n
//! <N bytes of JSON>
//! ```
//!
//! The length counts **bytes**, not characters. Header names are matched
//! case-insensitively and a bare `\n` line ending is accepted.

use std::io::{self, BufRead, Read, Write};

/// Largest body we are willing to buffer.
pub const MAX_MESSAGE_BYTES: usize = if cfg!(test) { 4096 } else { 64 * 1024 * 1024 };

/// Longest header line accepted before the stream is declared corrupt.
const MAX_HEADER_LINE: usize = 8192;

const CONTENT_LENGTH: &[u8] = b"content-length:";

/// Result of one [`read_message`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete body.
    Message(Vec<u8>),
    /// A header block without a usable `Content-Length` (missing or zero).
    /// Nothing was consumed past the blank line.
    Skipped,
    /// The stream ended.
    Eof,
}

/// Frame a body with its header.
pub fn encode_message(body: &[u8]) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(body);
    out
}

/// Serialize `value` and write it as one framed message.
pub fn write_message<W: Write>(writer: &mut W, value: &serde_json::Value) -> io::Result<()> {
    let body = serde_json::to_vec(value)?;
    writer.write_all(&encode_message(&body))?;
    writer.flush()
}

/// Parse a `Content-Length` header line.
///
/// The header name may be preceded by stray bytes left over from a skipped
/// frame; the last occurrence on the line wins.
fn parse_content_length(line: &[u8]) -> Option<usize> {
    if line.len() < CONTENT_LENGTH.len() {
        return None;
    }
    let start = (0..=line.len() - CONTENT_LENGTH.len())
        .rev()
        .find(|&i| line[i..i + CONTENT_LENGTH.len()].eq_ignore_ascii_case(CONTENT_LENGTH))?;
    let value = std::str::from_utf8(&line[start + CONTENT_LENGTH.len()..]).ok()?;
    value.trim().parse().ok()
}

/// Read one framed message.
///
/// Consumes exactly the declared number of body bytes. A header block with no
/// length, or a length of zero, yields [`ReadOutcome::Skipped`] so the caller's
/// loop can carry on. Oversized bodies and overlong header lines are
/// `InvalidData` errors: after either, the stream position is unknown.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<ReadOutcome> {
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    let mut line = Vec::with_capacity(64);

    loop {
        line.clear();
        let n = Read::take(&mut *reader, MAX_HEADER_LINE as u64 + 1).read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(ReadOutcome::Eof);
        }
        if line.len() > MAX_HEADER_LINE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("header line exceeds {} bytes", MAX_HEADER_LINE),
            ));
        }

        let trimmed: &[u8] = {
            let mut end = line.len();
            while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
                end -= 1;
            }
            &line[..end]
        };

        if trimmed.is_empty() {
            if saw_header {
                break;
            }
            // Blank lines between frames.
            continue;
        }

        saw_header = true;
        if let Some(len) = parse_content_length(trimmed) {
            content_length = Some(len);
        }
    }

    let len = match content_length {
        Some(0) | None => return Ok(ReadOutcome::Skipped),
        Some(len) => len,
    };
    if len > MAX_MESSAGE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Content-Length {} exceeds maximum supported message size {}",
                len, MAX_MESSAGE_BYTES
            ),
        ));
    }

    let mut body = vec![0u8; len];
    match reader.read_exact(&mut body) {
        Ok(()) => Ok(ReadOutcome::Message(body)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(ReadOutcome::Eof),
        Err(e) => Err(e),
    }
}
