//! In-process fake language server for transport tests.
//!
//! Bytes travel over channel-backed pipes, so the client's reader thread and
//! the fake server run exactly as they would against a real process.

use std::io::{self, BufReader, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use serde_json::{json, Value};

use super::framing::{self, ReadOutcome};

/// Write half of a pipe.
pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read half of a pipe. Reads block until data arrives; EOF once every
/// writer is gone.
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.offset);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel();
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            pending: Vec::new(),
            offset: 0,
        },
    )
}

/// What the fake server does in response to one client message.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Send a framed JSON message.
    Json(Value),
    /// Send raw bytes.
    Raw(Vec<u8>),
    /// Suppress the default answer for this request.
    Silence,
    /// Hang up.
    Close,
}

/// Handle to the fake server thread.
pub struct FakeServer {
    handle: JoinHandle<Vec<Value>>,
}

impl FakeServer {
    /// Wait for the server to stop and return every message the client sent.
    ///
    /// The server stops on `exit`, on [`Reply::Close`], or when the client
    /// drops its end.
    pub fn finish(self) -> Vec<Value> {
        self.handle.join().unwrap_or_default()
    }
}

fn default_result(method: &str) -> Option<Value> {
    match method {
        "initialize" => Some(json!({"capabilities": {}})),
        "shutdown" => Some(Value::Null),
        _ => None,
    }
}

/// Start a fake server.
///
/// `handler` sees every message from the client. When it returns no replies
/// for `initialize` or `shutdown`, a default success is sent. Returns the
/// client's read end, the client's write end, and the server handle.
pub fn spawn_fake_server<F>(mut handler: F) -> (PipeReader, PipeWriter, FakeServer)
where
    F: FnMut(&Value) -> Vec<Reply> + Send + 'static,
{
    let (client_writer, server_reader) = pipe();
    let (mut server_writer, client_reader) = pipe();

    let handle = thread::spawn(move || {
        let mut reader = BufReader::new(server_reader);
        let mut log = Vec::new();

        loop {
            let body = match framing::read_message(&mut reader) {
                Ok(ReadOutcome::Message(body)) => body,
                Ok(ReadOutcome::Skipped) => continue,
                Ok(ReadOutcome::Eof) | Err(_) => break,
            };
            let Ok(msg) = serde_json::from_slice::<Value>(&body) else {
                continue;
            };
            let method = msg.get("method").and_then(Value::as_str).map(str::to_string);
            let is_request = method.is_some() && msg.get("id").is_some();

            let mut replies = handler(&msg);
            if replies.is_empty() && is_request {
                if let Some(result) = method.as_deref().and_then(default_result) {
                    replies.push(Reply::Json(json!({
                        "jsonrpc": "2.0",
                        "id": msg["id"].clone(),
                        "result": result,
                    })));
                }
            }
            log.push(msg);

            let mut hang_up = false;
            for reply in replies {
                let sent = match reply {
                    Reply::Json(value) => framing::write_message(&mut server_writer, &value),
                    Reply::Raw(bytes) => server_writer.write_all(&bytes),
                    Reply::Silence => Ok(()),
                    Reply::Close => {
                        hang_up = true;
                        break;
                    }
                };
                if sent.is_err() {
                    hang_up = true;
                    break;
                }
            }
            if hang_up || method.as_deref() == Some("exit") {
                break;
            }
        }
        log
    });

    (client_reader, client_writer, FakeServer { handle })
}
