//! Language server transport: spawns the server and exchanges framed JSON-RPC
//! messages over its stdio.
//!
//! - Requests carry a strictly increasing integer id
//! - A dedicated thread reads stdout and forwards decoded messages over a
//!   channel, so a request can give up after its timeout
//! - Another thread drains stderr into the log
//! - Notifications and server requests seen while waiting are logged or
//!   answered, never returned as responses
//! - `shutdown` is idempotent and also runs on drop

use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use deeprepo_core::text::{path_to_uri, read_uri, uri_to_path};
use deeprepo_core::types::{Location, Position};

use super::framing::{self, ReadOutcome};
use super::profile::LanguageProfile;
use super::protocol::{
    self, hover_text, DefinitionResponse, DocumentSymbolResponse, Incoming, LspLocation, Response,
};
use super::LanguageServer;

// ============================================================================
// Constants
// ============================================================================

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default handshake timeout. Servers index the workspace before answering.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default wait between `exit` and killing the process.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Target for re-emitted server stderr lines.
pub const STDERR_TARGET: &str = "deeprepo::lsp::stderr";

// ============================================================================
// Error Types
// ============================================================================

/// Fatal transport failures. Timeouts on ordinary requests are not errors.
#[derive(Debug, Error)]
pub enum LspError {
    /// Server process failed to start.
    #[error("failed to spawn language server: {reason}")]
    SpawnFailed { reason: String },

    /// No answer to `initialize` within the handshake timeout.
    #[error("language server did not complete the handshake within {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    /// The server answered `initialize` with an error.
    #[error("language server rejected initialize: {reason}")]
    HandshakeFailed { reason: String },

    /// The server's stdout closed.
    #[error("language server exited: {reason}")]
    ServerExited { reason: String },

    /// Writing to the server's stdin failed.
    #[error("broken pipe to language server: {reason}")]
    BrokenPipe { reason: String },

    /// The client was shut down, or never connected.
    #[error("language server is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for transport operations.
pub type LspResult<T> = Result<T, LspError>;

// ============================================================================
// Options
// ============================================================================

/// Timeouts for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub request_timeout: Duration,
    pub init_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            init_timeout: DEFAULT_INIT_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

// ============================================================================
// Reader Thread
// ============================================================================

/// What the stdout thread hands to the waiting caller.
enum ReaderEvent {
    Message(Value),
    Closed(Option<String>),
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: R,
    tx: Sender<ReaderEvent>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("lsp-stdout".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            loop {
                let event = match framing::read_message(&mut reader) {
                    Ok(ReadOutcome::Message(body)) => match serde_json::from_slice::<Value>(&body) {
                        Ok(value) => ReaderEvent::Message(value),
                        Err(e) => {
                            warn!(error = %e, "discarding undecodable message from server");
                            continue;
                        }
                    },
                    Ok(ReadOutcome::Skipped) => {
                        warn!("skipping frame without Content-Length");
                        continue;
                    }
                    Ok(ReadOutcome::Eof) => {
                        let _ = tx.send(ReaderEvent::Closed(None));
                        break;
                    }
                    Err(e) => {
                        let _ = tx.send(ReaderEvent::Closed(Some(e.to_string())));
                        break;
                    }
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        })
}

fn spawn_stderr_drain<R: Read + Send + 'static>(stream: R) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("lsp-stderr".to_string())
        .spawn(move || {
            for line in BufReader::new(stream).lines() {
                match line {
                    Ok(line) => debug!(target: STDERR_TARGET, "{}", line.trim_end()),
                    Err(_) => break,
                }
            }
        })
}

/// Kill and reap a server that will never be handed to a client.
fn abandon(child: &mut Child, err: LspError) -> LspError {
    warn!(pid = child.id(), error = %err, "killing language server after failed start");
    let _ = child.kill();
    let _ = child.wait();
    err
}

// ============================================================================
// Client
// ============================================================================

/// Connection to one language server process.
pub struct LspClient {
    /// Server process. `None` for stream-backed clients.
    child: Option<Child>,
    /// Server stdin.
    writer: Option<Box<dyn Write + Send>>,
    /// Messages from the stdout thread.
    incoming: Option<Receiver<ReaderEvent>>,
    threads: Vec<JoinHandle<()>>,
    /// Next request ID (monotonically increasing).
    next_request_id: AtomicU64,
    root_uri: String,
    profile: LanguageProfile,
    options: ClientOptions,
    /// URIs already announced with `didOpen`.
    opened: HashSet<String>,
    initialized: bool,
    closed: bool,
}

impl LspClient {
    /// Spawn the server, run the handshake, and return a ready client.
    ///
    /// `command` is the program followed by its arguments. The program is
    /// resolved on `PATH` before spawning.
    pub fn start(
        command: &[String],
        root: &Path,
        profile: &LanguageProfile,
        options: ClientOptions,
    ) -> LspResult<Self> {
        let (program, args) = command.split_first().ok_or_else(|| LspError::SpawnFailed {
            reason: "empty server command".to_string(),
        })?;
        let resolved = which::which(program).map_err(|e| LspError::SpawnFailed {
            reason: format!("{}: {}", program, e),
        })?;

        let mut child = Command::new(&resolved)
            .args(args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LspError::SpawnFailed {
                reason: e.to_string(),
            })?;
        info!(program = %resolved.display(), pid = child.id(), "language server started");

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let err = LspError::SpawnFailed {
                reason: "failed to capture server stdio".to_string(),
            };
            return Err(abandon(&mut child, err));
        };
        let drain = match spawn_stderr_drain(stderr) {
            Ok(handle) => handle,
            Err(e) => return Err(abandon(&mut child, e.into())),
        };
        let mut client = match Self::from_streams(stdout, stdin, path_to_uri(root), profile, options) {
            Ok(client) => client,
            Err(e) => return Err(abandon(&mut child, e)),
        };
        client.threads.push(drain);
        client.child = Some(child);
        client.initialize()?;
        Ok(client)
    }

    /// Build a client over arbitrary streams. No handshake is performed.
    pub fn from_streams<R, W>(
        reader: R,
        writer: W,
        root_uri: impl Into<String>,
        profile: &LanguageProfile,
        options: ClientOptions,
    ) -> LspResult<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let reader_thread = spawn_reader(reader, tx)?;
        Ok(LspClient {
            child: None,
            writer: Some(Box::new(writer)),
            incoming: Some(rx),
            threads: vec![reader_thread],
            next_request_id: AtomicU64::new(1),
            root_uri: root_uri.into(),
            profile: profile.clone(),
            options,
            opened: HashSet::new(),
            initialized: false,
            closed: false,
        })
    }

    pub fn root_uri(&self) -> &str {
        &self.root_uri
    }

    pub fn profile(&self) -> &LanguageProfile {
        &self.profile
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the connection is still usable.
    pub fn is_running(&self) -> bool {
        !self.closed && self.writer.is_some() && self.incoming.is_some()
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// `initialize` then `initialized`.
    ///
    /// Diagnostics are not advertised, which keeps servers from pushing
    /// `publishDiagnostics` for every opened file.
    pub fn initialize(&mut self) -> LspResult<()> {
        if self.initialized {
            return Ok(());
        }

        let name = uri_to_path(&self.root_uri)
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "workspace".to_string());
        let params = json!({
            "processId": std::process::id(),
            "rootUri": self.root_uri,
            "workspaceFolders": [{"uri": self.root_uri, "name": name}],
            "capabilities": {
                "textDocument": {
                    "synchronization": {"didSave": false, "willSave": false},
                    "documentSymbol": {"hierarchicalDocumentSymbolSupport": true},
                    "definition": {"linkSupport": true},
                    "hover": {"contentFormat": ["plaintext", "markdown"]},
                    "references": {}
                },
                "workspace": {"configuration": true, "workspaceFolders": true}
            },
            "initializationOptions": {}
        });

        let timeout = self.options.init_timeout;
        let response = self
            .request_with_timeout("initialize", params, timeout)?
            .ok_or(LspError::HandshakeTimeout {
                timeout_ms: timeout.as_millis() as u64,
            })?;
        if let Some(err) = response.error {
            return Err(LspError::HandshakeFailed {
                reason: format!("{} ({})", err.message, err.code),
            });
        }

        self.notify("initialized", json!({}))?;
        self.initialized = true;
        info!(root = %self.root_uri, "language server handshake complete");
        Ok(())
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// Send a request and wait for its response with the default timeout.
    ///
    /// Returns `Ok(None)` on timeout.
    pub fn request(&mut self, method: &str, params: Value) -> LspResult<Option<Response>> {
        let timeout = self.options.request_timeout;
        self.request_with_timeout(method, params, timeout)
    }

    pub fn request_with_timeout(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> LspResult<Option<Response>> {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        self.send(&protocol::request(id, method, params))?;
        debug!(id, method, "request sent");
        self.wait_for(id, method, timeout)
    }

    /// Send a notification. No response is expected.
    pub fn notify(&mut self, method: &str, params: Value) -> LspResult<()> {
        self.send(&protocol::notification(method, params))?;
        debug!(method, "notification sent");
        Ok(())
    }

    fn send(&mut self, message: &Value) -> LspResult<()> {
        if self.closed {
            return Err(LspError::NotRunning);
        }
        let result = {
            let writer = self.writer.as_mut().ok_or(LspError::NotRunning)?;
            framing::write_message(writer, message)
        };
        if let Err(e) = result {
            self.mark_exited();
            return Err(LspError::BrokenPipe {
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    fn wait_for(&mut self, id: u64, method: &str, timeout: Duration) -> LspResult<Option<Response>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(id, method, "request timed out");
                return Ok(None);
            }

            let event = {
                let rx = self.incoming.as_ref().ok_or(LspError::NotRunning)?;
                rx.recv_timeout(remaining)
            };
            let value = match event {
                Ok(ReaderEvent::Message(value)) => value,
                Ok(ReaderEvent::Closed(reason)) => {
                    self.mark_exited();
                    return Err(LspError::ServerExited {
                        reason: reason.unwrap_or_else(|| "stdout closed".to_string()),
                    });
                }
                Err(RecvTimeoutError::Timeout) => {
                    debug!(id, method, "request timed out");
                    return Ok(None);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.mark_exited();
                    return Err(LspError::ServerExited {
                        reason: "reader stopped".to_string(),
                    });
                }
            };

            match Incoming::from_value(value) {
                Some(Incoming::Response(response)) if response.id == id => return Ok(Some(response)),
                Some(Incoming::Response(response)) => {
                    debug!(expected = id, got = response.id, "discarding stale response");
                }
                Some(Incoming::Request { id: req_id, method: req_method, params }) => {
                    self.answer_server_request(req_id, &req_method, &params);
                }
                Some(Incoming::Notification { method: note, .. }) => {
                    debug!(method = %note, "notification ignored");
                }
                None => warn!("discarding message that is not JSON-RPC"),
            }
        }
    }

    /// Reply to a request initiated by the server with a neutral result.
    fn answer_server_request(&mut self, id: Value, method: &str, params: &Value) {
        let result = match method {
            "workspace/configuration" => {
                let n = params
                    .get("items")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                Value::Array(vec![Value::Null; n])
            }
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create" => Value::Null,
            other => {
                warn!(method = other, "answering unsupported server request with null");
                Value::Null
            }
        };
        if let Err(e) = self.send(&protocol::response(id, result)) {
            warn!(error = %e, method, "failed to answer server request");
        }
    }

    fn mark_exited(&mut self) {
        if !self.closed {
            warn!("language server connection lost");
        }
        self.writer = None;
        self.incoming = None;
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Announce a document once per client.
    ///
    /// If the file cannot be read the announcement is skipped and the server
    /// falls back to reading it from disk.
    pub fn did_open(&mut self, uri: &str) -> LspResult<()> {
        if self.opened.contains(uri) {
            return Ok(());
        }
        let text = match read_uri(uri) {
            Ok(text) => text,
            Err(e) => {
                debug!(uri, error = %e, "not opening unreadable document");
                return Ok(());
            }
        };
        let params = json!({
            "textDocument": {
                "uri": uri,
                "languageId": self.profile.language_id,
                "version": 1,
                "text": text,
            }
        });
        self.notify("textDocument/didOpen", params)?;
        self.opened.insert(uri.to_string());
        Ok(())
    }

    fn text_document_query(
        &mut self,
        method: &str,
        uri: &str,
        position: Option<Position>,
        extra: Option<(&str, Value)>,
    ) -> LspResult<Option<Value>> {
        self.did_open(uri)?;
        let mut params = json!({"textDocument": {"uri": uri}});
        if let Some(pos) = position {
            params["position"] = json!(pos);
        }
        if let Some((key, value)) = extra {
            params[key] = value;
        }
        let response = self.request(method, params)?;
        Ok(response.and_then(|r| {
            if let Some(err) = &r.error {
                debug!(method, uri, code = err.code, message = %err.message, "server returned error");
            }
            r.into_result()
        }))
    }

    /// Symbols declared in a document. `None` on timeout or empty result.
    pub fn document_symbols(&mut self, uri: &str) -> LspResult<Option<DocumentSymbolResponse>> {
        let result = self.text_document_query("textDocument/documentSymbol", uri, None, None)?;
        Ok(result.and_then(|v| match serde_json::from_value(v) {
            Ok(symbols) => Some(symbols),
            Err(e) => {
                warn!(uri, error = %e, "unrecognized documentSymbol result");
                None
            }
        }))
    }

    /// Where the symbol at `position` is defined.
    pub fn definition(&mut self, uri: &str, position: Position) -> LspResult<Option<Location>> {
        let result = self.text_document_query("textDocument/definition", uri, Some(position), None)?;
        Ok(result
            .and_then(DefinitionResponse::from_value)
            .and_then(|d| d.first()))
    }

    /// Hover text at `position`.
    pub fn hover(&mut self, uri: &str, position: Position) -> LspResult<Option<String>> {
        let result = self.text_document_query("textDocument/hover", uri, Some(position), None)?;
        Ok(result.as_ref().and_then(hover_text))
    }

    /// All references to the symbol at `position`, declaration included.
    pub fn references(&mut self, uri: &str, position: Position) -> LspResult<Vec<Location>> {
        let result = self.text_document_query(
            "textDocument/references",
            uri,
            Some(position),
            Some(("context", json!({"includeDeclaration": true}))),
        )?;
        let locations: Vec<LspLocation> = match result {
            Some(v) => serde_json::from_value(v).unwrap_or_default(),
            None => Vec::new(),
        };
        Ok(locations.iter().map(LspLocation::start).collect())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Graceful shutdown: `shutdown`, `exit`, wait, then kill.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) -> LspResult<()> {
        if self.closed {
            return Ok(());
        }

        if self.is_running() {
            let grace = self.options.shutdown_grace;
            match self.request_with_timeout("shutdown", Value::Null, grace) {
                Ok(Some(_)) => {}
                Ok(None) => debug!("no answer to shutdown request"),
                Err(e) => debug!(error = %e, "shutdown request failed"),
            }
            if self.is_running() {
                let _ = self.notify("exit", Value::Null);
            }
        }
        self.closed = true;
        self.writer = None;
        self.incoming = None;

        if let Some(mut child) = self.child.take() {
            match child.wait_timeout(self.options.shutdown_grace) {
                Ok(Some(status)) => debug!(%status, "language server exited"),
                Ok(None) => {
                    warn!("language server did not exit in time, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                }
                Err(e) => {
                    warn!(error = %e, "failed to wait for language server, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                }
            }
        }

        for handle in self.threads.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
        info!("language server shut down");
        Ok(())
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        // Best-effort shutdown on drop
        let _ = self.shutdown();
    }
}

impl LanguageServer for LspClient {
    type Error = LspError;

    fn document_symbols(&mut self, uri: &str) -> LspResult<Option<DocumentSymbolResponse>> {
        LspClient::document_symbols(self, uri)
    }

    fn definition(&mut self, uri: &str, position: Position) -> LspResult<Option<Location>> {
        LspClient::definition(self, uri, position)
    }
}
