//! Transports for MCP server communication.
//!
//! A transport moves JSON-RPC messages to and from one backend. Two kinds are
//! supported: a child process speaking newline-delimited JSON over
//! stdin/stdout, and an HTTP event stream (see [`crate::stream`]). Both share
//! the same request/response correlation through [`RequestTracker`].

use crate::config::{McpServerConfig, TransportDescriptor};
use crate::error::McpError;
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::stream::StreamTransport;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Boxed future returned by [`Transport`] operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, McpError>> + Send + 'a>>;

/// A bidirectional message endpoint to one backend.
///
/// Dyn-compatible so sessions can hold a `Box<dyn Transport>` regardless of
/// how the backend was reached.
pub trait Transport: Send + Sync {
    /// Send a request and wait (bounded) for its response.
    fn send_request<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> TransportFuture<'a, JsonRpcResponse>;

    /// Send a notification; no response is expected.
    fn send_notification<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> TransportFuture<'a, ()>;

    /// Release the underlying handle. Requests still waiting fail with
    /// [`McpError::Transport`]. Calling this more than once is a no-op.
    fn close(&self) -> TransportFuture<'_, ()>;

    fn is_closed(&self) -> bool;
}

/// Establish the transport described by `config`.
pub async fn establish(
    backend_id: &str,
    config: &McpServerConfig,
) -> Result<Box<dyn Transport>, McpError> {
    match &config.transport {
        TransportDescriptor::Process { command, args, env } => {
            let transport = StdioTransport::spawn(backend_id, command, args, env, config.timeout_ms)?;
            Ok(Box::new(transport))
        }
        TransportDescriptor::Stream { url } => {
            let transport = StreamTransport::connect(backend_id, url, config.timeout_ms).await?;
            Ok(Box::new(transport))
        }
    }
}

type PendingMap = HashMap<u64, oneshot::Sender<JsonRpcResponse>>;

/// Correlates outgoing request ids with incoming responses.
///
/// Once [`RequestTracker::fail_all`] has run, the tracker is closed: waiting
/// requests resolve to a transport error and new ones are refused.
pub(crate) struct RequestTracker {
    backend: String,
    timeout_ms: u64,
    next_id: AtomicU64,
    pending: Mutex<Option<PendingMap>>,
}

impl RequestTracker {
    pub(crate) fn new(backend: &str, timeout_ms: u64) -> Self {
        Self {
            backend: backend.to_string(),
            timeout_ms,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(Some(HashMap::new())),
        }
    }

    pub(crate) fn backend(&self) -> &str {
        &self.backend
    }

    pub(crate) fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub(crate) fn closed_error(&self, message: &str) -> McpError {
        McpError::Transport {
            backend: self.backend.clone(),
            message: message.to_string(),
        }
    }

    /// Allocate an id and register a slot for its response.
    pub(crate) async fn begin(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(u64, String, oneshot::Receiver<JsonRpcResponse>), McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let serialized = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().await;
        match pending.as_mut() {
            Some(map) => {
                map.insert(id, tx);
                Ok((id, serialized, rx))
            }
            None => Err(self.closed_error("transport is closed")),
        }
    }

    /// Forget a request whose message could not be sent.
    pub(crate) async fn abandon(&self, id: u64) {
        if let Some(map) = self.pending.lock().await.as_mut() {
            map.remove(&id);
        }
    }

    /// Wait for the response to `id`, bounded by the transport timeout.
    pub(crate) async fn wait(
        &self,
        id: u64,
        method: &str,
        rx: oneshot::Receiver<JsonRpcResponse>,
    ) -> Result<JsonRpcResponse, McpError> {
        match tokio::time::timeout(Duration::from_millis(self.timeout_ms), rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(self.closed_error(&format!(
                "connection closed while waiting for {method}"
            ))),
            Err(_) => {
                self.abandon(id).await;
                Err(McpError::Timeout {
                    name: method.to_string(),
                    timeout_ms: self.timeout_ms,
                })
            }
        }
    }

    /// Route one incoming JSON message to whoever is waiting for it.
    ///
    /// Server-initiated requests and notifications carry a `method` and are
    /// ignored.
    pub(crate) async fn dispatch(&self, raw: &str) {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(backend = %self.backend, "Failed to parse MCP message: {e}: {raw}");
                return;
            }
        };
        if value.get("method").is_some() {
            tracing::debug!(backend = %self.backend, "Ignoring server-initiated message");
            return;
        }
        let resp: JsonRpcResponse = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(backend = %self.backend, "Malformed MCP response: {e}");
                return;
            }
        };
        let Some(id) = resp.id else {
            return;
        };
        let sender = self.pending.lock().await.as_mut().and_then(|map| map.remove(&id));
        match sender {
            Some(tx) => {
                let _ = tx.send(resp);
            }
            None => tracing::debug!(backend = %self.backend, id, "Response for unknown request id"),
        }
    }

    /// Close the tracker, failing every request still waiting.
    pub(crate) async fn fail_all(&self) {
        let dropped = self.pending.lock().await.take();
        if let Some(map) = dropped {
            if !map.is_empty() {
                tracing::debug!(
                    backend = %self.backend,
                    "Failing {} in-flight MCP request(s)",
                    map.len()
                );
            }
        }
    }
}

/// Async stdio transport for communicating with an MCP server process.
pub struct StdioTransport {
    tracker: std::sync::Arc<RequestTracker>,
    write_tx: mpsc::Sender<String>,
    child: Mutex<Option<Child>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Spawn a child process and start background reader/writer tasks.
    ///
    /// The child inherits this process's environment with `env` layered on top.
    pub fn spawn(
        backend_id: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout_ms: u64,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: command.to_string(),
            source: e,
        })?;

        let missing_pipe = |pipe: &str| McpError::Connection {
            backend: backend_id.to_string(),
            message: format!("child process has no {pipe}"),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;

        let tracker = std::sync::Arc::new(RequestTracker::new(backend_id, timeout_ms));
        let cancel = CancellationToken::new();

        // Writer: drains the channel into the child's stdin. Exiting drops
        // stdin, which the child sees as EOF.
        let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut stdin = stdin;
            loop {
                let msg = tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    msg = write_rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                if stdin.write_all(msg.as_bytes()).await.is_err()
                    || stdin.write_all(b"\n").await.is_err()
                    || stdin.flush().await.is_err()
                {
                    break;
                }
            }
        });

        // Reader: one JSON message per line. EOF fails whatever is in flight.
        let reader_tracker = std::sync::Arc::clone(&tracker);
        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => line,
                        Ok(None) | Err(_) => break,
                    },
                };
                if line.trim().is_empty() {
                    continue;
                }
                reader_tracker.dispatch(&line).await;
            }
            reader_tracker.fail_all().await;
        });

        tracing::debug!(backend = backend_id, command, "Spawned MCP server process");

        Ok(Self {
            tracker,
            write_tx,
            child: Mutex::new(Some(child)),
            cancel,
            closed: AtomicBool::new(false),
        })
    }

    async fn write(&self, message: String) -> Result<(), McpError> {
        self.write_tx
            .send(message)
            .await
            .map_err(|_| self.tracker.closed_error("writer channel closed"))
    }
}

impl Transport for StdioTransport {
    fn send_request<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> TransportFuture<'a, JsonRpcResponse> {
        Box::pin(async move {
            let (id, serialized, rx) = self.tracker.begin(method, params).await?;
            if let Err(e) = self.write(serialized).await {
                self.tracker.abandon(id).await;
                return Err(e);
            }
            self.tracker.wait(id, method, rx).await
        })
    }

    fn send_notification<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(self.tracker.closed_error("transport is closed"));
            }
            let serialized = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
            self.write(serialized).await
        })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }

            self.cancel.cancel();
            self.tracker.fail_all().await;

            let Some(mut child) = self.child.lock().await.take() else {
                return Ok(());
            };

            // Give the child 5 seconds to exit on stdin EOF, then kill it.
            let graceful =
                tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
            if graceful.is_err() {
                tracing::debug!(backend = %self.tracker.backend(), "MCP server did not exit, killing");
                child.kill().await?;
            }
            Ok(())
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
