//! HTTP event-stream transport.
//!
//! The client opens `GET <url>` as a Server-Sent Events stream. The server's
//! first `endpoint` event names the URL that requests are POSTed to; replies
//! come back as `message` events on the stream.

use crate::error::McpError;
use crate::jsonrpc::{JsonRpcNotification, JsonRpcResponse};
use crate::sse::SseParser;
use crate::transport::{RequestTracker, Transport, TransportFuture};
use futures_util::StreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Transport over a long-lived SSE connection plus POSTed requests.
pub struct StreamTransport {
    http: reqwest::Client,
    endpoint: Url,
    tracker: Arc<RequestTracker>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl StreamTransport {
    /// Open the event stream and wait for the server to announce its
    /// message endpoint.
    pub async fn connect(backend_id: &str, url: &str, timeout_ms: u64) -> Result<Self, McpError> {
        let connection_error = |message: String| McpError::Connection {
            backend: backend_id.to_string(),
            message,
        };

        let base = Url::parse(url).map_err(|e| connection_error(format!("invalid URL {url}: {e}")))?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| connection_error(e.to_string()))?;

        let response = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            http.get(base.clone())
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| connection_error(format!("no response from {url} within {timeout_ms}ms")))?
        .map_err(|e| connection_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(connection_error(format!("{url} answered {status}")));
        }

        let tracker = Arc::new(RequestTracker::new(backend_id, timeout_ms));
        let cancel = CancellationToken::new();
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<Result<Url, String>>();

        let reader_tracker = Arc::clone(&tracker);
        let reader_cancel = cancel.clone();
        let mut bytes = Box::pin(response.bytes_stream());
        tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut endpoint_tx = Some(endpoint_tx);
            loop {
                let chunk = tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    chunk = bytes.next() => match chunk {
                        Some(Ok(chunk)) => chunk,
                        Some(Err(e)) => {
                            tracing::warn!(backend = %reader_tracker.backend(), "Event stream error: {e}");
                            break;
                        }
                        None => break,
                    },
                };
                for event in parser.feed(&chunk) {
                    match event.event_type.as_str() {
                        "endpoint" => {
                            if let Some(tx) = endpoint_tx.take() {
                                let resolved = base
                                    .join(event.data.trim())
                                    .map_err(|e| format!("bad endpoint '{}': {e}", event.data));
                                let _ = tx.send(resolved);
                            }
                        }
                        "message" => reader_tracker.dispatch(&event.data).await,
                        other => {
                            tracing::debug!(backend = %reader_tracker.backend(), "Ignoring SSE event '{other}'");
                        }
                    }
                }
            }
            reader_tracker.fail_all().await;
        });

        let endpoint = match tokio::time::timeout(Duration::from_millis(timeout_ms), endpoint_rx).await {
            Ok(Ok(Ok(endpoint))) => endpoint,
            Ok(Ok(Err(message))) => {
                cancel.cancel();
                return Err(connection_error(message));
            }
            Ok(Err(_)) => {
                cancel.cancel();
                return Err(connection_error(
                    "event stream ended before announcing an endpoint".to_string(),
                ));
            }
            Err(_) => {
                cancel.cancel();
                return Err(connection_error(format!(
                    "no endpoint announced within {timeout_ms}ms"
                )));
            }
        };

        tracing::debug!(backend = backend_id, %endpoint, "Event stream connected");

        Ok(Self {
            http,
            endpoint,
            tracker,
            cancel,
            closed: AtomicBool::new(false),
        })
    }

    /// POST one serialized message to the announced endpoint.
    async fn post(&self, body: String) -> Result<(), McpError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(Duration::from_millis(self.tracker.timeout_ms()))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    McpError::Timeout {
                        name: "POST".to_string(),
                        timeout_ms: self.tracker.timeout_ms(),
                    }
                } else {
                    self.tracker.closed_error(&e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(self
                .tracker
                .closed_error(&format!("endpoint answered {status}")));
        }
        Ok(())
    }
}

impl Transport for StreamTransport {
    fn send_request<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> TransportFuture<'a, JsonRpcResponse> {
        Box::pin(async move {
            let (id, serialized, rx) = self.tracker.begin(method, params).await?;
            if let Err(e) = self.post(serialized).await {
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
            self.post(serialized).await
        })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            self.cancel.cancel();
            self.tracker.fail_all().await;
            Ok(())
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
