//! Integration tests for the HTTP event-stream transport.
//!
//! A raw TCP server plays an MCP backend: `GET` opens the event stream and
//! announces the message endpoint, `POST` accepts a request and pushes the
//! reply onto the stream.

use std::sync::Arc;
use std::time::Duration;

use switchboard_mcp::{
    InvocationRouter, McpServerConfig, SessionManager, TransportDescriptor,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

type EventReceiver = Arc<Mutex<Option<mpsc::UnboundedReceiver<String>>>>;

/// Read one HTTP request; returns the request line and the body.
async fn read_request(socket: &mut TcpStream) -> Option<(String, String)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string();
    let request_line = head.lines().next().unwrap_or_default().to_string();
    Some((request_line, body))
}

/// Build the JSON-RPC reply for one request, or `None` for notifications.
fn reply_for(request: &serde_json::Value) -> Option<serde_json::Value> {
    let id = request.get("id")?.clone();
    let method = request.get("method").and_then(|m| m.as_str()).unwrap_or_default();
    let reply = match method {
        "initialize" => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "echo-server", "version": "1.0.0"}
            }
        }),
        "tools/list" => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "tools": [{
                    "name": "echo",
                    "description": "Echo the message back",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"message": {"type": "string"}},
                        "required": ["message"]
                    }
                }]
            }
        }),
        "tools/call" => {
            let message = request
                .pointer("/params/arguments/message")
                .and_then(|m| m.as_str())
                .unwrap_or_default();
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"content": [{"type": "text", "text": message}]}
            })
        }
        _ => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": "Method not found"}
        }),
    };
    Some(reply)
}

async fn handle_connection(
    mut socket: TcpStream,
    events_tx: mpsc::UnboundedSender<String>,
    events_rx: EventReceiver,
) {
    let Some((request_line, body)) = read_request(&mut socket).await else {
        return;
    };

    if request_line.starts_with("GET") {
        let Some(mut events) = events_rx.lock().await.take() else {
            return;
        };
        let head = "HTTP/1.1 200 OK\r\n\
                    Content-Type: text/event-stream\r\n\
                    Cache-Control: no-cache\r\n\
                    Connection: close\r\n\
                    \r\n\
                    : stream open\n\n\
                    event: endpoint\n\
                    data: /messages?sessionId=test\n\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        let _ = socket.flush().await;
        while let Some(data) = events.recv().await {
            let frame = format!("event: message\ndata: {data}\n\n");
            // Split inside the first two-byte character so the client sees it
            // arrive in two reads.
            let bytes = frame.as_bytes();
            let split = bytes
                .iter()
                .position(|&b| b == 0xC3)
                .map_or(bytes.len(), |pos| pos + 1);
            if socket.write_all(&bytes[..split]).await.is_err() {
                break;
            }
            let _ = socket.flush().await;
            if split < bytes.len() {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if socket.write_all(&bytes[split..]).await.is_err() {
                    break;
                }
                let _ = socket.flush().await;
            }
        }
        return;
    }

    if let Ok(request) = serde_json::from_str::<serde_json::Value>(&body) {
        if let Some(reply) = reply_for(&request) {
            let _ = events_tx.send(reply.to_string());
        }
    }
    let _ = socket
        .write_all(b"HTTP/1.1 202 Accepted\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
        .await;
    let _ = socket.shutdown().await;
}

/// Start the event-stream backend and return its stream URL.
async fn start_stream_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let events_rx: EventReceiver = Arc::new(Mutex::new(Some(events_rx)));

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(handle_connection(
                socket,
                events_tx.clone(),
                Arc::clone(&events_rx),
            ));
        }
    });

    format!("http://{addr}/sse")
}

/// Start a server that answers every connection with `response`.
async fn start_fixed_server(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_request(&mut socket).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}/sse")
}

fn stream_config(url: String) -> McpServerConfig {
    let mut config = McpServerConfig::new(TransportDescriptor::Stream { url });
    config.timeout_ms = 5000;
    config
}

#[tokio::test]
async fn stream_backend_round_trip() {
    let url = start_stream_server().await;
    let manager = Arc::new(SessionManager::new());

    let session = manager
        .connect("remote", &stream_config(url))
        .await
        .expect("stream backend should connect");
    assert_eq!(session.server_info().unwrap().name, "echo-server");

    let snapshot = manager.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "echo");
    assert_eq!(snapshot[0].input_schema["required"][0], "message");

    let router = InvocationRouter::new(Arc::clone(&manager));
    let out = router
        .invoke("echo", serde_json::json!({"message": "hello over sse"}))
        .await;
    assert_eq!(out.render(), "hello over sse");

    assert!(manager.disconnect("remote").await);
    assert!(session.is_closed());
}

#[tokio::test]
async fn non_ascii_reply_split_across_reads_survives() {
    let url = start_stream_server().await;
    let manager = Arc::new(SessionManager::new());
    manager
        .connect("remote", &stream_config(url))
        .await
        .expect("stream backend should connect");

    let router = InvocationRouter::new(Arc::clone(&manager));
    let out = router
        .invoke("echo", serde_json::json!({"message": "Göteborg"}))
        .await;
    assert!(!out.is_error());
    assert_eq!(out.render(), "Göteborg");

    manager.shutdown().await;
}

#[tokio::test]
async fn error_status_on_stream_open_is_a_connection_error() {
    let url = start_fixed_server(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )
    .await;
    let manager = SessionManager::new();
    let err = manager
        .connect("remote", &stream_config(url))
        .await
        .unwrap_err();
    assert!(err.is_connection_error(), "got {err:?}");
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn stream_without_endpoint_is_a_connection_error() {
    let url = start_fixed_server(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/event-stream\r\n\
         Connection: close\r\n\
         \r\n\
         event: ping\n\
         data: {}\n\n",
    )
    .await;
    let err = SessionManager::new()
        .connect("remote", &stream_config(url))
        .await
        .unwrap_err();
    assert!(err.is_connection_error(), "got {err:?}");
}
