//! MCP session: the protocol state of one backend connection.
//!
//! Wraps a [`Transport`] with the handshake (`initialize` + `initialized`
//! notification), tool discovery (`tools/list`), tool invocation
//! (`tools/call`), and resource discovery (`resources/list`).

use crate::error::McpError;
use crate::jsonrpc::PROTOCOL_VERSION;
use crate::transport::Transport;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use switchboard_types::ToolDescriptor;

/// Name and version a server reported during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A resource advertised by a server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// A content item in a tool result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// An embedded resource; its body is kept as raw JSON.
    Resource { resource: serde_json::Value },
}

/// Result of calling a tool on an MCP server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

#[derive(Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    #[serde(default, rename = "serverInfo")]
    server_info: ServerInfo,
}

#[derive(Deserialize)]
struct ToolsListResult {
    tools: Vec<ToolEntry>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema")]
    input_schema: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Deserialize)]
struct ResourcesListResult {
    resources: Vec<ResourceInfo>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

/// Upper bound on pages fetched by one list operation.
const MAX_LIST_PAGES: usize = 100;

fn cursor_params(cursor: Option<&String>) -> Option<serde_json::Value> {
    cursor.map(|c| serde_json::json!({ "cursor": c }))
}

/// Cursor bookkeeping for a paginated list request.
#[derive(Default)]
struct Pager {
    seen: HashSet<String>,
    pages: usize,
}

impl Pager {
    /// Decide whether to fetch another page. A repeated cursor or too many
    /// pages is a protocol error.
    fn advance(&mut self, method: &str, next: Option<String>) -> Result<Option<String>, McpError> {
        self.pages += 1;
        let Some(next) = next.filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        if !self.seen.insert(next.clone()) {
            return Err(McpError::Protocol(format!(
                "{method} returned cursor '{next}' twice"
            )));
        }
        if self.pages >= MAX_LIST_PAGES {
            return Err(McpError::Protocol(format!(
                "{method} exceeded {MAX_LIST_PAGES} pages"
            )));
        }
        Ok(Some(next))
    }
}

/// The live, initialized connection state to one backend.
pub struct Session {
    backend_id: String,
    transport: Box<dyn Transport>,
    initialized: AtomicBool,
    server_info: OnceLock<ServerInfo>,
}

impl Session {
    /// Wrap an established transport. The session must be initialized before
    /// any other operation.
    pub fn new(backend_id: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            backend_id: backend_id.into(),
            transport,
            initialized: AtomicBool::new(false),
            server_info: OnceLock::new(),
        }
    }

    /// Perform the `initialize` handshake and send `notifications/initialized`.
    pub async fn initialize(&self) -> Result<(), McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "switchboard",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let result = self
            .transport
            .send_request("initialize", Some(params))
            .await?
            .into_result(&self.backend_id, "initialize")?;

        let init: InitializeResult = serde_json::from_value(result).map_err(|e| {
            McpError::Protocol(format!("Failed to parse initialize response: {e}"))
        })?;

        if init.protocol_version != PROTOCOL_VERSION {
            tracing::debug!(
                backend = %self.backend_id,
                "Server negotiated protocol {} (requested {PROTOCOL_VERSION})",
                init.protocol_version
            );
        }

        self.transport
            .send_notification("notifications/initialized", None)
            .await?;

        let _ = self.server_info.set(init.server_info);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), McpError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(McpError::NotInitialized {
                backend: self.backend_id.clone(),
            })
        }
    }

    /// Discover every tool the server exposes, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        self.ensure_initialized()?;

        let mut tools = Vec::new();
        let mut pager = Pager::default();
        let mut cursor: Option<String> = None;
        loop {
            let result = self
                .transport
                .send_request("tools/list", cursor_params(cursor.as_ref()))
                .await?
                .into_result(&self.backend_id, "tools/list")?;

            let page: ToolsListResult = serde_json::from_value(result).map_err(|e| {
                McpError::Protocol(format!("Failed to parse tools/list response: {e}"))
            })?;

            tools.extend(page.tools.into_iter().map(|t| ToolDescriptor {
                name: t.name,
                description: t.description.unwrap_or_default(),
                input_schema: t.input_schema,
            }));

            cursor = pager.advance("tools/list", page.next_cursor)?;
            if cursor.is_none() {
                break;
            }
        }
        Ok(tools)
    }

    /// Call a tool on this server.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        self.ensure_initialized()?;

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });

        let result = self
            .transport
            .send_request("tools/call", Some(params))
            .await?
            .into_result(&self.backend_id, "tools/call")?;

        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Failed to parse tools/call result: {e}")))
    }

    /// List the resources the server exposes.
    pub async fn list_resources(&self) -> Result<Vec<ResourceInfo>, McpError> {
        self.ensure_initialized()?;

        let mut resources = Vec::new();
        let mut pager = Pager::default();
        let mut cursor: Option<String> = None;
        loop {
            let result = self
                .transport
                .send_request("resources/list", cursor_params(cursor.as_ref()))
                .await?
                .into_result(&self.backend_id, "resources/list")?;

            let page: ResourcesListResult = serde_json::from_value(result).map_err(|e| {
                McpError::Protocol(format!("Failed to parse resources/list response: {e}"))
            })?;
            resources.extend(page.resources);

            cursor = pager.advance("resources/list", page.next_cursor)?;
            if cursor.is_none() {
                break;
            }
        }
        Ok(resources)
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Server identity from the handshake, once initialized.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.get()
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Close the underlying transport. Outstanding calls fail with a
    /// transport error; repeated calls are no-ops.
    pub async fn close(&self) -> Result<(), McpError> {
        self.transport.close().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend_id", &self.backend_id)
            .field("initialized", &self.is_initialized())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::JsonRpcResponse;
    use crate::transport::TransportFuture;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    /// Replies to each method from a fixed table and records what was sent.
    struct ScriptedTransport {
        replies: Vec<(&'static str, serde_json::Value)>,
        sent: Mutex<Vec<(String, Option<serde_json::Value>)>>,
        closed: AtomicBool,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<(&'static str, serde_json::Value)>) -> Self {
            Self {
                replies,
                sent: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send_request<'a>(
            &'a self,
            method: &'a str,
            params: Option<serde_json::Value>,
        ) -> TransportFuture<'a, JsonRpcResponse> {
            let mut sent = self.sent.lock().unwrap();
            let id = sent.len() as u64 + 1;
            sent.push((method.to_string(), params.clone()));
            let cursor = params
                .as_ref()
                .and_then(|p| p.get("cursor"))
                .and_then(|c| c.as_str())
                .map(str::to_string);
            let reply = self
                .replies
                .iter()
                .filter(|(m, _)| *m == method)
                .nth(if cursor.is_some() { 1 } else { 0 })
                .map(|(_, v)| JsonRpcResponse::success(id, v.clone()))
                .unwrap_or_else(|| JsonRpcResponse::failure(id, -32601, "Method not found"));
            Box::pin(async move { Ok(reply) })
        }

        fn send_notification<'a>(
            &'a self,
            method: &'a str,
            params: Option<serde_json::Value>,
        ) -> TransportFuture<'a, ()> {
            self.sent.lock().unwrap().push((method.to_string(), params));
            Box::pin(async { Ok(()) })
        }

        fn close(&self) -> TransportFuture<'_, ()> {
            self.closed.store(true, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    fn init_reply() -> (&'static str, serde_json::Value) {
        (
            "initialize",
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "weather", "version": "1.0.0"}
            }),
        )
    }

    #[tokio::test]
    async fn operations_require_initialize() {
        let session = Session::new("weather", Box::new(ScriptedTransport::new(vec![])));
        let err = session.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::NotInitialized { .. }));
        let err = session
            .call_tool("get_status", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NotInitialized { .. }));
        assert!(session.list_resources().await.is_err());
    }

    #[tokio::test]
    async fn initialize_records_server_info_and_notifies() {
        let transport = ScriptedTransport::new(vec![init_reply()]);
        let session = Session::new("weather", Box::new(transport));
        session.initialize().await.unwrap();
        assert!(session.is_initialized());
        assert_eq!(session.server_info().unwrap().name, "weather");
    }

    #[tokio::test]
    async fn malformed_initialize_is_a_protocol_error() {
        let transport = ScriptedTransport::new(vec![("initialize", serde_json::json!({"nope": 1}))]);
        let session = Session::new("weather", Box::new(transport));
        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
        assert!(!session.is_initialized());
    }

    #[tokio::test]
    async fn list_tools_follows_cursor_and_defaults_fields() {
        let transport = ScriptedTransport::new(vec![
            init_reply(),
            (
                "tools/list",
                serde_json::json!({
                    "tools": [{"name": "a", "description": "Tool A", "inputSchema": {"type": "object"}}],
                    "nextCursor": "page2"
                }),
            ),
            ("tools/list", serde_json::json!({"tools": [{"name": "b"}]})),
        ]);
        let session = Session::new("weather", Box::new(transport));
        session.initialize().await.unwrap();

        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].description, "Tool A");
        assert_eq!(tools[1].name, "b");
        assert_eq!(tools[1].description, "");
        assert_eq!(tools[1].input_schema["type"], "object");
    }

    #[tokio::test]
    async fn call_tool_parses_mixed_content() {
        let transport = ScriptedTransport::new(vec![
            init_reply(),
            (
                "tools/call",
                serde_json::json!({
                    "content": [
                        {"type": "text", "text": "sunny"},
                        {"type": "image", "data": "base64data", "mimeType": "image/png"},
                        {"type": "resource", "resource": {"uri": "c3se://news", "text": "hi"}}
                    ],
                    "isError": false
                }),
            ),
        ]);
        let session = Session::new("weather", Box::new(transport));
        session.initialize().await.unwrap();

        let result = session
            .call_tool("forecast", serde_json::json!({"city": "Gothenburg"}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 3);
        assert_eq!(
            result.content[0],
            ToolContent::Text {
                text: "sunny".into()
            }
        );
        assert!(matches!(result.content[1], ToolContent::Image { .. }));
        assert!(matches!(result.content[2], ToolContent::Resource { .. }));
    }

    #[tokio::test]
    async fn call_tool_error_reply_is_json_rpc_error() {
        let transport = ScriptedTransport::new(vec![init_reply()]);
        let session = Session::new("weather", Box::new(transport));
        session.initialize().await.unwrap();
        let err = session
            .call_tool("forecast", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::JsonRpc { code: -32601, .. }));
    }

    #[tokio::test]
    async fn list_resources_parses_entries() {
        let transport = ScriptedTransport::new(vec![
            init_reply(),
            (
                "resources/list",
                serde_json::json!({
                    "resources": [{"uri": "c3se://news", "name": "news", "mimeType": "text/plain"}]
                }),
            ),
        ]);
        let session = Session::new("c3se", Box::new(transport));
        session.initialize().await.unwrap();
        let resources = session.list_resources().await.unwrap();
        assert_eq!(resources[0].uri, "c3se://news");
        assert_eq!(resources[0].mime_type.as_deref(), Some("text/plain"));
        assert!(resources[0].description.is_none());
    }

    #[tokio::test]
    async fn repeated_tools_cursor_is_a_protocol_error() {
        let page = serde_json::json!({"tools": [{"name": "a"}], "nextCursor": "same"});
        let transport = ScriptedTransport::new(vec![
            init_reply(),
            ("tools/list", page.clone()),
            ("tools/list", page),
        ]);
        let session = Session::new("looping", Box::new(transport));
        session.initialize().await.unwrap();

        let err = tokio::time::timeout(std::time::Duration::from_secs(2), session.list_tools())
            .await
            .expect("list_tools must terminate")
            .unwrap_err();
        assert!(matches!(err, McpError::Protocol(ref m) if m.contains("same")));
    }

    #[tokio::test]
    async fn repeated_resources_cursor_is_a_protocol_error() {
        let page = serde_json::json!({
            "resources": [{"uri": "c3se://news", "name": "news"}],
            "nextCursor": "again"
        });
        let transport = ScriptedTransport::new(vec![
            init_reply(),
            ("resources/list", page.clone()),
            ("resources/list", page),
        ]);
        let session = Session::new("looping", Box::new(transport));
        session.initialize().await.unwrap();

        let err = session.list_resources().await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
    }

    /// Answers `tools/list` with a fresh cursor on every page.
    struct EndlessPages {
        requests: AtomicUsize,
    }

    impl Transport for EndlessPages {
        fn send_request<'a>(
            &'a self,
            method: &'a str,
            _params: Option<serde_json::Value>,
        ) -> TransportFuture<'a, JsonRpcResponse> {
            let n = self.requests.fetch_add(1, Ordering::SeqCst) as u64;
            let result = if method == "initialize" {
                init_reply().1
            } else {
                serde_json::json!({"tools": [{"name": format!("t{n}")}], "nextCursor": format!("p{n}")})
            };
            Box::pin(async move { Ok(JsonRpcResponse::success(n + 1, result)) })
        }

        fn send_notification<'a>(
            &'a self,
            _method: &'a str,
            _params: Option<serde_json::Value>,
        ) -> TransportFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn close(&self) -> TransportFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn unbounded_pagination_stops_at_page_limit() {
        let transport = Arc::new(EndlessPages {
            requests: AtomicUsize::new(0),
        });
        let session = Session::new("endless", Box::new(SharedTransport(Arc::clone(&transport))));
        session.initialize().await.unwrap();

        let err = session.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(ref m) if m.contains("pages")));
        // initialize plus at most MAX_LIST_PAGES list requests
        assert!(transport.requests.load(Ordering::SeqCst) <= MAX_LIST_PAGES + 1);
    }

    struct SharedTransport(Arc<EndlessPages>);

    impl Transport for SharedTransport {
        fn send_request<'a>(
            &'a self,
            method: &'a str,
            params: Option<serde_json::Value>,
        ) -> TransportFuture<'a, JsonRpcResponse> {
            self.0.send_request(method, params)
        }

        fn send_notification<'a>(
            &'a self,
            method: &'a str,
            params: Option<serde_json::Value>,
        ) -> TransportFuture<'a, ()> {
            self.0.send_notification(method, params)
        }

        fn close(&self) -> TransportFuture<'_, ()> {
            self.0.close()
        }

        fn is_closed(&self) -> bool {
            self.0.is_closed()
        }
    }

    #[test]
    fn deserialize_tool_call_result_defaults() {
        let result: ToolCallResult =
            serde_json::from_str(r#"{"content": [{"type": "text", "text": "not found"}], "isError": true}"#)
                .unwrap();
        assert!(result.is_error);

        let result: ToolCallResult = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(!result.is_error);
    }

    #[test]
    fn unknown_content_type_is_rejected() {
        let parsed: Result<ToolCallResult, _> =
            serde_json::from_str(r#"{"content": [{"type": "video", "url": "x"}]}"#);
        assert!(parsed.is_err());
    }
}
