//! Session manager: owns every backend connection and the tool catalog.
//!
//! The session set and the catalog live behind one lock, so a reader never
//! sees a catalog entry whose session is being torn down. Transport setup and
//! the handshake run outside that lock; operations on the same backend id are
//! serialized by a per-backend mutex.

use crate::catalog::ToolCatalog;
use crate::config::{McpConfig, McpServerConfig};
use crate::error::McpError;
use crate::session::Session;
use crate::transport::{self, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use switchboard_types::ToolDescriptor;
use tokio::sync::{Mutex, RwLock, broadcast};

/// Lifecycle notifications for observers such as a UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected {
        backend_id: String,
        tools: Vec<String>,
    },
    Disconnected {
        backend_id: String,
    },
    ConnectFailed {
        backend_id: String,
        message: String,
    },
}

#[derive(Default)]
struct State {
    sessions: HashMap<String, Arc<Session>>,
    catalog: ToolCatalog,
}

/// Manages connections to multiple MCP servers.
pub struct SessionManager {
    state: RwLock<State>,
    backend_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(State::default()),
            backend_locks: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Connect every configured server.
    ///
    /// Servers that fail to start are logged and skipped; the caller continues
    /// with whatever servers are available.
    pub async fn start(&self, config: &McpConfig) -> Vec<(String, McpError)> {
        let mut failures = Vec::new();
        for (name, server_config) in &config.servers {
            if let Err(e) = self.connect(name, server_config).await {
                tracing::warn!("Failed to start MCP server '{}': {}", name, e);
                failures.push((name.clone(), e));
            }
        }
        failures
    }

    /// Subscribe to connect/disconnect notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    async fn backend_lock(&self, backend_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.backend_locks.lock().await;
        Arc::clone(locks.entry(backend_id.to_string()).or_default())
    }

    /// Drop the per-backend mutex once nobody else holds or waits on it.
    async fn release_backend_lock(&self, backend_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.backend_locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(backend_id);
        }
    }

    /// Establish a transport to the server, then connect it as `backend_id`.
    pub async fn connect(
        &self,
        backend_id: &str,
        config: &McpServerConfig,
    ) -> Result<Arc<Session>, McpError> {
        let lock = self.backend_lock(backend_id).await;
        let result = {
            let _guard = lock.lock().await;
            tracing::debug!(backend = backend_id, server = %config.transport.label(), "Connecting MCP server");
            match transport::establish(backend_id, config).await {
                Ok(transport) => self.open_session(backend_id, transport).await,
                Err(e) => {
                    self.emit(SessionEvent::ConnectFailed {
                        backend_id: backend_id.to_string(),
                        message: e.to_string(),
                    });
                    Err(e)
                }
            }
        };
        self.release_backend_lock(backend_id, lock).await;
        result
    }

    /// Connect `backend_id` over an already established transport: handshake,
    /// discover tools, and register them.
    pub async fn connect_transport(
        &self,
        backend_id: &str,
        transport: Box<dyn Transport>,
    ) -> Result<Arc<Session>, McpError> {
        let lock = self.backend_lock(backend_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.open_session(backend_id, transport).await
        };
        self.release_backend_lock(backend_id, lock).await;
        result
    }

    async fn open_session(
        &self,
        backend_id: &str,
        transport: Box<dyn Transport>,
    ) -> Result<Arc<Session>, McpError> {
        let session = Session::new(backend_id, transport);

        let handshake = async {
            session.initialize().await?;
            session.list_tools().await
        };
        let tools = match handshake.await {
            Ok(tools) => tools,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    tracing::warn!(backend = backend_id, "Failed to close half-open session: {close_err}");
                }
                tracing::warn!(backend = backend_id, "MCP handshake failed: {e}");
                self.emit(SessionEvent::ConnectFailed {
                    backend_id: backend_id.to_string(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let session = Arc::new(session);
        let tool_names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();

        let replaced = {
            let mut state = self.state.write().await;
            let replaced = state.sessions.insert(backend_id.to_string(), Arc::clone(&session));
            // Registering replaces any tools of a previous session under this id.
            state.catalog.register(backend_id, tools);
            replaced
        };

        if let Some(old) = replaced {
            tracing::info!(backend = backend_id, "Replacing existing MCP session");
            if let Err(e) = old.close().await {
                tracing::warn!(backend = backend_id, "Failed to close replaced session: {e}");
            }
        }

        tracing::info!(
            "MCP server '{}' connected with {} tools",
            backend_id,
            tool_names.len()
        );
        self.emit(SessionEvent::Connected {
            backend_id: backend_id.to_string(),
            tools: tool_names,
        });
        Ok(session)
    }

    /// Disconnect `backend_id`: drop its tools and session, then close the
    /// transport. Unknown or already closed backends are a no-op; the return
    /// value says whether anything was disconnected.
    pub async fn disconnect(&self, backend_id: &str) -> bool {
        let lock = self.backend_lock(backend_id).await;
        let disconnected = {
            let _guard = lock.lock().await;
            self.disconnect_locked(backend_id).await
        };
        self.release_backend_lock(backend_id, lock).await;
        disconnected
    }

    async fn disconnect_locked(&self, backend_id: &str) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            let removed = state.sessions.remove(backend_id);
            if removed.is_some() {
                state.catalog.unregister(backend_id);
            }
            removed
        };

        let Some(session) = removed else {
            return false;
        };

        self.emit(SessionEvent::Disconnected {
            backend_id: backend_id.to_string(),
        });
        if let Err(e) = session.close().await {
            tracing::warn!(backend = backend_id, "Error closing MCP session: {e}");
        }
        tracing::info!("MCP server '{}' disconnected", backend_id);
        true
    }

    /// Disconnect every session, best-effort.
    pub async fn shutdown(&self) {
        for backend_id in self.backend_ids().await {
            self.disconnect(&backend_id).await;
        }
    }

    /// Resolve a tool name to its owning session and descriptor.
    pub async fn resolve(&self, tool_name: &str) -> Option<(Arc<Session>, ToolDescriptor)> {
        let state = self.state.read().await;
        let (owner, tool) = state.catalog.lookup(tool_name)?;
        let session = state.sessions.get(owner)?;
        Some((Arc::clone(session), tool.clone()))
    }

    /// Point-in-time copy of every routable tool, ordered by name.
    pub async fn snapshot(&self) -> Vec<ToolDescriptor> {
        self.state.read().await.catalog.snapshot()
    }

    /// Point-in-time copy of `(backend_id, descriptor)` pairs, ordered by name.
    pub async fn catalog_entries(&self) -> Vec<(String, ToolDescriptor)> {
        self.state.read().await.catalog.entries()
    }

    pub async fn session(&self, backend_id: &str) -> Option<Arc<Session>> {
        self.state.read().await.sessions.get(backend_id).cloned()
    }

    /// Connected backend ids, sorted.
    pub async fn backend_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().await.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Connected backends and the number of tool names routed to each.
    pub async fn server_summary(&self) -> Vec<(String, usize)> {
        let state = self.state.read().await;
        let mut summary: Vec<(String, usize)> = state
            .sessions
            .keys()
            .map(|id| (id.clone(), state.catalog.tools_for_backend(id)))
            .collect();
        summary.sort();
        summary
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
