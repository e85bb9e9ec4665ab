//! MCP (Model Context Protocol) client side of Switchboard.
//!
//! Backends are reached over a child process's stdin/stdout or over an HTTP
//! event stream. Each connection becomes a [`Session`]; the
//! [`SessionManager`] owns them all together with the merged [`ToolCatalog`],
//! and the [`InvocationRouter`] sends each tool call to its owning session.

pub mod catalog;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod manager;
pub mod router;
pub mod session;
mod sse;
mod stream;
pub mod transport;

pub use catalog::ToolCatalog;
pub use config::{McpConfig, McpServerConfig, TransportDescriptor};
pub use error::McpError;
pub use manager::{SessionEvent, SessionManager};
pub use router::{InvocationRouter, extract_text};
pub use session::{ResourceInfo, ServerInfo, Session, ToolCallResult, ToolContent};
pub use stream::StreamTransport;
pub use transport::{StdioTransport, Transport, TransportFuture};
