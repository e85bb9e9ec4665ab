//! Shared message, tool, and error types for Switchboard.

pub mod error;
pub mod message;
pub mod runtime;
pub mod tool;

pub use error::{AgentError, ConfigError, SwitchboardError};
pub use message::*;
pub use runtime::{AgentRuntime, TurnFuture};
pub use tool::*;
