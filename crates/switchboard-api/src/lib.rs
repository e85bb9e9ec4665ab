//! Chat-completions agent runtime for Switchboard.

mod client;
mod retry;
mod runtime;
mod wire;

pub use client::ChatClient;
pub use retry::RetryConfig;
pub use runtime::{ChatCompletionsRuntime, DEFAULT_MAX_TOOL_ROUNDS};
