//! Query processing for Switchboard: binds the live tool catalog to an agent
//! runtime and turns each user message into one agent turn.

mod query;

pub use query::{QueryProcessor, extract_answer};
