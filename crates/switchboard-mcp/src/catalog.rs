//! Tool catalog: one namespace over the tools of every connected backend.
//!
//! Names are not namespaced per backend. When two backends expose the same
//! tool name, the backend registered most recently owns it. Removing that
//! backend hands the name back to the previous owner, so the catalog always
//! equals the last-write-wins union of the backends still registered.

use std::collections::BTreeMap;
use switchboard_types::ToolDescriptor;

/// Aggregated mapping from tool name to `(backend_id, descriptor)`.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    /// Backends in registration order, each with the tools it reported.
    registrations: Vec<(String, Vec<ToolDescriptor>)>,
    /// Resolved owner of every tool name.
    index: BTreeMap<String, (String, ToolDescriptor)>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tools of `backend_id`, replacing any earlier registration
    /// of the same backend.
    pub fn register(&mut self, backend_id: &str, tools: Vec<ToolDescriptor>) {
        for tool in &tools {
            if let Some((owner, _)) = self.index.get(&tool.name) {
                if owner != backend_id {
                    tracing::debug!(
                        tool = %tool.name,
                        previous = %owner,
                        backend = backend_id,
                        "Tool name collision, most recent registration wins"
                    );
                }
            }
        }

        self.registrations.retain(|(id, _)| id != backend_id);
        self.registrations.push((backend_id.to_string(), tools));
        self.rebuild();
    }

    /// Remove every tool owned by `backend_id`. Returns whether the backend
    /// was registered.
    pub fn unregister(&mut self, backend_id: &str) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|(id, _)| id != backend_id);
        if self.registrations.len() == before {
            return false;
        }
        self.rebuild();
        true
    }

    fn rebuild(&mut self) {
        self.index.clear();
        for (backend_id, tools) in &self.registrations {
            for tool in tools {
                self.index
                    .insert(tool.name.clone(), (backend_id.clone(), tool.clone()));
            }
        }
    }

    /// Look up the owner and descriptor of a tool.
    pub fn lookup(&self, tool_name: &str) -> Option<(&str, &ToolDescriptor)> {
        self.index
            .get(tool_name)
            .map(|(owner, tool)| (owner.as_str(), tool))
    }

    /// Point-in-time copy of all tool descriptors, ordered by name.
    pub fn snapshot(&self) -> Vec<ToolDescriptor> {
        self.index.values().map(|(_, tool)| tool.clone()).collect()
    }

    /// Point-in-time copy of `(backend_id, descriptor)` pairs, ordered by
    /// tool name.
    pub fn entries(&self) -> Vec<(String, ToolDescriptor)> {
        self.index.values().cloned().collect()
    }

    /// Number of tool names currently routed to `backend_id`.
    pub fn tools_for_backend(&self, backend_id: &str) -> usize {
        self.index
            .values()
            .filter(|(owner, _)| owner == backend_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
