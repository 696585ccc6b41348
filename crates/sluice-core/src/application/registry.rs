use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::Flow;

/// Registry of available flows
///
/// A mapping from flow name to flow procedure, populated before the
/// executor starts and read-only during execution.
pub struct FlowRegistry {
    flows: HashMap<String, Arc<dyn Flow>>,
}

impl FlowRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            flows: HashMap::new(),
        }
    }

    /// Register a flow under its own name
    ///
    /// A later registration under the same name replaces the earlier
    /// one.
    pub fn register(&mut self, flow: Arc<dyn Flow>) {
        let name = flow.name().to_string();
        debug!("Registering flow type: {}", name);
        self.flows.insert(name, flow);
    }

    /// Look up a flow by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Flow>> {
        self.flows.get(name).cloned()
    }

    /// Whether a flow is registered under the given name
    pub fn contains(&self, name: &str) -> bool {
        self.flows.contains_key(name)
    }

    /// Names of all registered flows
    pub fn flow_names(&self) -> Vec<String> {
        self.flows.keys().cloned().collect()
    }
}

impl Default for FlowRegistry {
    fn default() -> Self {
        Self::new()
    }
}
