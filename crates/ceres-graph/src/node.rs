//! The node behavior trait and the placeholder used for unresolved types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::descriptor::NodeDescriptor;
use crate::error::Result;
use crate::types::{NodeCategory, TypeIdentity};

/// Behavior of a node type
///
/// A node only holds its persisted configuration; ports and variables live in
/// the graph and are reached through the [`ExecutionContext`] passed to
/// [`Node::execute`].
#[async_trait]
pub trait Node: Send + Sync + 'static {
    /// Run the node
    ///
    /// May read inputs, write outputs, and select the control-flow successor
    /// with `cx.set_next(..)`. Awaiting inside this call suspends the dispatch.
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()>;

    /// Persisted simple fields of this node
    fn serialize_fields(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }

    /// Event or function name this node answers to, for entry nodes
    fn entry_name(&self) -> Option<&str> {
        None
    }

    /// Called once when the owning graph is disposed
    fn dispose(&self) {}
}

/// Inert stand-in for a node whose type could not be resolved
///
/// Keeps the original payload verbatim so the graph can be re-saved without
/// losing data and redirected later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidNode {
    /// Type string as it appeared in the persisted data
    pub node_type: String,
    /// Generic argument strings as persisted
    #[serde(default)]
    pub generic_arguments: Vec<String>,
    /// Original field blob, verbatim
    pub serialized_data: String,
}

impl InvalidNode {
    pub fn new(
        node_type: impl Into<String>,
        generic_arguments: Vec<String>,
        serialized_data: impl Into<String>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            generic_arguments,
            serialized_data: serialized_data.into(),
        }
    }

    /// Descriptor shared by all placeholders: no ports, Forward, terminal
    pub fn descriptor() -> NodeDescriptor {
        let mut descriptor = NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Graph", "InvalidNode"),
            "Invalid Node",
            NodeCategory::Invalid,
        )
        .with_description("Placeholder for a node whose type could not be resolved");
        descriptor.ports.clear();
        descriptor
    }
}

#[async_trait]
impl Node for InvalidNode {
    async fn execute(&self, _cx: &mut ExecutionContext<'_>) -> Result<()> {
        log::debug!("Skipping placeholder for unresolved type '{}'", self.node_type);
        Ok(())
    }

    fn serialize_fields(&self) -> serde_json::Value {
        serde_json::from_str(&self.serialized_data)
            .unwrap_or_else(|_| serde_json::Value::String(self.serialized_data.clone()))
    }
}
