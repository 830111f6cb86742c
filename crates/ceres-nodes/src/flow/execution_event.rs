//! Execution Event Node
//!
//! Entry point of a control chain. A dispatch for `eventName` starts here.

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity, FLOW_INPUT,
};
use serde::{Deserialize, Serialize};

/// Execution Event Node
///
/// Copies the dispatch payload's positional arguments to its `args` array
/// outputs, then continues on `next`.
///
/// # Outputs
/// - `args[i]` - Payload argument `i` (`Null` if the event carried fewer)
/// - `next` - Control successor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEventNode {
    /// Event name this node answers to
    #[serde(default)]
    pub event_name: String,
}

impl ExecutionEventNode {
    pub const PORT_ARGS: &'static str = "args";
    pub const PORT_NEXT: &'static str = "next";

    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
        }
    }
}

impl DescribeNode for ExecutionEventNode {
    fn descriptor() -> NodeDescriptor {
        let mut descriptor = NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Flow", "ExecutionEvent"),
            "Execution Event",
            NodeCategory::Event,
        )
        .with_description("Starts a control chain when its event is dispatched")
        .with_port(PortDescriptor::output(Self::PORT_ARGS, PortType::Any).array())
        .with_port(PortDescriptor::control_output(Self::PORT_NEXT));
        // roots of a chain have no predecessor
        descriptor.ports.retain(|p| p.name != FLOW_INPUT);
        descriptor
    }
}

inventory::submit!(NodeRegistration {
    descriptor: ExecutionEventNode::descriptor,
    factory: deserialize_node::<ExecutionEventNode>,
});

#[async_trait]
impl Node for ExecutionEventNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let count = cx.port_len(Self::PORT_ARGS);
        for index in 0..count {
            let arg = cx.payload().arg(index);
            cx.set_output_at(Self::PORT_ARGS, index, arg);
        }
        log::debug!(
            "Event '{}' entered at node '{}' with {} args",
            self.event_name,
            cx.guid(),
            cx.payload().args().len()
        );
        cx.continue_with(Self::PORT_NEXT);
        Ok(())
    }

    fn serialize_fields(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn entry_name(&self) -> Option<&str> {
        Some(&self.event_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceres_graph::ExecutionPath;

    #[test]
    fn test_descriptor() {
        let meta = ExecutionEventNode::descriptor();
        assert_eq!(meta.identity.full_name(), "Ceres.Flow.ExecutionEvent");
        assert_eq!(meta.execution_path, ExecutionPath::Forward);
        assert!(meta.port(FLOW_INPUT).is_none());
        assert!(meta.port(ExecutionEventNode::PORT_ARGS).unwrap().array);
    }

    #[test]
    fn test_fields_round_trip() {
        let node = ExecutionEventNode::new("Start");
        assert_eq!(node.serialize_fields(), serde_json::json!({"eventName": "Start"}));
        assert_eq!(node.entry_name(), Some("Start"));
    }
}
