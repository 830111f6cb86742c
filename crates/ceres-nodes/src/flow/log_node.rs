//! Log Node
//!
//! Writes a message to the host log and reports it as a node message event.

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory,
    NodeDescriptor, NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity,
};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

/// Log Node
///
/// # Inputs
/// - `message` - Text to log
///
/// # Outputs
/// - `next` - Control successor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogNode {
    /// Severity of the log line; `off` only emits the event
    #[serde(default = "default_level")]
    pub level: LevelFilter,
}

fn default_level() -> LevelFilter {
    LevelFilter::Info
}

impl Default for LogNode {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl LogNode {
    pub const PORT_MESSAGE: &'static str = "message";
    pub const PORT_NEXT: &'static str = "next";
}

impl DescribeNode for LogNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Flow", "Log"),
            "Log",
            NodeCategory::Debug,
        )
        .with_description("Logs a message, then continues")
        .with_port(PortDescriptor::input(Self::PORT_MESSAGE, PortType::String))
        .with_port(PortDescriptor::control_output(Self::PORT_NEXT))
    }
}

inventory::submit!(NodeRegistration {
    descriptor: LogNode::descriptor,
    factory: deserialize_node::<LogNode>,
});

#[async_trait]
impl Node for LogNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let message: String = cx.input(Self::PORT_MESSAGE);
        if let Some(level) = self.level.to_level() {
            log::log!(level, "[{}] {}", cx.graph().name(), message);
        }
        cx.message(message);
        cx.continue_with(Self::PORT_NEXT);
        Ok(())
    }

    fn serialize_fields(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_field() {
        let node: LogNode = serde_json::from_value(serde_json::json!({"level": "warn"})).unwrap();
        assert_eq!(node.level, LevelFilter::Warn);
        let node: LogNode = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(node.level, LevelFilter::Info);
        let node: LogNode = serde_json::from_value(serde_json::json!({"level": "off"})).unwrap();
        assert_eq!(node.level.to_level(), None);
    }
}
