//! Describe Target Node
//!
//! Reports the host object a node acts on. An unlinked `target` falls back
//! to the object that triggered the dispatch.

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity, Value,
};
use serde::{Deserialize, Serialize};

/// Describe Target Node
///
/// # Inputs
/// - `target` - Host object; defaults to the dispatch trigger
///
/// # Outputs
/// - `object` - The resolved object, `Null` if none
/// - `kind` - Kind name of the resolved object, empty if none
/// - `valid` - Whether an alive object was resolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescribeTargetNode {}

impl DescribeTargetNode {
    pub const PORT_TARGET: &'static str = "target";
    pub const PORT_OBJECT: &'static str = "object";
    pub const PORT_KIND: &'static str = "kind";
    pub const PORT_VALID: &'static str = "valid";
}

impl DescribeNode for DescribeTargetNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::dependency(
            TypeIdentity::new("Ceres.Objects", "DescribeTarget"),
            "Describe Target",
            NodeCategory::Object,
        )
        .with_description("Outputs the target object and its kind")
        .with_port(PortDescriptor::input(Self::PORT_TARGET, PortType::Any))
        .with_port(PortDescriptor::output(Self::PORT_OBJECT, PortType::Any))
        .with_port(PortDescriptor::output(Self::PORT_KIND, PortType::String))
        .with_port(PortDescriptor::output(Self::PORT_VALID, PortType::Bool))
    }
}

inventory::submit!(NodeRegistration {
    descriptor: DescribeTargetNode::descriptor,
    factory: deserialize_node::<DescribeTargetNode>,
});

#[async_trait]
impl Node for DescribeTargetNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        match cx.target_or_default(Self::PORT_TARGET) {
            Some(object) => {
                cx.set_output(Self::PORT_KIND, object.kind().to_string());
                cx.set_output(Self::PORT_VALID, true);
                cx.set_output(Self::PORT_OBJECT, Value::Object(object));
            }
            None => {
                cx.set_output(Self::PORT_KIND, String::new());
                cx.set_output(Self::PORT_VALID, false);
                cx.set_output(Self::PORT_OBJECT, Value::Null);
            }
        }
        Ok(())
    }
}
