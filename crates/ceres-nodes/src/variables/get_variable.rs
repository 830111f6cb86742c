//! Get Variable Node
//!
//! Reads a node-owned variable. Persisting the `variable` field as a name
//! string binds it to the blackboard entry of that name at compile time.

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity, VariableDescriptor,
};
use serde::{Deserialize, Serialize};

/// Get Variable Node
///
/// # Outputs
/// - `value` - Current value of the bound variable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetVariableNode {}

impl GetVariableNode {
    pub const FIELD_VARIABLE: &'static str = "variable";
    pub const PORT_VALUE: &'static str = "value";
}

impl DescribeNode for GetVariableNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::dependency(
            TypeIdentity::new("Ceres.Variables", "GetVariable"),
            "Get Variable",
            NodeCategory::Variable,
        )
        .with_description("Outputs the value of a variable")
        .with_variable(VariableDescriptor::new(Self::FIELD_VARIABLE, PortType::Any))
        .with_port(PortDescriptor::output(Self::PORT_VALUE, PortType::Any))
    }
}

inventory::submit!(NodeRegistration {
    descriptor: GetVariableNode::descriptor,
    factory: deserialize_node::<GetVariableNode>,
});

#[async_trait]
impl Node for GetVariableNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let value = cx
            .variable(Self::FIELD_VARIABLE)
            .map(|variable| variable.get())
            .unwrap_or_default();
        cx.set_output(Self::PORT_VALUE, value);
        Ok(())
    }
}
