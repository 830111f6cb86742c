//! Set Variable Node

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity, VariableDescriptor,
};
use serde::{Deserialize, Serialize};

/// Set Variable Node
///
/// Writes `value` through the bound variable, so every node and graph
/// sharing the same blackboard or global entry observes the change.
///
/// # Inputs
/// - `value` - New value
///
/// # Outputs
/// - `next` - Control successor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetVariableNode {}

impl SetVariableNode {
    pub const FIELD_VARIABLE: &'static str = "variable";
    pub const PORT_VALUE: &'static str = "value";
    pub const PORT_NEXT: &'static str = "next";
}

impl DescribeNode for SetVariableNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Variables", "SetVariable"),
            "Set Variable",
            NodeCategory::Variable,
        )
        .with_description("Assigns a variable, then continues")
        .with_variable(VariableDescriptor::new(Self::FIELD_VARIABLE, PortType::Any))
        .with_port(PortDescriptor::input(Self::PORT_VALUE, PortType::Any))
        .with_port(PortDescriptor::control_output(Self::PORT_NEXT))
    }
}

inventory::submit!(NodeRegistration {
    descriptor: SetVariableNode::descriptor,
    factory: deserialize_node::<SetVariableNode>,
});

#[async_trait]
impl Node for SetVariableNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let value = cx.input_value(Self::PORT_VALUE);
        match cx.variable(Self::FIELD_VARIABLE) {
            Some(variable) => {
                log::trace!("SetVariable '{}': {} = {:?}", cx.guid(), variable.name(), value);
                variable.set(value);
            }
            None => log::warn!("SetVariable '{}': no variable bound", cx.guid()),
        }
        cx.continue_with(Self::PORT_NEXT);
        Ok(())
    }
}
