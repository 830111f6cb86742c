//! Function Output Node

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity,
};
use serde::{Deserialize, Serialize};

/// Function Output Node
///
/// Stores `value` as the call's return value and ends the chain.
///
/// # Inputs
/// - `value` - Return value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionOutputNode {}

impl FunctionOutputNode {
    pub const PORT_VALUE: &'static str = "value";
}

impl DescribeNode for FunctionOutputNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Functions", "FunctionOutput"),
            "Function Output",
            NodeCategory::Function,
        )
        .with_description("Returns a value from a custom function")
        .with_port(PortDescriptor::input(Self::PORT_VALUE, PortType::Any))
    }
}

inventory::submit!(NodeRegistration {
    descriptor: FunctionOutputNode::descriptor,
    factory: deserialize_node::<FunctionOutputNode>,
});

#[async_trait]
impl Node for FunctionOutputNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let value = cx.input_value(Self::PORT_VALUE);
        cx.payload().set_return(value);
        cx.set_next(None);
        Ok(())
    }
}
