//! Function Input Node
//!
//! Entry of a custom function graph. A call to `functionName` starts here
//! with the caller's arguments.

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity, FLOW_INPUT,
};
use serde::{Deserialize, Serialize};

/// Function Input Node
///
/// # Outputs
/// - `args[i]` - Argument `i` of the call
/// - `next` - Function body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInputNode {
    #[serde(default)]
    pub function_name: String,
}

impl FunctionInputNode {
    pub const PORT_ARGS: &'static str = "args";
    pub const PORT_NEXT: &'static str = "next";

    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
        }
    }
}

impl DescribeNode for FunctionInputNode {
    fn descriptor() -> NodeDescriptor {
        let mut descriptor = NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Functions", "FunctionInput"),
            "Function Input",
            NodeCategory::Function,
        )
        .with_description("Entry of a custom function")
        .with_port(PortDescriptor::output(Self::PORT_ARGS, PortType::Any).array())
        .with_port(PortDescriptor::control_output(Self::PORT_NEXT));
        descriptor.ports.retain(|p| p.name != FLOW_INPUT);
        descriptor
    }
}

inventory::submit!(NodeRegistration {
    descriptor: FunctionInputNode::descriptor,
    factory: deserialize_node::<FunctionInputNode>,
});

#[async_trait]
impl Node for FunctionInputNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        for index in 0..cx.port_len(Self::PORT_ARGS) {
            let arg = cx.payload().arg(index);
            cx.set_output_at(Self::PORT_ARGS, index, arg);
        }
        cx.continue_with(Self::PORT_NEXT);
        Ok(())
    }

    fn serialize_fields(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn entry_name(&self) -> Option<&str> {
        Some(&self.function_name)
    }
}
