//! Invoke Function Node
//!
//! Calls a custom function by name. Local functions of the running graph
//! shadow the executor's shared function library.

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity,
};
use serde::{Deserialize, Serialize};

/// Invoke Function Node
///
/// # Inputs
/// - `args[i]` - Positional arguments
///
/// # Outputs
/// - `result` - The callee's return value (`Null` when it returns nothing)
/// - `next` - Control successor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeFunctionNode {
    #[serde(default)]
    pub function_name: String,
}

impl InvokeFunctionNode {
    pub const PORT_ARGS: &'static str = "args";
    pub const PORT_RESULT: &'static str = "result";
    pub const PORT_NEXT: &'static str = "next";

    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
        }
    }
}

impl DescribeNode for InvokeFunctionNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Functions", "InvokeFunction"),
            "Invoke Function",
            NodeCategory::Function,
        )
        .with_description("Calls a custom function and outputs its result")
        .with_port(PortDescriptor::input(Self::PORT_ARGS, PortType::Any).array())
        .with_port(PortDescriptor::output(Self::PORT_RESULT, PortType::Any))
        .with_port(PortDescriptor::control_output(Self::PORT_NEXT))
    }
}

inventory::submit!(NodeRegistration {
    descriptor: InvokeFunctionNode::descriptor,
    factory: deserialize_node::<InvokeFunctionNode>,
});

#[async_trait]
impl Node for InvokeFunctionNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let args = (0..cx.port_len(Self::PORT_ARGS))
            .map(|index| cx.input_at(Self::PORT_ARGS, index))
            .collect::<Vec<_>>();
        log::debug!(
            "InvokeFunction '{}': calling '{}' with {} args",
            cx.guid(),
            self.function_name,
            args.len()
        );

        let result = cx.invoke_function(&self.function_name, args).await?;
        cx.set_output(Self::PORT_RESULT, result);
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
    fn test_fields() {
        let node: InvokeFunctionNode =
            serde_json::from_value(serde_json::json!({"functionName": "Add"})).unwrap();
        assert_eq!(node.function_name, "Add");
        assert_eq!(node.serialize_fields(), serde_json::json!({"functionName": "Add"}));
    }

    #[test]
    fn test_args_are_array_inputs() {
        let meta = InvokeFunctionNode::descriptor();
        assert!(meta.port(InvokeFunctionNode::PORT_ARGS).unwrap().array);
        assert_eq!(meta.outputs().filter(|p| !p.is_control()).count(), 1);
    }
}
