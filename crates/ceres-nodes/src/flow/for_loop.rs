//! For Loop Node
//!
//! Counts from `first` up to (excluding) `last`, running the `body` chain
//! once per step, then continues on `completed`.

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity,
};
use serde::{Deserialize, Serialize};

/// For Loop Node
///
/// # Inputs
/// - `first` - First index (inclusive)
/// - `last` - End index (exclusive)
///
/// # Outputs
/// - `index` - Current index, readable by the body chain
/// - `body` - Chain run once per index
/// - `completed` - Successor after the last iteration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForLoopNode {}

impl ForLoopNode {
    pub const PORT_FIRST: &'static str = "first";
    pub const PORT_LAST: &'static str = "last";
    pub const PORT_INDEX: &'static str = "index";
    pub const PORT_BODY: &'static str = "body";
    pub const PORT_COMPLETED: &'static str = "completed";
}

impl DescribeNode for ForLoopNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Flow", "ForLoop"),
            "For Loop",
            NodeCategory::Flow,
        )
        .with_description("Runs 'body' for each index in first..last")
        .with_port(PortDescriptor::input(Self::PORT_FIRST, PortType::Int))
        .with_port(PortDescriptor::input(Self::PORT_LAST, PortType::Int))
        .with_port(PortDescriptor::output(Self::PORT_INDEX, PortType::Int))
        .with_port(PortDescriptor::control_output(Self::PORT_BODY))
        .with_port(PortDescriptor::control_output(Self::PORT_COMPLETED))
    }
}

inventory::submit!(NodeRegistration {
    descriptor: ForLoopNode::descriptor,
    factory: deserialize_node::<ForLoopNode>,
});

#[async_trait]
impl Node for ForLoopNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let first: i64 = cx.input(Self::PORT_FIRST);
        let last: i64 = cx.input(Self::PORT_LAST);
        log::debug!("ForLoop '{}': {}..{}", cx.guid(), first, last);

        for index in first..last {
            cx.set_output(Self::PORT_INDEX, index);
            cx.forward_port(Self::PORT_BODY, 0).await?;
        }
        cx.continue_with(Self::PORT_COMPLETED);
        Ok(())
    }
}
