//! Sequence Node
//!
//! Runs several control chains one after another.

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, Result, TypeIdentity,
};
use serde::{Deserialize, Serialize};

/// Sequence Node
///
/// Forwards into every linked `then[i]` slot in index order, awaiting each
/// chain to completion before starting the next. Terminal afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceNode {}

impl SequenceNode {
    pub const PORT_THEN: &'static str = "then";
}

impl DescribeNode for SequenceNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Flow", "Sequence"),
            "Sequence",
            NodeCategory::Flow,
        )
        .with_description("Runs each 'then' chain to completion, in order")
        .with_port(PortDescriptor::control_output(Self::PORT_THEN).array())
    }
}

inventory::submit!(NodeRegistration {
    descriptor: SequenceNode::descriptor,
    factory: deserialize_node::<SequenceNode>,
});

#[async_trait]
impl Node for SequenceNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let count = cx.port_len(Self::PORT_THEN);
        for index in 0..count {
            cx.forward_port(Self::PORT_THEN, index).await?;
        }
        Ok(())
    }
}
