//! Branch Node
//!
//! Selects one of two control successors from a boolean condition.

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity, TypeRedirect,
};
use serde::{Deserialize, Serialize};

/// Branch Node
///
/// # Inputs
/// - `condition` - Boolean condition (unset reads as `false`)
///
/// # Outputs
/// - `true` - Successor when the condition holds
/// - `false` - Successor otherwise
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchNode {}

impl BranchNode {
    pub const PORT_CONDITION: &'static str = "condition";
    pub const PORT_TRUE: &'static str = "true";
    pub const PORT_FALSE: &'static str = "false";
}

impl DescribeNode for BranchNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Flow", "Branch"),
            "Branch",
            NodeCategory::Flow,
        )
        .with_description("Continues on 'true' or 'false' depending on the condition")
        .with_port(PortDescriptor::input(Self::PORT_CONDITION, PortType::Bool))
        .with_port(PortDescriptor::control_output(Self::PORT_TRUE))
        .with_port(PortDescriptor::control_output(Self::PORT_FALSE))
    }
}

inventory::submit!(NodeRegistration {
    descriptor: BranchNode::descriptor,
    factory: deserialize_node::<BranchNode>,
});

// graphs saved before the flow nodes moved into `Ceres.Flow`
inventory::submit!(TypeRedirect {
    from: "Ceres.Nodes.If",
    to: "Ceres.Flow.Branch",
});

#[async_trait]
impl Node for BranchNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let condition: bool = cx.input(Self::PORT_CONDITION);
        log::debug!("Branch '{}': condition={}", cx.guid(), condition);
        if condition {
            cx.continue_with(Self::PORT_TRUE);
        } else {
            cx.continue_with(Self::PORT_FALSE);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        let meta = BranchNode::descriptor();
        assert_eq!(meta.identity.full_name(), "Ceres.Flow.Branch");
        assert_eq!(meta.category, NodeCategory::Flow);
        assert_eq!(meta.inputs().count(), 2);
        assert_eq!(meta.outputs().count(), 2);
        assert!(meta.port(BranchNode::PORT_TRUE).unwrap().is_control());
    }
}
