//! Delay Node
//!
//! Suspends the dispatch on the host scheduler. The wait's id is published
//! on `handle` as a custom `SchedulerHandle` value, which converts to a float
//! for graph-level storage.

use std::time::Duration;

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, CeresError, DescribeNode, ExecutionContext, Node, NodeCategory,
    NodeDescriptor, NodeRegistration, PortConversion, PortDescriptor, PortType, Result,
    TypeIdentity, Value,
};
use serde::{Deserialize, Serialize};

/// Custom port type name of a scheduler wait handle
pub const SCHEDULER_HANDLE: &str = "SchedulerHandle";

/// Port type of a scheduler wait handle
pub fn scheduler_handle_type() -> PortType {
    PortType::Custom(SCHEDULER_HANDLE.to_string())
}

fn handle_to_float(value: &Value) -> Value {
    Value::Float(value.get_or_default::<i64>() as f64)
}

inventory::submit!(PortConversion {
    from: scheduler_handle_type,
    to: || PortType::Float,
    convert: handle_to_float,
});

/// Delay Node
///
/// # Inputs
/// - `seconds` - Wait duration; negative or non-finite values do not wait
///
/// # Outputs
/// - `handle` - Id of the pending wait, cancellable through the scheduler
/// - `next` - Successor once the wait completes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelayNode {}

impl DelayNode {
    pub const PORT_SECONDS: &'static str = "seconds";
    pub const PORT_HANDLE: &'static str = "handle";
    pub const PORT_NEXT: &'static str = "next";
}

impl DescribeNode for DelayNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::forward(
            TypeIdentity::new("Ceres.Flow", "Delay"),
            "Delay",
            NodeCategory::Flow,
        )
        .with_description("Waits on the host scheduler, then continues")
        .with_port(PortDescriptor::input(Self::PORT_SECONDS, PortType::Float))
        .with_port(PortDescriptor::output(Self::PORT_HANDLE, scheduler_handle_type()))
        .with_port(PortDescriptor::control_output(Self::PORT_NEXT))
    }
}

inventory::submit!(NodeRegistration {
    descriptor: DelayNode::descriptor,
    factory: deserialize_node::<DelayNode>,
});

#[async_trait]
impl Node for DelayNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let seconds: f64 = cx.input(Self::PORT_SECONDS);
        let scheduler = cx
            .scheduler()
            .ok_or_else(|| CeresError::failed("no scheduler registered for Delay"))?;

        let duration = Duration::try_from_secs_f64(seconds).unwrap_or_default();
        let token = scheduler.delay(duration);
        let id = i64::try_from(token.id()).unwrap_or(i64::MAX);
        cx.set_output(Self::PORT_HANDLE, Value::Int(id));
        log::debug!("Delay '{}': waiting {:?} (wait {})", cx.guid(), duration, id);

        token.wait().await?;
        cx.continue_with(Self::PORT_NEXT);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceres_graph::ConversionRegistry;

    #[test]
    fn test_handle_converts_to_float() {
        let registry = ConversionRegistry::with_defaults();
        let converter = registry
            .get(&scheduler_handle_type(), &PortType::Float)
            .expect("handle conversion registered");
        assert_eq!(converter(&Value::Int(7)), Value::Float(7.0));
        assert!(!registry.can_convert(&scheduler_handle_type(), &PortType::String));
    }
}
