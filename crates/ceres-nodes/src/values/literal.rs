//! Literal Node
//!
//! Generic constant producer: `Ceres.Values.Literal` with one generic
//! argument `T` outputs its persisted `value` decoded as `T`.

use std::sync::Arc;

use async_trait::async_trait;
use ceres_graph::{
    CeresError, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity, Value,
};

/// Literal Node
///
/// # Outputs
/// - `value` - The constant, typed by the generic argument
#[derive(Debug, Clone)]
pub struct LiteralNode {
    value_type: PortType,
    raw: serde_json::Value,
    value: Value,
}

impl LiteralNode {
    pub const PORT_VALUE: &'static str = "value";

    /// Literal of `value_type` decoded from persisted JSON
    pub fn new(value_type: PortType, raw: serde_json::Value) -> Self {
        let value = Value::from_json_typed(&raw, &value_type);
        Self {
            value_type,
            raw,
            value,
        }
    }

    pub fn value_type(&self) -> &PortType {
        &self.value_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn create(fields: &serde_json::Value, generic_arguments: &[PortType]) -> Result<Arc<dyn Node>> {
        let value_type = generic_arguments
            .first()
            .cloned()
            .ok_or_else(|| {
                CeresError::TypeResolution("Literal needs one generic argument".into())
            })?;
        let raw = fields
            .get(Self::PORT_VALUE)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        Ok(Arc::new(Self::new(value_type, raw)))
    }
}

impl DescribeNode for LiteralNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::dependency(
            TypeIdentity::new("Ceres.Values", "Literal"),
            "Literal",
            NodeCategory::Value,
        )
        .with_description("Outputs a constant of the generic argument's type")
        .generic(1)
        .with_port(PortDescriptor::output(Self::PORT_VALUE, PortType::Generic(0)))
    }
}

inventory::submit!(NodeRegistration {
    descriptor: LiteralNode::descriptor,
    factory: LiteralNode::create,
});

#[async_trait]
impl Node for LiteralNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        cx.set_output(Self::PORT_VALUE, self.value.clone());
        Ok(())
    }

    fn serialize_fields(&self) -> serde_json::Value {
        serde_json::json!({ "value": self.raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_decoded_by_generic_argument() {
        let node = LiteralNode::new(PortType::Int, serde_json::json!(5));
        assert_eq!(node.value(), &Value::Int(5));

        let node = LiteralNode::new(PortType::Float, serde_json::json!("not a number"));
        assert_eq!(node.value(), &Value::Float(0.0));
        assert_eq!(node.serialize_fields(), serde_json::json!({"value": "not a number"}));
    }

    #[test]
    fn test_create_requires_generic_argument() {
        assert!(LiteralNode::create(&serde_json::json!({"value": 1}), &[]).is_err());
        assert!(LiteralNode::create(&serde_json::json!({"value": 1}), &[PortType::Int]).is_ok());
    }
}
