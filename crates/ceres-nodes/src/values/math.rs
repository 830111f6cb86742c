//! Math nodes
//!
//! Pure float arithmetic and comparison. Int outputs linked into these
//! inputs widen through the registered `int -> float` conversion; ints
//! arriving untyped (through `any` ports) are widened on read.

use async_trait::async_trait;
use ceres_graph::{
    deserialize_node, DescribeNode, ExecutionContext, Node, NodeCategory, NodeDescriptor,
    NodeRegistration, PortDescriptor, PortType, Result, TypeIdentity, Value,
};
use serde::{Deserialize, Serialize};

const PORT_A: &str = "a";
const PORT_B: &str = "b";
const PORT_RESULT: &str = "result";

fn binary_descriptor(class: &str, label: &str, result: PortType) -> NodeDescriptor {
    NodeDescriptor::dependency(TypeIdentity::new("Ceres.Math", class), label, NodeCategory::Value)
        .with_port(PortDescriptor::input(PORT_A, PortType::Float))
        .with_port(PortDescriptor::input(PORT_B, PortType::Float))
        .with_port(PortDescriptor::output(PORT_RESULT, result))
}

fn number(cx: &ExecutionContext<'_>, port: &str) -> f64 {
    match cx.input_value(port) {
        Value::Int(i) => i as f64,
        other => other.get_or_default(),
    }
}

/// `result = a + b`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddNode {}

impl DescribeNode for AddNode {
    fn descriptor() -> NodeDescriptor {
        binary_descriptor("Add", "Add", PortType::Float).with_description("Adds two numbers")
    }
}

inventory::submit!(NodeRegistration {
    descriptor: AddNode::descriptor,
    factory: deserialize_node::<AddNode>,
});

#[async_trait]
impl Node for AddNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let a = number(cx, PORT_A);
        let b = number(cx, PORT_B);
        cx.set_output(PORT_RESULT, a + b);
        Ok(())
    }
}

/// `result = a * b`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiplyNode {}

impl DescribeNode for MultiplyNode {
    fn descriptor() -> NodeDescriptor {
        binary_descriptor("Multiply", "Multiply", PortType::Float)
            .with_description("Multiplies two numbers")
    }
}

inventory::submit!(NodeRegistration {
    descriptor: MultiplyNode::descriptor,
    factory: deserialize_node::<MultiplyNode>,
});

#[async_trait]
impl Node for MultiplyNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let a = number(cx, PORT_A);
        let b = number(cx, PORT_B);
        cx.set_output(PORT_RESULT, a * b);
        Ok(())
    }
}

/// Comparison operator of a [`CompareNode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Less,
    LessEqual,
    #[default]
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
}

impl CompareOp {
    pub fn apply(self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Less => a < b,
            CompareOp::LessEqual => a <= b,
            CompareOp::Equal => a == b,
            CompareOp::NotEqual => a != b,
            CompareOp::Greater => a > b,
            CompareOp::GreaterEqual => a >= b,
        }
    }
}

/// `result = a <op> b`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompareNode {
    #[serde(default)]
    pub op: CompareOp,
}

impl DescribeNode for CompareNode {
    fn descriptor() -> NodeDescriptor {
        binary_descriptor("Compare", "Compare", PortType::Bool)
            .with_description("Compares two numbers")
    }
}

inventory::submit!(NodeRegistration {
    descriptor: CompareNode::descriptor,
    factory: deserialize_node::<CompareNode>,
});

#[async_trait]
impl Node for CompareNode {
    async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
        let a = number(cx, PORT_A);
        let b = number(cx, PORT_B);
        cx.set_output(PORT_RESULT, self.op.apply(a, b));
        Ok(())
    }

    fn serialize_fields(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
