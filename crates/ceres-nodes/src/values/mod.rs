//! Value nodes
//!
//! Pull-evaluated constants and math.

mod literal;
mod math;

pub use literal::LiteralNode;
pub use math::{AddNode, CompareNode, CompareOp, MultiplyNode};
