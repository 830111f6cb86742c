//! Host object nodes

mod describe_target;

pub use describe_target::DescribeTargetNode;
