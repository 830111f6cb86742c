//! Flow nodes
//!
//! Entry events and control flow: branches, sequences, loops, delays.

mod branch;
mod delay;
mod execution_event;
mod for_loop;
mod log_node;
mod sequence;

pub use branch::BranchNode;
pub use delay::{scheduler_handle_type, DelayNode, SCHEDULER_HANDLE};
pub use execution_event::ExecutionEventNode;
pub use for_loop::ForLoopNode;
pub use log_node::LogNode;
pub use sequence::SequenceNode;
