//! Variable nodes

mod get_variable;
mod set_variable;

pub use get_variable::GetVariableNode;
pub use set_variable::SetVariableNode;
