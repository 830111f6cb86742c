//! Custom function nodes

mod function_input;
mod function_output;
mod invoke_function;

pub use function_input::FunctionInputNode;
pub use function_output::FunctionOutputNode;
pub use invoke_function::InvokeFunctionNode;
