//! Ceres Nodes
//!
//! Built-in node types for the Ceres graph engine. Every type registers
//! itself at link time, so `NodeRegistry::with_builtins()` sees them as soon
//! as this crate is linked.
//!
//! # Categories
//!
//! - **Flow**: Event entries and control flow (branch, sequence, loop, delay, log)
//! - **Values**: Literals and float math
//! - **Variables**: Reading and writing shared variables
//! - **Functions**: Custom function entry, return and invocation
//! - **Objects**: Host object helpers

pub mod flow;
pub mod functions;
pub mod objects;
pub mod setup;
pub mod values;
pub mod variables;

pub use flow::*;
pub use functions::*;
pub use objects::*;
pub use setup::setup_extensions;
pub use values::*;
pub use variables::*;
