//! Ceres Graph - visual scripting graph model and execution engine
//!
//! This crate provides the core of a node-graph scripting layer:
//!
//! - Typed ports with a registry of implicit conversions
//! - Shared, bindable variables with blackboard and global scopes
//! - Forward (control-chained) and Dependency (pull-evaluated) nodes
//! - A compiler that links ports and caches per-node dependency paths
//! - An async executor for event dispatch, sub-executions and function calls
//! - A persisted JSON format with type redirects and placeholder recovery
//!
//! # Architecture
//!
//! Persisted [`GraphData`] is hydrated into a [`Graph`] through a
//! [`NodeRegistry`], compiled with [`CompileOptions`], and dispatched by an
//! [`Executor`]. Nodes implement [`Node`] and see the running dispatch through
//! an [`ExecutionContext`]. Progress is reported as [`GraphEvent`]s to an
//! [`EventSink`].
//!
//! # Example
//!
//! ```ignore
//! use ceres_graph::{CompileOptions, DispatchRequest, Executor, Graph, GraphData, NodeRegistry};
//!
//! let data = GraphData::load("graphs/door.json").await?;
//! let graph = Graph::build(&data, &NodeRegistry::with_builtins(), &CompileOptions::default())?;
//! let outcome = Executor::default()
//!     .dispatch(&graph, DispatchRequest::event("Open"))
//!     .await?;
//! ```

pub mod arena;
pub mod builder;
pub mod compiler;
pub mod config;
pub mod context;
pub mod conversion;
pub mod data;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod executor;
pub mod extensions;
pub mod graph;
pub mod groups;
pub mod node;
pub mod port;
pub mod redirect;
pub mod registry;
pub mod scheduler;
pub mod types;
pub mod validation;
pub mod value;
pub mod variable;

// Re-export key types
pub use arena::NodeHandle;
pub use builder::GraphBuilder;
pub use compiler::{CompileOptions, DependencyGraph, DependencyPaths};
pub use config::{EngineConfig, LOG_ENV};
pub use context::ExecutionContext;
pub use conversion::{Compatibility, ConversionRegistry, Converter, PortConversion};
pub use data::{
    ConnectionRecord, FunctionData, GraphData, NodeData, PortConnection, PortData, Position,
};
pub use descriptor::{DescribeNode, NodeDescriptor, PortDescriptor, VariableDescriptor, FLOW_INPUT};
pub use error::{CeresError, Result};
pub use events::{ChannelEventSink, EventError, EventSink, GraphEvent, NullEventSink, VecEventSink};
pub use executor::{
    DispatchOutcome, DispatchRequest, Entry, EventPayload, Executor, FunctionLibrary,
};
pub use extensions::{extension_keys, ExecutorExtensions};
pub use graph::{Graph, GraphNode, LocalFunction, MAX_ARRAY_SLOTS};
pub use groups::NodeGroup;
pub use node::{InvalidNode, Node};
pub use port::{Port, PortAddress, PortLink};
pub use redirect::{TypeRedirect, TypeRedirects};
pub use registry::{deserialize_node, NodeFactory, NodeRegistration, NodeRegistry, ResolvedNode};
pub use scheduler::{CancelHandle, Scheduler, TokioScheduler, WaitToken};
pub use types::{
    ExecutionPath, NodeCategory, NodeGuid, PortCapacity, PortDirection, PortKind, PortType,
    TypeIdentity,
};
pub use validation::{validate_graph, ValidationError};
pub use value::{FromValue, HostObject, ObjectRef, Value};
pub use variable::{Blackboard, GlobalVariables, SharedVariable, VariableData};

// Re-exported for `inventory::submit!` in downstream node crates
pub use inventory;
