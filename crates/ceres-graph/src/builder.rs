//! Fluent builder for persisted graphs
//!
//! Produces [`GraphData`] programmatically, the same shape an authoring tool
//! would save. Connections are recorded on the output side.

use crate::data::{FunctionData, GraphData, NodeData, PortConnection, Position};
use crate::descriptor::FLOW_INPUT;
use crate::groups::NodeGroup;
use crate::types::NodeGuid;
use crate::variable::VariableData;

/// Fluent builder for [`GraphData`]
///
/// # Example
///
/// ```ignore
/// let data = GraphBuilder::new("greeter")
///     .add_node("start", "Ceres.Flow.ExecutionEvent")
///     .with_fields(serde_json::json!({"eventName": "Start"}))
///     .add_node("log", "Ceres.Flow.Log")
///     .with_constant("message", serde_json::json!("hello"))
///     .connect_control("start", "next", "log")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    data: GraphData,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            data: GraphData::new(name),
        }
    }

    /// Add a node with an explicit guid
    pub fn add_node(mut self, guid: impl Into<NodeGuid>, node_type: impl Into<String>) -> Self {
        self.data.nodes.push(NodeData::new(guid, node_type));
        self
    }

    /// Add a node with a generated guid
    pub fn add_node_auto(self, node_type: impl Into<String>) -> Self {
        self.add_node(uuid::Uuid::new_v4().to_string(), node_type)
    }

    /// Guid of the most recently added node
    pub fn last_guid(&self) -> Option<&str> {
        self.data.nodes.last().map(|n| n.guid.as_str())
    }

    fn last_node(&mut self) -> Option<&mut NodeData> {
        self.data.nodes.last_mut()
    }

    fn node_mut(&mut self, guid: &str) -> Option<&mut NodeData> {
        self.data.nodes.iter_mut().find(|n| n.guid == guid)
    }

    /// Set the field blob of the most recently added node
    ///
    /// Must be called immediately after `add_node`.
    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        if let Some(node) = self.last_node() {
            node.serialized_data = fields.to_string();
        }
        self
    }

    /// Set generic argument type names on the most recently added node
    pub fn with_generic_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(node) = self.last_node() {
            node.generic_arguments = arguments.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn at(mut self, position: impl Into<Position>) -> Self {
        if let Some(node) = self.last_node() {
            node.position = position.into();
        }
        self
    }

    /// Constant value of an input on the most recently added node
    pub fn with_constant(self, port: &str, value: serde_json::Value) -> Self {
        self.with_constant_at(port, 0, value)
    }

    /// Constant value of an array input slot on the most recently added node
    pub fn with_constant_at(mut self, port: &str, index: usize, value: serde_json::Value) -> Self {
        if let Some(node) = self.last_node() {
            node.port_mut(port, index).value = Some(value);
        }
        self
    }

    /// Record a data link `from.from_port -> to.to_port`
    pub fn connect(self, from: &str, from_port: &str, to: &str, to_port: &str) -> Self {
        self.connect_at((from, from_port, 0), (to, to_port, 0))
    }

    /// Record a link between array slots
    ///
    /// Unknown source guids are ignored; dangling targets are recorded as
    /// given and resolved (or skipped) at compile time.
    pub fn connect_at(mut self, from: (&str, &str, usize), to: (&str, &str, usize)) -> Self {
        let (from_guid, from_port, from_index) = from;
        let (to_guid, to_port, to_index) = to;
        match self.node_mut(from_guid) {
            Some(node) => node
                .port_mut(from_port, from_index)
                .connections
                .push(PortConnection::new(to_guid, to_port, to_index)),
            None => log::warn!("GraphBuilder: connect from unknown node '{}' ignored", from_guid),
        }
        self
    }

    /// Link a control output to the flow input of `to`
    pub fn connect_control(self, from: &str, port: &str, to: &str) -> Self {
        self.connect_at((from, port, 0), (to, FLOW_INPUT, 0))
    }

    /// Link control output slot `index` to the flow input of `to`
    pub fn connect_control_at(self, from: &str, port: &str, index: usize, to: &str) -> Self {
        self.connect_at((from, port, index), (to, FLOW_INPUT, 0))
    }

    /// Add a blackboard variable
    pub fn add_variable(mut self, variable: VariableData) -> Self {
        self.data.variables.push(variable);
        self
    }

    pub fn add_group(mut self, group: NodeGroup) -> Self {
        self.data.node_groups.push(group);
        self
    }

    /// Add a local function sub-graph
    pub fn add_function(mut self, name: impl Into<String>, graph: GraphData) -> Self {
        self.data.functions.push(FunctionData {
            name: name.into(),
            graph,
        });
        self
    }

    pub fn build(self) -> GraphData {
        self.data
    }
}
