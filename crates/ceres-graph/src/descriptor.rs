//! Node descriptor trait and metadata types
//!
//! Every node type declares its ports and variables through a static
//! [`NodeDescriptor`] table instead of having them discovered at runtime.
//! The registry computes each descriptor once per type and caches it.
//!
//! # Example
//!
//! ```ignore
//! impl DescribeNode for AddNode {
//!     fn descriptor() -> NodeDescriptor {
//!         NodeDescriptor::dependency(
//!             TypeIdentity::new("Ceres.Math", "Add"),
//!             "Add",
//!             NodeCategory::Value,
//!         )
//!         .with_port(PortDescriptor::input("a", PortType::Float))
//!         .with_port(PortDescriptor::input("b", PortType::Float))
//!         .with_port(PortDescriptor::output("result", PortType::Float))
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{
    ExecutionPath, NodeCategory, PortCapacity, PortDirection, PortKind, PortType, TypeIdentity,
};

/// Name of the control input every Forward node carries
pub const FLOW_INPUT: &str = "input";

/// Trait for node types that can describe their metadata
pub trait DescribeNode {
    /// Get the static metadata for this node type
    fn descriptor() -> NodeDescriptor
    where
        Self: Sized;
}

/// Metadata for a single port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDescriptor {
    /// Port name, unique per node type
    pub name: String,
    /// Human-readable label
    pub label: String,
    /// Declared type (`node` for control ports)
    pub port_type: PortType,
    pub direction: PortDirection,
    pub capacity: PortCapacity,
    pub kind: PortKind,
    /// Array-valued port: one slot per persisted array element
    pub array: bool,
}

impl PortDescriptor {
    fn new(
        name: impl Into<String>,
        port_type: PortType,
        direction: PortDirection,
        kind: PortKind,
    ) -> Self {
        let name = name.into();
        let capacity = match (direction, kind) {
            (PortDirection::Input, PortKind::Data) => PortCapacity::Single,
            (PortDirection::Output, PortKind::Data) => PortCapacity::Multi,
            (PortDirection::Input, PortKind::Control) => PortCapacity::Multi,
            (PortDirection::Output, PortKind::Control) => PortCapacity::Single,
        };
        Self {
            label: name.clone(),
            name,
            port_type,
            direction,
            capacity,
            kind,
            array: false,
        }
    }

    /// Data input port
    pub fn input(name: impl Into<String>, port_type: PortType) -> Self {
        Self::new(name, port_type, PortDirection::Input, PortKind::Data)
    }

    /// Data output port
    pub fn output(name: impl Into<String>, port_type: PortType) -> Self {
        Self::new(name, port_type, PortDirection::Output, PortKind::Data)
    }

    /// Control-flow input (NodePort); accepts many predecessors
    pub fn control_input(name: impl Into<String>) -> Self {
        Self::new(name, PortType::Node, PortDirection::Input, PortKind::Control)
    }

    /// Control-flow output (NodePort); resolves to a single successor
    pub fn control_output(name: impl Into<String>) -> Self {
        Self::new(name, PortType::Node, PortDirection::Output, PortKind::Control)
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Mark this port as array-valued
    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    /// Whether this is a NodePort
    pub fn is_control(&self) -> bool {
        self.kind == PortKind::Control
    }
}

/// Metadata for a variable owned by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDescriptor {
    /// Field name in the node's persisted data
    pub field: String,
    /// Declared value type
    pub value_type: PortType,
}

impl VariableDescriptor {
    pub fn new(field: impl Into<String>, value_type: PortType) -> Self {
        Self {
            field: field.into(),
            value_type,
        }
    }
}

/// Complete metadata for a node type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// Stable type identity used in persisted data
    pub identity: TypeIdentity,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    #[serde(default)]
    pub description: String,
    pub category: NodeCategory,
    pub execution_path: ExecutionPath,
    /// Number of generic arguments the type expects
    #[serde(default)]
    pub generic_parameters: usize,
    pub ports: Vec<PortDescriptor>,
    #[serde(default)]
    pub variables: Vec<VariableDescriptor>,
}

impl NodeDescriptor {
    /// Forward node: gets the standard control input
    pub fn forward(
        identity: TypeIdentity,
        label: impl Into<String>,
        category: NodeCategory,
    ) -> Self {
        Self {
            identity,
            label: label.into(),
            description: String::new(),
            category,
            execution_path: ExecutionPath::Forward,
            generic_parameters: 0,
            ports: vec![PortDescriptor::control_input(FLOW_INPUT)],
            variables: Vec::new(),
        }
    }

    /// Dependency (pull-evaluated) node
    pub fn dependency(
        identity: TypeIdentity,
        label: impl Into<String>,
        category: NodeCategory,
    ) -> Self {
        Self {
            identity,
            label: label.into(),
            description: String::new(),
            category,
            execution_path: ExecutionPath::Dependency,
            generic_parameters: 0,
            ports: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_port(mut self, port: PortDescriptor) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_variable(mut self, variable: VariableDescriptor) -> Self {
        self.variables.push(variable);
        self
    }

    /// Declare the number of generic arguments
    pub fn generic(mut self, parameters: usize) -> Self {
        self.generic_parameters = parameters;
        self
    }

    /// Find a port by name
    pub fn port(&self, name: &str) -> Option<&PortDescriptor> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Input ports
    pub fn inputs(&self) -> impl Iterator<Item = &PortDescriptor> {
        self.ports.iter().filter(|p| p.direction == PortDirection::Input)
    }

    /// Output ports
    pub fn outputs(&self) -> impl Iterator<Item = &PortDescriptor> {
        self.ports.iter().filter(|p| p.direction == PortDirection::Output)
    }

    /// Substitute generic placeholders with concrete argument types
    ///
    /// Returns `None` when the argument count does not match.
    pub fn instantiate(&self, arguments: &[PortType]) -> Option<NodeDescriptor> {
        if arguments.len() != self.generic_parameters {
            return None;
        }
        let mut concrete = self.clone();
        for port in &mut concrete.ports {
            port.port_type = port.port_type.instantiate(arguments)?;
        }
        for variable in &mut concrete.variables {
            variable.value_type = variable.value_type.instantiate(arguments)?;
        }
        Some(concrete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal_descriptor() -> NodeDescriptor {
        NodeDescriptor::dependency(
            TypeIdentity::new("Test", "Literal"),
            "Literal",
            NodeCategory::Value,
        )
        .generic(1)
        .with_port(PortDescriptor::output("value", PortType::Generic(0)))
    }

    #[test]
    fn test_default_capacities() {
        assert_eq!(PortDescriptor::input("a", PortType::Int).capacity, PortCapacity::Single);
        assert_eq!(PortDescriptor::output("a", PortType::Int).capacity, PortCapacity::Multi);
        assert_eq!(PortDescriptor::control_input("in").capacity, PortCapacity::Multi);
        assert_eq!(PortDescriptor::control_output("next").capacity, PortCapacity::Single);
    }

    #[test]
    fn test_forward_nodes_get_flow_input() {
        let identity = TypeIdentity::new("Test", "Log");
        let desc = NodeDescriptor::forward(identity, "Log", NodeCategory::Debug);
        let input = desc.port(FLOW_INPUT).unwrap();
        assert!(input.is_control());
        assert_eq!(input.direction, PortDirection::Input);
        assert_eq!(desc.execution_path, ExecutionPath::Forward);
    }

    #[test]
    fn test_instantiate_generic() {
        let desc = literal_descriptor();
        let concrete = desc.instantiate(&[PortType::Int]).unwrap();
        assert_eq!(concrete.port("value").unwrap().port_type, PortType::Int);
        assert!(desc.instantiate(&[]).is_none());
        assert!(desc.instantiate(&[PortType::Int, PortType::Float]).is_none());
    }

    #[test]
    fn test_descriptor_serialization() {
        let json = serde_json::to_string(&literal_descriptor()).unwrap();
        assert!(json.contains("executionPath"));
        assert!(json.contains("\"generic:0\""));
    }
}
