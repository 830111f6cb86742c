//! Structural validation of persisted graphs
//!
//! Finds duplicate guids, unknown node types, dangling or mistyped
//! connections and dependency cycles without compiling. Compilation itself
//! tolerates most of these (by skipping links or substituting placeholders);
//! this pass reports them all at once for authoring tools.

use std::collections::{HashMap, HashSet};

use crate::compiler::DependencyGraph;
use crate::conversion::ConversionRegistry;
use crate::data::GraphData;
use crate::descriptor::{NodeDescriptor, PortDescriptor};
use crate::error::CeresError;
use crate::registry::NodeRegistry;
use crate::types::{ExecutionPath, PortDirection, PortType, TypeIdentity};

/// A structural problem in a persisted graph
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Two nodes share a guid
    DuplicateGuid { guid: String },
    /// A node type is not registered, even after redirects
    UnknownNodeType { guid: String, node_type: String },
    /// A connection references a node that does not exist
    UnknownNode { from: String, guid: String },
    /// A connection references a port its node does not declare
    UnknownPort { guid: String, port: String, index: usize },
    /// Connections recorded on a port that is not an output
    ConnectionOnInput { guid: String, port: String },
    /// A link whose port types or kinds cannot be joined
    IncompatiblePorts { from: String, to: String, reason: String },
    /// Dependency-path nodes that depend on each other
    CircularDependency { chain: Vec<String> },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateGuid { guid } => write!(f, "Duplicate node guid '{}'", guid),
            Self::UnknownNodeType { guid, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, guid)
            }
            Self::UnknownNode { from, guid } => {
                write!(f, "Connection from '{}' references unknown node '{}'", from, guid)
            }
            Self::UnknownPort { guid, port, index } => {
                write!(f, "Node '{}' has no port '{}[{}]'", guid, port, index)
            }
            Self::ConnectionOnInput { guid, port } => {
                write!(f, "Connections recorded on input '{}' of node '{}'", port, guid)
            }
            Self::IncompatiblePorts { from, to, reason } => {
                write!(f, "Link {} -> {} is incompatible: {}", from, to, reason)
            }
            Self::CircularDependency { chain } => {
                write!(f, "Circular dependency: {}", chain.join(" -> "))
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a persisted graph
///
/// Returns all validation errors found (not just the first). Local function
/// graphs are validated too.
pub fn validate_graph(
    graph: &GraphData,
    registry: &NodeRegistry,
    conversions: &ConversionRegistry,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_guids(graph, &mut errors);
    let descriptors = resolve_descriptors(graph, registry, &mut errors);
    let links = validate_connections(graph, &descriptors, conversions, &mut errors);
    detect_cycles(graph, &descriptors, &links, &mut errors);

    for function in &graph.functions {
        errors.extend(validate_graph(&function.graph, registry, conversions));
    }
    errors
}

fn validate_guids(graph: &GraphData, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.guid.as_str()) {
            errors.push(ValidationError::DuplicateGuid {
                guid: node.guid.clone(),
            });
        }
    }
}

/// Descriptor per guid; unknown types are reported and left out
fn resolve_descriptors<'g>(
    graph: &'g GraphData,
    registry: &NodeRegistry,
    errors: &mut Vec<ValidationError>,
) -> HashMap<&'g str, NodeDescriptor> {
    let mut descriptors = HashMap::new();
    for node in &graph.nodes {
        let resolved = registry
            .resolve_identity(&TypeIdentity::parse(&node.node_type))
            .and_then(|identity| registry.descriptor(&identity));
        let Some(descriptor) = resolved else {
            errors.push(ValidationError::UnknownNodeType {
                guid: node.guid.clone(),
                node_type: node.node_type.clone(),
            });
            continue;
        };
        let arguments: Option<Vec<PortType>> =
            node.generic_arguments.iter().map(|a| a.parse().ok()).collect();
        match arguments.and_then(|args| descriptor.instantiate(&args)) {
            Some(instantiated) => {
                descriptors.entry(node.guid.as_str()).or_insert(instantiated);
            }
            None => errors.push(ValidationError::UnknownNodeType {
                guid: node.guid.clone(),
                node_type: format!("{}<{}>", node.node_type, node.generic_arguments.join(", ")),
            }),
        }
    }
    descriptors
}

fn find_port<'d>(
    descriptor: &'d NodeDescriptor,
    name: &str,
    index: usize,
) -> Option<&'d PortDescriptor> {
    descriptor
        .port(name)
        .filter(|port| port.array || index == 0)
}

/// Check every recorded connection; returns data links as `(source, target)` guids
fn validate_connections<'g>(
    graph: &'g GraphData,
    descriptors: &HashMap<&str, NodeDescriptor>,
    conversions: &ConversionRegistry,
    errors: &mut Vec<ValidationError>,
) -> Vec<(&'g str, &'g str)> {
    let guids: HashSet<&str> = graph.nodes.iter().map(|n| n.guid.as_str()).collect();
    let mut links = Vec::new();

    for node in &graph.nodes {
        let source_descriptor = descriptors.get(node.guid.as_str());
        for record in node.ports.iter().filter(|r| !r.connections.is_empty()) {
            let output = match source_descriptor {
                Some(descriptor) => match find_port(descriptor, &record.name, record.index) {
                    Some(port) => Some(port),
                    None => {
                        errors.push(ValidationError::UnknownPort {
                            guid: node.guid.clone(),
                            port: record.name.clone(),
                            index: record.index,
                        });
                        continue;
                    }
                },
                None => None,
            };
            if let Some(output) = output {
                if output.direction != PortDirection::Output {
                    errors.push(ValidationError::ConnectionOnInput {
                        guid: node.guid.clone(),
                        port: record.name.clone(),
                    });
                    continue;
                }
            }

            for connection in &record.connections {
                if !guids.contains(connection.node_guid.as_str()) {
                    errors.push(ValidationError::UnknownNode {
                        from: node.guid.clone(),
                        guid: connection.node_guid.clone(),
                    });
                    continue;
                }
                let Some(target_descriptor) = descriptors.get(connection.node_guid.as_str()) else {
                    continue;
                };
                let input =
                    find_port(target_descriptor, &connection.port_name, connection.port_index);
                let Some(input) = input else {
                    errors.push(ValidationError::UnknownPort {
                        guid: connection.node_guid.clone(),
                        port: connection.port_name.clone(),
                        index: connection.port_index,
                    });
                    continue;
                };
                let Some(output) = output else {
                    continue;
                };

                let from = format!("{}.{}", node.guid, output.name);
                let to = format!("{}.{}", connection.node_guid, input.name);
                let reason = if input.direction != PortDirection::Input {
                    Some("target is not an input".to_string())
                } else if output.kind != input.kind {
                    Some(format!("{:?} port linked to {:?} port", output.kind, input.kind))
                } else if !output.is_control()
                    && !conversions.can_convert(&output.port_type, &input.port_type)
                {
                    Some(format!("no conversion {} -> {}", output.port_type, input.port_type))
                } else {
                    None
                };
                match reason {
                    Some(reason) => {
                        errors.push(ValidationError::IncompatiblePorts { from, to, reason })
                    }
                    None if !output.is_control() => {
                        links.push((node.guid.as_str(), connection.node_guid.as_str()));
                    }
                    None => {}
                }
            }
        }
    }
    links
}

fn detect_cycles(
    graph: &GraphData,
    descriptors: &HashMap<&str, NodeDescriptor>,
    links: &[(&str, &str)],
    errors: &mut Vec<ValidationError>,
) {
    let index: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.guid.as_str(), i))
        .collect();

    let mut dependencies = DependencyGraph::default();
    for node in &graph.nodes {
        dependencies.dependencies.push(Vec::new());
        dependencies.forward.push(
            descriptors
                .get(node.guid.as_str())
                .map(|d| d.execution_path == ExecutionPath::Forward)
                .unwrap_or(true),
        );
        dependencies.names.push(node.guid.clone());
    }
    for (source, target) in links {
        let (Some(&s), Some(&t)) = (index.get(source), index.get(target)) else {
            continue;
        };
        if s != t && !dependencies.dependencies[t].contains(&s) {
            dependencies.dependencies[t].push(s);
        }
    }

    if let Err(CeresError::CircularDependency { chain }) = dependencies.compute_paths() {
        errors.push(ValidationError::CircularDependency { chain });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::context::ExecutionContext;
    use crate::descriptor::{DescribeNode, PortDescriptor};
    use crate::error::Result;
    use crate::node::Node;
    use crate::types::NodeCategory;
    use async_trait::async_trait;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Number {}

    impl DescribeNode for Number {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::dependency(
                TypeIdentity::new("Test", "Number"),
                "Number",
                NodeCategory::Value,
            )
            .with_port(PortDescriptor::input("in", PortType::Int))
            .with_port(PortDescriptor::output("out", PortType::Int))
            .with_port(PortDescriptor::output("text", PortType::String))
        }
    }

    #[async_trait]
    impl Node for Number {
        async fn execute(&self, _cx: &mut ExecutionContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register_type::<Number>();
        registry
    }

    #[test]
    fn test_valid_graph() {
        let data = GraphBuilder::new("g")
            .add_node("a", "Test.Number")
            .add_node("b", "Test.Number")
            .connect("a", "out", "b", "in")
            .build();
        let errors = validate_graph(&data, &registry(), &ConversionRegistry::with_defaults());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_reports_every_problem() {
        let data = GraphBuilder::new("g")
            .add_node("a", "Test.Number")
            .add_node("a", "Test.Number")
            .add_node("c", "Gone.Type")
            .add_node("d", "Test.Number")
            .connect("d", "out", "missing", "in")
            .connect("d", "out", "a", "nope")
            .connect("d", "text", "a", "in")
            .build();
        let errors = validate_graph(&data, &registry(), &ConversionRegistry::with_defaults());

        assert!(errors.contains(&ValidationError::DuplicateGuid { guid: "a".into() }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownNodeType { guid, .. } if guid == "c")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownNode { guid, .. } if guid == "missing")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownPort { port, .. } if port == "nope")));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::IncompatiblePorts { .. })));
    }

    #[test]
    fn test_detects_cycle() {
        let data = GraphBuilder::new("g")
            .add_node("x", "Test.Number")
            .add_node("y", "Test.Number")
            .connect("x", "out", "y", "in")
            .connect("y", "out", "x", "in")
            .build();
        let errors = validate_graph(&data, &registry(), &ConversionRegistry::with_defaults());
        assert!(errors
            .iter()
            .any(|e| matches!(
                e,
                ValidationError::CircularDependency { chain } if chain.len() == 3
            )));
    }
}
