//! Persisted graph format
//!
//! `GraphData` is the version-stable snapshot exchanged with authoring tools
//! and hosts. It is never executed directly: [`crate::Graph::from_data`]
//! hydrates it and [`crate::Graph::compile`] wires ports from the connection
//! records stored here.
//!
//! Connections are recorded on the *output* side as
//! `(nodeGuid, portName, portIndex)` triples. Array-valued ports persist one
//! [`PortData`] record per slot, distinguished by `index`.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::groups::NodeGroup;
use crate::types::NodeGuid;
use crate::variable::VariableData;

/// Target of a persisted port connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortConnection {
    pub node_guid: NodeGuid,
    pub port_name: String,
    #[serde(default)]
    pub port_index: usize,
}

impl PortConnection {
    pub fn new(
        node_guid: impl Into<NodeGuid>,
        port_name: impl Into<String>,
        port_index: usize,
    ) -> Self {
        Self {
            node_guid: node_guid.into(),
            port_name: port_name.into(),
            port_index,
        }
    }
}

/// Persisted state of one port slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortData {
    pub name: String,
    /// Array slot; always 0 for scalar ports
    #[serde(default)]
    pub index: usize,
    /// Constant value of an unconnected input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<PortConnection>,
}

impl PortData {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            value: None,
            connections: Vec::new(),
        }
    }
}

/// Editor position of a node; inert to execution
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Persisted node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub guid: NodeGuid,
    /// Type identity string, `Namespace.Class[, Assembly]`
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_arguments: Vec<String>,
    #[serde(default)]
    pub position: Position,
    /// JSON text of the node's simple fields and owned variables
    #[serde(default)]
    pub serialized_data: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortData>,
}

impl NodeData {
    pub fn new(guid: impl Into<NodeGuid>, node_type: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            node_type: node_type.into(),
            generic_arguments: Vec::new(),
            position: Position::default(),
            serialized_data: String::new(),
            ports: Vec::new(),
        }
    }

    /// Parsed field blob; an empty or malformed blob reads as an empty object
    pub fn fields(&self) -> serde_json::Value {
        if self.serialized_data.trim().is_empty() {
            return serde_json::Value::Object(serde_json::Map::new());
        }
        serde_json::from_str(&self.serialized_data)
            .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Find the record of a port slot
    pub fn port(&self, name: &str, index: usize) -> Option<&PortData> {
        self.ports.iter().find(|p| p.name == name && p.index == index)
    }

    /// Find or create the record of a port slot
    pub fn port_mut(&mut self, name: &str, index: usize) -> &mut PortData {
        let position = self
            .ports
            .iter()
            .position(|p| p.name == name && p.index == index);
        match position {
            Some(i) => &mut self.ports[i],
            None => {
                self.ports.push(PortData::new(name, index));
                let last = self.ports.len() - 1;
                &mut self.ports[last]
            }
        }
    }

    /// Number of persisted slots for an array port (highest index + 1)
    pub fn array_len(&self, name: &str) -> usize {
        self.ports
            .iter()
            .filter(|p| p.name == name)
            .map(|p| p.index.saturating_add(1))
            .max()
            .unwrap_or(0)
    }
}

/// Local function sub-graph stored inside its parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionData {
    pub name: String,
    pub graph: GraphData,
}

/// One connection, flattened: `(source guid, source port, source index) -> target`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionRecord {
    pub source: NodeGuid,
    pub source_port: String,
    pub source_index: usize,
    pub target: NodeGuid,
    pub target_port: String,
    pub target_index: usize,
}

/// Persisted graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub variables: Vec<VariableData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_groups: Vec<NodeGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionData>,
}

impl GraphData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a graph file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&text)
    }

    /// Write a graph file, creating parent directories
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, self.to_json_pretty()?).await?;
        Ok(())
    }

    pub fn node(&self, guid: &str) -> Option<&NodeData> {
        self.nodes.iter().find(|n| n.guid == guid)
    }

    pub fn node_mut(&mut self, guid: &str) -> Option<&mut NodeData> {
        self.nodes.iter_mut().find(|n| n.guid == guid)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionData> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Sorted connection table, used to compare graphs structurally
    pub fn connection_table(&self) -> Vec<ConnectionRecord> {
        let mut table: Vec<ConnectionRecord> = self
            .nodes
            .iter()
            .flat_map(|node| {
                node.ports.iter().flat_map(move |port| {
                    port.connections.iter().map(move |c| ConnectionRecord {
                        source: node.guid.clone(),
                        source_port: port.name.clone(),
                        source_index: port.index,
                        target: c.node_guid.clone(),
                        target_port: c.port_name.clone(),
                        target_index: c.port_index,
                    })
                })
            })
            .collect();
        table.sort();
        table
    }

    /// Set of node type strings
    pub fn node_types(&self) -> HashSet<String> {
        self.nodes.iter().map(|n| n.node_type.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GraphData {
        let mut graph = GraphData::new("sample");
        let mut a = NodeData::new("a", "Ceres.Values.Literal");
        a.generic_arguments = vec!["int".to_string()];
        a.serialized_data = r#"{"value":5}"#.to_string();
        a.port_mut("value", 0)
            .connections
            .push(PortConnection::new("b", "a", 0));
        graph.nodes.push(a);
        graph.nodes.push(NodeData::new("b", "Ceres.Math.Add"));
        graph
    }

    #[test]
    fn test_json_shape() {
        let json = sample().to_json_pretty().unwrap();
        assert!(json.contains("\"type\": \"Ceres.Values.Literal\""));
        assert!(json.contains("\"genericArguments\""));
        assert!(json.contains("\"nodeGuid\": \"b\""));
        let back = GraphData::from_json(&json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_array_len_uses_highest_index() {
        let mut node = NodeData::new("seq", "Ceres.Flow.Sequence");
        node.port_mut("then", 0);
        node.port_mut("then", 2);
        assert_eq!(node.array_len("then"), 3);
        assert_eq!(node.array_len("missing"), 0);
    }

    #[test]
    fn test_fields_tolerates_empty_blob() {
        let node = NodeData::new("n", "X.Y");
        assert_eq!(node.fields(), serde_json::json!({}));
    }

    #[test]
    fn test_connection_table() {
        let table = sample().connection_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].source, "a");
        assert_eq!(table[0].target_port, "a");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphs").join("sample.json");
        sample().save(&path).await.unwrap();
        let loaded = GraphData::load(&path).await.unwrap();
        assert_eq!(loaded, sample());
    }
}
