//! Node groups: editor-side grouping of nodes
//!
//! Groups are pure metadata. They are persisted with the graph and carried
//! through hydrate/re-serialize unchanged, but never affect compilation or
//! execution.

use serde::{Deserialize, Serialize};

use crate::data::Position;
use crate::types::NodeGuid;

/// A named set of nodes shown as one frame in authoring tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    /// Unique identifier for this group
    pub id: String,
    /// Human-readable name for the group
    pub name: String,
    /// Guids of member nodes
    #[serde(default)]
    pub nodes: Vec<NodeGuid>,
    /// Position of the group frame on the canvas
    #[serde(default)]
    pub position: Position,
    /// Optional color/theme for the group frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Optional description for the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NodeGroup {
    /// Create a new empty node group
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            position: Position::default(),
            color: None,
            description: None,
        }
    }

    /// Set the member nodes
    pub fn with_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeGuid>,
    {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether a node belongs to this group
    pub fn contains(&self, guid: &str) -> bool {
        self.nodes.iter().any(|n| n == guid)
    }

    /// Drop members that are not in `existing`; returns how many were removed
    pub fn retain_existing(&mut self, existing: impl Fn(&str) -> bool) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|guid| existing(guid));
        before - self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_membership() {
        let mut group = NodeGroup::new("g1", "Combat")
            .with_nodes(["a", "b", "c"])
            .with_color("#ff8800");
        assert!(group.contains("b"));

        let removed = group.retain_existing(|guid| guid != "c");
        assert_eq!(removed, 1);
        assert!(!group.contains("c"));
    }

    #[test]
    fn test_group_serialization() {
        let group = NodeGroup::new("g1", "Combat").with_position(10.0, 20.0);
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["position"]["x"], 10.0);
        assert!(json.get("color").is_none());
        let back: NodeGroup = serde_json::from_value(json).unwrap();
        assert_eq!(back, group);
    }
}
