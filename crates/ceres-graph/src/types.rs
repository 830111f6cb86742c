//! Core types shared by ports, nodes and the persisted graph format

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Unique identifier for a node within a graph
pub type NodeGuid = String;

/// The declared type of a port or variable
///
/// Persisted as a short string (`"int"`, `"object:Entity"`, `"custom:Handle"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortType {
    /// Accepts any value
    Any,
    /// Boolean value
    Bool,
    /// Signed integer
    Int,
    /// Floating point number
    Float,
    /// Text string
    String,
    /// Arbitrary JSON document
    Json,
    /// Reference to a host object of the named kind
    Object(String),
    /// Control-flow reference to another node
    Node,
    /// Host-defined value kind
    Custom(String),
    /// Placeholder for the n-th generic argument of a generic node type
    Generic(usize),
}

impl PortType {
    /// Whether a value of this type can be read by a port of `other` type without conversion
    pub fn accepts_directly(&self, other: &PortType) -> bool {
        matches!(self, PortType::Any) || self == other
    }

    /// Replace generic placeholders with concrete arguments
    ///
    /// Returns `None` if a placeholder index has no matching argument.
    pub fn instantiate(&self, arguments: &[PortType]) -> Option<PortType> {
        match self {
            PortType::Generic(index) => arguments.get(*index).cloned(),
            other => Some(other.clone()),
        }
    }

    /// Whether this type still contains a generic placeholder
    pub fn is_generic(&self) -> bool {
        matches!(self, PortType::Generic(_))
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortType::Any => write!(f, "any"),
            PortType::Bool => write!(f, "bool"),
            PortType::Int => write!(f, "int"),
            PortType::Float => write!(f, "float"),
            PortType::String => write!(f, "string"),
            PortType::Json => write!(f, "json"),
            PortType::Object(name) => write!(f, "object:{}", name),
            PortType::Node => write!(f, "node"),
            PortType::Custom(name) => write!(f, "custom:{}", name),
            PortType::Generic(index) => write!(f, "generic:{}", index),
        }
    }
}

impl FromStr for PortType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parsed = match s {
            "any" => PortType::Any,
            "bool" => PortType::Bool,
            "int" => PortType::Int,
            "float" => PortType::Float,
            "string" => PortType::String,
            "json" => PortType::Json,
            "node" => PortType::Node,
            other => {
                if let Some(name) = other.strip_prefix("object:") {
                    PortType::Object(name.to_string())
                } else if let Some(name) = other.strip_prefix("custom:") {
                    PortType::Custom(name.to_string())
                } else if let Some(index) = other.strip_prefix("generic:") {
                    let index = index
                        .parse::<usize>()
                        .map_err(|_| format!("invalid generic index in '{}'", other))?;
                    PortType::Generic(index)
                } else {
                    return Err(format!("unknown port type '{}'", other));
                }
            }
        };
        Ok(parsed)
    }
}

impl Serialize for PortType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PortType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether a port receives or provides a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    /// The opposite direction
    pub fn opposite(self) -> Self {
        match self {
            PortDirection::Input => PortDirection::Output,
            PortDirection::Output => PortDirection::Input,
        }
    }
}

/// How many connections a port accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortCapacity {
    Single,
    Multi,
}

/// Whether a port carries data or a control-flow reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    /// Value-carrying port
    Data,
    /// NodePort: its value is a reference to another node
    Control,
}

/// How a node type is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// Runs only when reached through a control-flow link
    Forward,
    /// Runs on demand before any node that reads its outputs
    Dependency,
}

/// Category of a node, used for grouping in authoring tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Entry points (events, function inputs)
    Event,
    /// Control flow (branches, loops, sequences)
    Flow,
    /// Pure value producers and math
    Value,
    /// Variable access
    Variable,
    /// Custom function plumbing
    Function,
    /// Host object helpers
    Object,
    /// Debugging helpers
    Debug,
    /// Placeholder for unresolved types
    Invalid,
}

/// Stable identity of a node type: namespace, class and optional assembly
///
/// Persisted as `"Namespace.Class"` or `"Namespace.Class, Assembly"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdentity {
    pub namespace: String,
    pub class: String,
    pub assembly: Option<String>,
}

impl TypeIdentity {
    /// Create an identity without an assembly qualifier
    pub fn new(namespace: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            class: class.into(),
            assembly: None,
        }
    }

    /// Add an assembly qualifier
    pub fn with_assembly(mut self, assembly: impl Into<String>) -> Self {
        self.assembly = Some(assembly.into());
        self
    }

    /// Parse `"Namespace.Class[, Assembly]"`
    ///
    /// The class is everything after the last dot of the type part; a type with
    /// no dot has an empty namespace.
    pub fn parse(text: &str) -> Self {
        let (type_part, assembly) = match text.split_once(',') {
            Some((ty, asm)) => (ty.trim(), Some(asm.trim().to_string()).filter(|a| !a.is_empty())),
            None => (text.trim(), None),
        };
        let (namespace, class) = match type_part.rsplit_once('.') {
            Some((ns, class)) => (ns.to_string(), class.to_string()),
            None => (String::new(), type_part.to_string()),
        };
        Self {
            namespace,
            class,
            assembly,
        }
    }

    /// `Namespace.Class` without the assembly
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.class.clone()
        } else {
            format!("{}.{}", self.namespace, self.class)
        }
    }

    /// Whether two identities name the same type, ignoring a missing assembly on either side
    pub fn matches(&self, other: &TypeIdentity) -> bool {
        self.namespace == other.namespace
            && self.class == other.class
            && match (&self.assembly, &other.assembly) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.assembly {
            Some(assembly) => write!(f, "{}, {}", self.full_name(), assembly),
            None => write!(f, "{}", self.full_name()),
        }
    }
}

impl From<&str> for TypeIdentity {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl Serialize for TypeIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}
