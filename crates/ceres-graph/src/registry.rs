//! Node type registry
//!
//! Maps a [`TypeIdentity`] to the node type's cached descriptor and a factory
//! that builds a live node from its persisted field blob. Deserialization goes
//! through [`NodeRegistry::resolve`], which applies type redirects first and
//! substitutes an [`InvalidNode`] placeholder when a type cannot be resolved.
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = NodeRegistry::new();
//! registry.register_type::<BranchNode>();
//!
//! // or collect every inventory submission
//! let registry = NodeRegistry::with_builtins();
//! ```

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use serde::de::DeserializeOwned;

use crate::data::NodeData;
use crate::descriptor::{DescribeNode, NodeDescriptor};
use crate::error::{CeresError, Result};
use crate::node::{InvalidNode, Node};
use crate::redirect::TypeRedirects;
use crate::types::{NodeCategory, PortType, TypeIdentity};

/// Builds a live node from its field blob and concrete generic arguments
pub type NodeFactory =
    Arc<dyn Fn(&serde_json::Value, &[PortType]) -> Result<Arc<dyn Node>> + Send + Sync>;

/// Link-time node type registration collected through `inventory`
pub struct NodeRegistration {
    pub descriptor: fn() -> NodeDescriptor,
    pub factory: fn(&serde_json::Value, &[PortType]) -> Result<Arc<dyn Node>>,
}

inventory::collect!(NodeRegistration);

/// Factory for node types whose fields deserialize with serde
pub fn deserialize_node<N>(
    fields: &serde_json::Value,
    _generic_arguments: &[PortType],
) -> Result<Arc<dyn Node>>
where
    N: Node + DeserializeOwned,
{
    let node: N = serde_json::from_value(fields.clone())?;
    Ok(Arc::new(node))
}

static INVALID_DESCRIPTOR: LazyLock<Arc<NodeDescriptor>> =
    LazyLock::new(|| Arc::new(InvalidNode::descriptor()));

/// A registration entry combining the cached descriptor with its factory
struct RegistryEntry {
    descriptor: Arc<NodeDescriptor>,
    factory: NodeFactory,
}

/// Outcome of resolving a persisted node
pub struct ResolvedNode {
    /// Identity the node resolved to (after redirects)
    pub identity: TypeIdentity,
    pub generic_arguments: Vec<PortType>,
    /// Concrete descriptor, generic placeholders substituted
    pub descriptor: Arc<NodeDescriptor>,
    pub node: Arc<dyn Node>,
    /// Persisted identity when a redirect was applied
    pub redirected_from: Option<TypeIdentity>,
    /// Set when the node is a placeholder
    pub invalid: Option<InvalidNode>,
}

impl ResolvedNode {
    fn placeholder(data: &NodeData) -> Self {
        let invalid = InvalidNode::new(
            data.node_type.clone(),
            data.generic_arguments.clone(),
            data.serialized_data.clone(),
        );
        Self {
            identity: TypeIdentity::parse(&data.node_type),
            generic_arguments: Vec::new(),
            descriptor: INVALID_DESCRIPTOR.clone(),
            node: Arc::new(invalid.clone()),
            redirected_from: None,
            invalid: Some(invalid),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.invalid.is_some()
    }
}

/// Registry of node types
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = NodeRegistry::with_builtins();
/// registry.merge(plugin_registry);
/// ```
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
    redirects: TypeRedirects,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            redirects: TypeRedirects::new(),
        }
    }

    /// Registry holding every `inventory`-submitted node type and redirect
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<NodeRegistration> {
            let factory = registration.factory;
            registry.register((registration.descriptor)(), Arc::new(factory));
        }
        registry.redirects = TypeRedirects::with_registered();
        log::debug!(
            "Collected {} node types and {} redirects",
            registry.entries.len(),
            registry.redirects.len()
        );
        registry
    }

    /// Register a node type; replaces an existing registration of the same identity
    pub fn register(&mut self, descriptor: NodeDescriptor, factory: NodeFactory) {
        let key = descriptor.identity.full_name();
        if self.entries.contains_key(&key) {
            log::debug!("Replacing registration for node type '{}'", key);
        }
        self.entries.insert(
            key,
            RegistryEntry {
                descriptor: Arc::new(descriptor),
                factory,
            },
        );
    }

    /// Register a node type whose fields deserialize with serde
    pub fn register_type<N>(&mut self)
    where
        N: Node + DescribeNode + DeserializeOwned,
    {
        self.register(N::descriptor(), Arc::new(deserialize_node::<N>));
    }

    /// Add an old -> new type redirect
    pub fn add_redirect(&mut self, from: impl Into<TypeIdentity>, to: impl Into<TypeIdentity>) {
        self.redirects.insert(from.into(), to.into());
    }

    pub fn redirects(&self) -> &TypeRedirects {
        &self.redirects
    }

    fn entry(&self, identity: &TypeIdentity) -> Option<&RegistryEntry> {
        self.entries
            .get(&identity.full_name())
            .filter(|entry| entry.descriptor.identity.matches(identity))
    }

    /// Cached descriptor of a registered type
    pub fn descriptor(&self, identity: &TypeIdentity) -> Option<Arc<NodeDescriptor>> {
        self.entry(identity).map(|e| e.descriptor.clone())
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, identity: &TypeIdentity) -> bool {
        self.entry(identity).is_some()
    }

    /// Identity after applying redirects, if the result is registered
    pub fn resolve_identity(&self, identity: &TypeIdentity) -> Option<TypeIdentity> {
        if let Some(target) = self.redirects.resolve(identity) {
            if self.has_node_type(&target) {
                return Some(target);
            }
            log::warn!(
                "Redirect target '{}' for '{}' is not registered",
                target,
                identity
            );
        }
        self.has_node_type(identity).then(|| identity.clone())
    }

    /// All registered descriptors
    pub fn all_descriptors(&self) -> Vec<Arc<NodeDescriptor>> {
        self.entries.values().map(|e| e.descriptor.clone()).collect()
    }

    /// Descriptors grouped by category
    pub fn descriptors_by_category(&self) -> HashMap<NodeCategory, Vec<Arc<NodeDescriptor>>> {
        let mut grouped: HashMap<NodeCategory, Vec<Arc<NodeDescriptor>>> = HashMap::new();
        for entry in self.entries.values() {
            grouped
                .entry(entry.descriptor.category)
                .or_default()
                .push(entry.descriptor.clone());
        }
        grouped
    }

    /// List all registered type names
    pub fn node_types(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Entries and redirects from `other` override those in `self`.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
        self.redirects.merge(other.redirects);
    }

    /// Build a live node, or a placeholder if its type cannot be resolved
    ///
    /// Never fails: every failure (unknown type, bad generic arguments,
    /// malformed fields) is logged and turned into an [`InvalidNode`].
    pub fn resolve(&self, data: &NodeData) -> ResolvedNode {
        match self.try_resolve(data) {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("Node '{}' replaced by placeholder: {}", data.guid, e);
                ResolvedNode::placeholder(data)
            }
        }
    }

    fn try_resolve(&self, data: &NodeData) -> Result<ResolvedNode> {
        let persisted = TypeIdentity::parse(&data.node_type);
        let identity = self
            .resolve_identity(&persisted)
            .ok_or_else(|| CeresError::TypeResolution(data.node_type.clone()))?;
        let entry = self
            .entry(&identity)
            .ok_or_else(|| CeresError::TypeResolution(data.node_type.clone()))?;

        let generic_arguments = data
            .generic_arguments
            .iter()
            .map(|arg| arg.parse::<PortType>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CeresError::TypeResolution(format!("{}: {}", data.node_type, e)))?;

        let plain = entry.descriptor.generic_parameters == 0 && generic_arguments.is_empty();
        let descriptor = if plain {
            entry.descriptor.clone()
        } else {
            let concrete = entry.descriptor.instantiate(&generic_arguments).ok_or_else(|| {
                CeresError::TypeResolution(format!(
                    "{}<{}>",
                    data.node_type,
                    data.generic_arguments.join(", ")
                ))
            })?;
            Arc::new(concrete)
        };

        let node = (entry.factory)(&data.fields(), &generic_arguments)?;
        let redirected_from = (!persisted.matches(&identity)).then_some(persisted);
        if let Some(from) = &redirected_from {
            log::info!("Node '{}' redirected from '{}' to '{}'", data.guid, from, identity);
        }

        Ok(ResolvedNode {
            identity: entry.descriptor.identity.clone(),
            generic_arguments,
            descriptor,
            node,
            redirected_from,
            invalid: None,
        })
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
