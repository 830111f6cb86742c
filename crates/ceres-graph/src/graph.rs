//! The graph: node container, compiler and runtime port storage
//!
//! A [`Graph`] is hydrated from [`GraphData`], then [`Graph::compile`]
//! performs three steps:
//!
//! 1. variable init: node-owned variables bind to the blackboard (shared) or
//!    to the global table (global); graph variables flagged global bind too
//! 2. port link: connection records are resolved by guid and port
//!    `(name, index)`; data links record a dependency edge on the consumer
//! 3. dependency paths: computed per node and cached (see [`crate::compiler`])
//!
//! Only a successfully compiled, undisposed graph can be dispatched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::arena::{Arena, NodeHandle};
use crate::compiler::{CompileOptions, DependencyGraph, DependencyPaths};
use crate::data::{FunctionData, GraphData, NodeData, PortConnection, PortData, Position};
use crate::descriptor::NodeDescriptor;
use crate::error::{CeresError, Result};
use crate::groups::NodeGroup;
use crate::node::{InvalidNode, Node};
use crate::port::{Port, PortAddress, PortLink};
use crate::registry::{NodeRegistry, ResolvedNode};
use crate::types::{ExecutionPath, NodeGuid, PortCapacity, PortDirection, PortType, TypeIdentity};
use crate::value::Value;
use crate::variable::{Blackboard, SharedVariable, VariableData};

/// Upper bound on the slots of one array port
///
/// Persisted slot indices at or past this bound are skipped with a warning.
pub const MAX_ARRAY_SLOTS: usize = 1024;

/// A node placed in a graph together with its ports and variables
pub struct GraphNode {
    guid: NodeGuid,
    position: Position,
    node_type: String,
    identity: TypeIdentity,
    generic_arguments: Vec<PortType>,
    descriptor: Arc<NodeDescriptor>,
    node: Arc<dyn Node>,
    invalid: Option<InvalidNode>,
    ports: Vec<Port>,
    records: Vec<PortData>,
    variables: Vec<(String, Arc<SharedVariable>)>,
    dependencies: Vec<NodeHandle>,
}

impl GraphNode {
    fn from_resolved(data: &NodeData, resolved: ResolvedNode) -> Self {
        let node_type = match &resolved.redirected_from {
            Some(_) => resolved.identity.to_string(),
            None => data.node_type.clone(),
        };
        let fields = data.fields();
        let mut node = Self {
            guid: data.guid.clone(),
            position: data.position,
            node_type,
            identity: resolved.identity,
            generic_arguments: resolved.generic_arguments,
            descriptor: resolved.descriptor,
            node: resolved.node,
            invalid: resolved.invalid,
            ports: Vec::new(),
            records: data.ports.clone(),
            variables: Vec::new(),
            dependencies: Vec::new(),
        };
        node.instantiate_ports();
        node.instantiate_variables(&fields);
        node
    }

    /// One port per declared scalar port, one per persisted slot for array ports
    fn instantiate_ports(&mut self) {
        let mut ports = Vec::new();
        for declared in &self.descriptor.ports {
            let slots = if declared.array {
                let mut slots = 0;
                for record in self.records.iter().filter(|r| r.name == declared.name) {
                    match record.index.checked_add(1).filter(|n| *n <= MAX_ARRAY_SLOTS) {
                        Some(n) => slots = slots.max(n),
                        None => log::warn!(
                            "Node '{}': slot {}[{}] is past the array limit of {}, skipped",
                            self.guid,
                            record.name,
                            record.index,
                            MAX_ARRAY_SLOTS
                        ),
                    }
                }
                slots
            } else {
                1
            };
            for index in 0..slots {
                let port = Port::new(declared, index);
                if declared.direction == PortDirection::Input {
                    let constant = self
                        .records
                        .iter()
                        .find(|r| r.name == declared.name && r.index == index)
                        .and_then(|r| r.value.as_ref());
                    if let Some(json) = constant {
                        port.set_value(Value::from_json_typed(json, &declared.port_type));
                    }
                }
                ports.push(port);
            }
        }
        self.ports = ports;
    }

    fn instantiate_variables(&mut self, fields: &serde_json::Value) {
        self.variables = self
            .descriptor
            .variables
            .iter()
            .map(|declared| {
                let unnamed = |name: &str| {
                    VariableData::new(name, declared.value_type.clone(), serde_json::Value::Null)
                };
                let data = match fields.get(&declared.field) {
                    Some(serde_json::Value::String(name)) => unnamed(name),
                    Some(json) => serde_json::from_value::<VariableData>(json.clone())
                        .unwrap_or_else(|e| {
                            log::warn!(
                                "Node '{}': malformed variable '{}': {}",
                                self.guid,
                                declared.field,
                                e
                            );
                            unnamed(&declared.field)
                        }),
                    None => {
                        let mut data = unnamed(&declared.field);
                        data.is_shared = false;
                        data
                    }
                };
                (declared.field.clone(), Arc::new(SharedVariable::from_data(&data)))
            })
            .collect();
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Type string written back on save
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn identity(&self) -> &TypeIdentity {
        &self.identity
    }

    pub fn generic_arguments(&self) -> &[PortType] {
        &self.generic_arguments
    }

    pub fn descriptor(&self) -> &Arc<NodeDescriptor> {
        &self.descriptor
    }

    pub fn execution_path(&self) -> ExecutionPath {
        self.descriptor.execution_path
    }

    pub fn node(&self) -> &Arc<dyn Node> {
        &self.node
    }

    /// The placeholder payload, if the type could not be resolved
    pub fn invalid(&self) -> Option<&InvalidNode> {
        self.invalid.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.invalid.is_some()
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Position of port slot `(name, index)` in [`Self::ports`]
    pub fn port_index(&self, name: &str, index: usize) -> Option<usize> {
        self.ports
            .iter()
            .position(|p| p.name() == name && p.index() == index)
    }

    pub fn port(&self, name: &str, index: usize) -> Option<&Port> {
        self.port_index(name, index).map(|i| &self.ports[i])
    }

    /// Number of slots of a port (1 for scalar ports, 0 if undeclared)
    pub fn port_len(&self, name: &str) -> usize {
        self.ports.iter().filter(|p| p.name() == name).count()
    }

    /// Persisted port records
    pub fn records(&self) -> &[PortData] {
        &self.records
    }

    pub fn variable(&self, field: &str) -> Option<&Arc<SharedVariable>> {
        self.variables
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Arc<SharedVariable>)> {
        self.variables.iter().map(|(f, v)| (f.as_str(), v))
    }

    /// Nodes whose outputs feed this node, recorded during port link
    pub fn dependencies(&self) -> &[NodeHandle] {
        &self.dependencies
    }

    /// Persisted form of this node
    pub fn to_data(&self) -> NodeData {
        if let Some(invalid) = &self.invalid {
            return NodeData {
                guid: self.guid.clone(),
                node_type: invalid.node_type.clone(),
                generic_arguments: invalid.generic_arguments.clone(),
                position: self.position,
                serialized_data: invalid.serialized_data.clone(),
                ports: self.records.clone(),
            };
        }

        let mut fields = match self.node.serialize_fields() {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        for (field, variable) in &self.variables {
            if let Ok(json) = serde_json::to_value(variable.to_data()) {
                fields.insert(field.clone(), json);
            }
        }
        let serialized_data = serde_json::to_string(&serde_json::Value::Object(fields))
            .unwrap_or_else(|_| "{}".to_string());

        NodeData {
            guid: self.guid.clone(),
            node_type: self.node_type.clone(),
            generic_arguments: self.generic_arguments.iter().map(|t| t.to_string()).collect(),
            position: self.position,
            serialized_data,
            ports: self.records.clone(),
        }
    }
}

/// A local function sub-graph owned by its parent graph
pub struct LocalFunction {
    pub name: String,
    pub graph: Graph,
}

/// Container and compiler for a node graph
pub struct Graph {
    name: String,
    nodes: Arena<GraphNode>,
    order: Vec<NodeHandle>,
    guids: HashMap<NodeGuid, NodeHandle>,
    blackboard: Blackboard,
    groups: Vec<NodeGroup>,
    functions: Vec<LocalFunction>,
    paths: Option<DependencyPaths>,
    compiled: bool,
    disposed: AtomicBool,
}

impl Graph {
    /// Create an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Arena::new(),
            order: Vec::new(),
            guids: HashMap::new(),
            blackboard: Blackboard::new(),
            groups: Vec::new(),
            functions: Vec::new(),
            paths: None,
            compiled: false,
            disposed: AtomicBool::new(false),
        }
    }

    /// Hydrate from persisted data
    ///
    /// Never fails on unresolvable node types; those become placeholders.
    pub fn from_data(data: &GraphData, registry: &NodeRegistry) -> Self {
        let mut graph = Self::new(data.name.clone());
        for node in &data.nodes {
            graph.add_node(node, registry);
        }
        for variable in &data.variables {
            graph
                .blackboard
                .insert(Arc::new(SharedVariable::from_data(variable)));
        }
        graph.add_incoming_array_slots();
        graph.groups = data.node_groups.clone();
        for function in &data.functions {
            graph.functions.push(LocalFunction {
                name: function.name.clone(),
                graph: Graph::from_data(&function.graph, registry),
            });
        }
        let placeholders = graph.nodes.iter().filter(|(_, n)| n.is_placeholder()).count();
        log::debug!(
            "Hydrated graph '{}': {} nodes ({} placeholders), {} variables",
            graph.name,
            graph.nodes.len(),
            placeholders,
            graph.blackboard.len()
        );
        graph
    }

    /// Hydrate and compile in one step
    pub fn build(
        data: &GraphData,
        registry: &NodeRegistry,
        options: &CompileOptions,
    ) -> Result<Self> {
        let mut graph = Self::from_data(data, registry);
        graph.compile(options)?;
        Ok(graph)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a persisted node, resolving its type through the registry
    ///
    /// A duplicate guid is replaced by a fresh one (with a warning).
    pub fn add_node(&mut self, data: &NodeData, registry: &NodeRegistry) -> NodeHandle {
        let resolved = registry.resolve(data);
        self.insert(GraphNode::from_resolved(data, resolved))
    }

    /// Add a live node that was not built through a registry
    pub fn add_live_node(
        &mut self,
        guid: impl Into<NodeGuid>,
        descriptor: NodeDescriptor,
        node: Arc<dyn Node>,
    ) -> NodeHandle {
        let data = NodeData::new(guid, descriptor.identity.to_string());
        let resolved = ResolvedNode {
            identity: descriptor.identity.clone(),
            generic_arguments: Vec::new(),
            descriptor: Arc::new(descriptor),
            node,
            redirected_from: None,
            invalid: None,
        };
        self.insert(GraphNode::from_resolved(&data, resolved))
    }

    fn insert(&mut self, mut node: GraphNode) -> NodeHandle {
        if node.guid.is_empty() || self.guids.contains_key(&node.guid) {
            let fresh = uuid::Uuid::new_v4().to_string();
            log::warn!(
                "Graph '{}': duplicate or empty node guid '{}', reassigned to '{}'",
                self.name,
                node.guid,
                fresh
            );
            node.guid = fresh;
        }
        if let Some(invalid) = &node.invalid {
            log::warn!(
                "Graph '{}': node '{}' of missing type '{}' loaded as placeholder",
                self.name,
                node.guid,
                invalid.node_type
            );
        }
        let guid = node.guid.clone();
        let handle = self.nodes.insert(node);
        self.guids.insert(guid, handle);
        self.order.push(handle);
        self.invalidate();
        handle
    }

    /// Remove a node and every connection record that targets it
    pub fn remove_node(&mut self, handle: NodeHandle) -> Option<NodeData> {
        let removed = self.nodes.remove(handle)?;
        self.guids.remove(&removed.guid);
        self.order.retain(|h| *h != handle);
        for (_, node) in self.nodes.iter_mut() {
            for record in &mut node.records {
                record.connections.retain(|c| c.node_guid != removed.guid);
            }
        }
        for group in &mut self.groups {
            group.nodes.retain(|g| g != &removed.guid);
        }
        self.invalidate();
        Some(removed.to_data())
    }

    /// Record a connection from an output slot to an input slot
    ///
    /// Only the record is written here; ports are linked by the next compile.
    pub fn connect(
        &mut self,
        from: (&str, &str, usize),
        to: (&str, &str, usize),
    ) -> Result<()> {
        let (from_guid, from_port, from_index) = from;
        let (to_guid, to_port, to_index) = to;
        if !self.guids.contains_key(to_guid) {
            return Err(CeresError::UnknownNode(to_guid.to_string()));
        }
        let source = self
            .handle_of(from_guid)
            .and_then(|h| self.nodes.get_mut(h))
            .ok_or_else(|| CeresError::UnknownNode(from_guid.to_string()))?;
        let declared = source
            .descriptor
            .port(from_port)
            .ok_or_else(|| CeresError::UnknownPort {
                node: from_guid.to_string(),
                port: from_port.to_string(),
            })?;
        if declared.direction != PortDirection::Output {
            return Err(CeresError::InvalidDirection {
                from: from_port.to_string(),
                to: to_port.to_string(),
            });
        }
        let array = declared.array;

        let record = match source
            .records
            .iter()
            .position(|r| r.name == from_port && r.index == from_index)
        {
            Some(i) => &mut source.records[i],
            None => {
                source.records.push(PortData::new(from_port, from_index));
                let last = source.records.len() - 1;
                &mut source.records[last]
            }
        };
        let connection = PortConnection::new(to_guid, to_port, to_index);
        if !record.connections.contains(&connection) {
            record.connections.push(connection);
        }
        if array {
            source.instantiate_ports();
        }
        if let Some(target) = self.handle_of(to_guid).and_then(|h| self.nodes.get_mut(h)) {
            if target
                .descriptor
                .port(to_port)
                .map(|p| p.array)
                .unwrap_or(false)
                && target.port(to_port, to_index).is_none()
            {
                target.records.push(PortData::new(to_port, to_index));
                target.instantiate_ports();
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Set the persisted constant of an unconnected input slot
    pub fn set_input_constant(
        &mut self,
        guid: &str,
        port: &str,
        index: usize,
        value: Value,
    ) -> Result<()> {
        let node = self
            .handle_of(guid)
            .and_then(|h| self.nodes.get_mut(h))
            .ok_or_else(|| CeresError::UnknownNode(guid.to_string()))?;
        let declared = node.descriptor.port(port).ok_or_else(|| CeresError::UnknownPort {
            node: guid.to_string(),
            port: port.to_string(),
        })?;
        let array = declared.array;
        match node
            .records
            .iter_mut()
            .find(|r| r.name == port && r.index == index)
        {
            Some(record) => record.value = Some(value.to_json()),
            None => {
                let mut record = PortData::new(port, index);
                record.value = Some(value.to_json());
                node.records.push(record);
            }
        }
        if let Some(slot) = node.port(port, index) {
            slot.set_value(value);
        } else if array {
            node.instantiate_ports();
        } else {
            return Err(CeresError::UnknownPort {
                node: guid.to_string(),
                port: format!("{}[{}]", port, index),
            });
        }
        Ok(())
    }

    /// Give array inputs a slot for every recorded incoming connection
    ///
    /// Connections are stored on the output side, so an array input slot
    /// that is only ever linked (never given a constant) has no record of
    /// its own on the target node.
    fn add_incoming_array_slots(&mut self) {
        let mut missing: Vec<(NodeHandle, String, usize)> = Vec::new();
        for (_, source) in self.nodes.iter() {
            for connection in source.records.iter().flat_map(|r| r.connections.iter()) {
                let Some(handle) = self.handle_of(&connection.node_guid) else {
                    continue;
                };
                let Some(target) = self.nodes.get(handle) else {
                    continue;
                };
                let is_array = target
                    .descriptor
                    .port(&connection.port_name)
                    .map(|p| p.array)
                    .unwrap_or(false);
                let slot = target.port(&connection.port_name, connection.port_index);
                if !is_array || slot.is_some() {
                    continue;
                }
                if connection.port_index >= MAX_ARRAY_SLOTS {
                    log::warn!(
                        "Graph '{}': link {} -> {}.{}[{}] is past the array limit, skipped",
                        self.name,
                        source.guid,
                        connection.node_guid,
                        connection.port_name,
                        connection.port_index
                    );
                    continue;
                }
                missing.push((handle, connection.port_name.clone(), connection.port_index));
            }
        }
        let mut touched = Vec::new();
        for (handle, port, index) in missing {
            if let Some(target) = self.nodes.get_mut(handle) {
                if !target.records.iter().any(|r| r.name == port && r.index == index) {
                    target.records.push(PortData::new(port, index));
                }
                if !touched.contains(&handle) {
                    touched.push(handle);
                }
            }
        }
        for handle in touched {
            if let Some(target) = self.nodes.get_mut(handle) {
                target.instantiate_ports();
            }
        }
    }

    fn invalidate(&mut self) {
        self.compiled = false;
        self.paths = None;
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&GraphNode> {
        self.nodes.get(handle)
    }

    pub fn handle_of(&self, guid: &str) -> Option<NodeHandle> {
        self.guids.get(guid).copied()
    }

    pub fn node_by_guid(&self, guid: &str) -> Option<&GraphNode> {
        self.handle_of(guid).and_then(|h| self.nodes.get(h))
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeHandle, &GraphNode)> {
        self.order
            .iter()
            .filter_map(|h| self.nodes.get(*h).map(|n| (*h, n)))
    }

    /// Position of a node in insertion order (its index in dependency paths)
    pub fn index_of(&self, handle: NodeHandle) -> Option<usize> {
        self.order.iter().position(|h| *h == handle)
    }

    pub fn handle_at(&self, index: usize) -> Option<NodeHandle> {
        self.order.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    pub fn blackboard_mut(&mut self) -> &mut Blackboard {
        &mut self.blackboard
    }

    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    pub fn add_group(&mut self, group: NodeGroup) {
        self.groups.push(group);
    }

    /// Add a local function sub-graph; replaces one with the same name
    pub fn add_function(&mut self, name: impl Into<String>, graph: Graph) {
        let name = name.into();
        self.functions.retain(|f| f.name != name);
        self.functions.push(LocalFunction { name, graph });
        self.compiled = false;
    }

    pub fn local_function(&self, name: &str) -> Option<&Graph> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.graph)
    }

    pub fn local_functions(&self) -> impl Iterator<Item = &LocalFunction> {
        self.functions.iter()
    }

    /// Whether the last compile succeeded and nothing changed since
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Compiled and not disposed
    pub fn is_runnable(&self) -> bool {
        self.compiled && !self.is_disposed()
    }

    /// Compile the graph
    ///
    /// A circular dependency among Dependency-path nodes is fatal: the error
    /// is returned and the graph stays uncompiled with no cached paths.
    /// Dangling or incompatible connection records only log warnings.
    pub fn compile(&mut self, options: &CompileOptions) -> Result<()> {
        self.compiled = false;
        if self.disposed.swap(false, Ordering::AcqRel) {
            log::debug!("Graph '{}' recompiled after dispose", self.name);
        }

        self.init_variables(options);
        let links = self.link_ports(options);

        if self.paths.is_none() {
            match self.dependency_graph().compute_paths() {
                Ok(paths) => self.paths = Some(Arc::new(paths)),
                Err(e) => {
                    log::error!("Graph '{}' failed to compile: {}", self.name, e);
                    return Err(e);
                }
            }
        }

        for function in &mut self.functions {
            function.graph.compile(options).map_err(|e| {
                log::error!(
                    "Local function '{}' of graph '{}' failed to compile: {}",
                    function.name,
                    self.name,
                    e
                );
                e
            })?;
        }

        self.compiled = true;
        log::info!(
            "Compiled graph '{}': {} nodes, {} links, {} local functions",
            self.name,
            self.nodes.len(),
            links,
            self.functions.len()
        );
        Ok(())
    }

    /// Drop the cached dependency paths so the next compile recomputes them
    pub fn clear_dependency_cache(&mut self) {
        self.paths = None;
        self.compiled = false;
    }

    fn init_variables(&mut self, options: &CompileOptions) {
        for variable in self.blackboard.iter() {
            variable.unbind();
            if variable.is_global() {
                bind_global(&self.name, variable, options);
            }
        }

        for (_, node) in self.nodes.iter() {
            for (field, variable) in &node.variables {
                variable.unbind();
                if variable.is_global() {
                    bind_global(&self.name, variable, options);
                } else if variable.is_shared() {
                    match self.blackboard.get(variable.name()) {
                        Some(target) => {
                            if let Err(e) = variable.bind(target) {
                                log::warn!("Node '{}' variable '{}': {}", node.guid, field, e);
                            }
                        }
                        None => log::debug!(
                            "Node '{}' variable '{}': no blackboard entry '{}', stays local",
                            node.guid,
                            field,
                            variable.name()
                        ),
                    }
                }
            }
        }
    }

    /// Resolve every connection record; returns the number of links made
    fn link_ports(&mut self, options: &CompileOptions) -> usize {
        enum Pending {
            Data {
                target: PortAddress,
                link: PortLink,
            },
            Control {
                source: PortAddress,
                target: NodeHandle,
            },
        }

        for (_, node) in self.nodes.iter_mut() {
            node.dependencies.clear();
            for port in &mut node.ports {
                port.clear_links();
            }
        }

        let mut pending = Vec::new();
        for &source_handle in &self.order {
            let Some(source) = self.nodes.get(source_handle) else {
                continue;
            };
            for record in source.records.iter().filter(|r| !r.connections.is_empty()) {
                let Some(source_port) = source.port_index(&record.name, record.index) else {
                    log::warn!(
                        "Graph '{}': node '{}' has no port '{}[{}]', connections skipped",
                        self.name,
                        source.guid,
                        record.name,
                        record.index
                    );
                    continue;
                };
                let output = &source.ports[source_port];
                if output.direction() != PortDirection::Output {
                    log::warn!(
                        "Graph '{}': connections recorded on input '{}' of node '{}' skipped",
                        self.name,
                        output.label(),
                        source.guid
                    );
                    continue;
                }

                let connections = if output.is_control() {
                    if record.connections.len() > 1 {
                        log::debug!(
                            "Node '{}' control port '{}' has {} connections; using the first",
                            source.guid,
                            output.label(),
                            record.connections.len()
                        );
                    }
                    &record.connections[..1]
                } else {
                    &record.connections[..]
                };

                for connection in connections {
                    let Some(target_handle) = self.handle_of(&connection.node_guid) else {
                        log::warn!(
                            "Graph '{}': link {}.{} -> missing node '{}' skipped",
                            self.name,
                            source.guid,
                            output.label(),
                            connection.node_guid
                        );
                        continue;
                    };
                    let Some(target) = self.nodes.get(target_handle) else {
                        continue;
                    };
                    let target_port =
                        target.port_index(&connection.port_name, connection.port_index);
                    let Some(target_port) = target_port else {
                        log::warn!(
                            "Graph '{}': link {}.{} -> {}.{}[{}] targets a missing port, skipped",
                            self.name,
                            source.guid,
                            output.label(),
                            target.guid,
                            connection.port_name,
                            connection.port_index
                        );
                        continue;
                    };
                    let input = &target.ports[target_port];
                    match Port::check_link(output, input, &options.conversions) {
                        Ok(_) if output.is_control() => pending.push(Pending::Control {
                            source: PortAddress::new(source_handle, source_port),
                            target: target_handle,
                        }),
                        Ok(compatibility) => pending.push(Pending::Data {
                            target: PortAddress::new(target_handle, target_port),
                            link: PortLink {
                                source: PortAddress::new(source_handle, source_port),
                                compatibility,
                            },
                        }),
                        Err(e) => log::warn!(
                            "Graph '{}': link {}.{} -> {}.{} rejected: {}",
                            self.name,
                            source.guid,
                            output.label(),
                            target.guid,
                            input.label(),
                            e
                        ),
                    }
                }
            }
        }

        let count = pending.len();
        for op in pending {
            match op {
                Pending::Control { source, target } => {
                    if let Some(node) = self.nodes.get_mut(source.node) {
                        node.ports[source.port].set_target(target);
                    }
                }
                Pending::Data { target, link } => {
                    let source_node = link.source.node;
                    if let Some(node) = self.nodes.get_mut(target.node) {
                        let port = &mut node.ports[target.port];
                        let single = port.capacity() == PortCapacity::Single;
                        let label = port.label();
                        if port.attach(link).is_some() && single {
                            log::warn!(
                                "Node '{}' input '{}' linked more than once; the last link wins",
                                node.guid,
                                label
                            );
                        }
                        if source_node != target.node && !node.dependencies.contains(&source_node) {
                            node.dependencies.push(source_node);
                        }
                    }
                }
            }
        }
        count
    }

    fn dependency_graph(&self) -> DependencyGraph {
        let position: HashMap<NodeHandle, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, h)| (*h, i))
            .collect();
        let mut graph = DependencyGraph::default();
        for handle in &self.order {
            let Some(node) = self.nodes.get(*handle) else {
                continue;
            };
            graph.dependencies.push(
                node.dependencies
                    .iter()
                    .filter_map(|d| position.get(d).copied())
                    .collect(),
            );
            graph
                .forward
                .push(node.execution_path() == ExecutionPath::Forward);
            graph.names.push(node.guid.clone());
        }
        graph
    }

    /// Cached per-node dependency paths (indices into node order)
    pub fn dependency_paths(&self) -> Option<DependencyPaths> {
        self.paths.clone()
    }

    /// Ordered dependency nodes to run before `handle`
    pub fn dependency_path(&self, handle: NodeHandle) -> Result<Vec<NodeHandle>> {
        let paths = self
            .paths
            .as_ref()
            .ok_or_else(|| CeresError::NotCompiled(self.name.clone()))?;
        let index = self
            .index_of(handle)
            .ok_or_else(|| CeresError::UnknownNode(format!("{:?}", handle)))?;
        Ok(paths
            .get(index)
            .map(|path| path.iter().filter_map(|i| self.handle_at(*i)).collect())
            .unwrap_or_default())
    }

    /// Entry node answering to an event or function name
    pub fn find_entry(&self, name: &str) -> Option<NodeHandle> {
        self.nodes()
            .find(|(_, n)| n.node.entry_name() == Some(name))
            .map(|(h, _)| h)
    }

    pub fn port(&self, address: PortAddress) -> Option<&Port> {
        self.nodes.get(address.node)?.ports.get(address.port)
    }

    /// Effective value of a port
    ///
    /// A linked input reads its source output through the link's converter;
    /// a link to a removed node reads the input's default.
    pub fn read_port(&self, address: PortAddress) -> Value {
        let Some(port) = self.port(address) else {
            return Value::Null;
        };
        match port.link() {
            Some(link) => match self.port(link.source) {
                Some(source) => link.convert(source.local_value()),
                None => Value::default_for(port.port_type()),
            },
            None => port.local_value(),
        }
    }

    pub fn write_port(&self, address: PortAddress, value: Value) {
        if let Some(port) = self.port(address) {
            port.set_value(value);
        }
    }

    /// Persisted form of the live graph
    pub fn to_data(&self) -> GraphData {
        GraphData {
            name: self.name.clone(),
            nodes: self.nodes().map(|(_, n)| n.to_data()).collect(),
            variables: self.blackboard.iter().map(|v| v.to_data()).collect(),
            node_groups: self.groups.clone(),
            functions: self
                .functions
                .iter()
                .map(|f| FunctionData {
                    name: f.name.clone(),
                    graph: f.graph.to_data(),
                })
                .collect(),
        }
    }

    /// Unbind all variables and dispose all nodes, once
    ///
    /// In-flight dispatches are not cancelled; new dispatches are refused
    /// until the graph is compiled again.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.blackboard.dispose();
        for (_, node) in self.nodes.iter() {
            for (_, variable) in &node.variables {
                variable.unbind();
            }
            node.node.dispose();
        }
        for function in &self.functions {
            function.graph.dispose();
        }
        log::debug!("Disposed graph '{}'", self.name);
    }
}

fn bind_global(graph: &str, variable: &Arc<SharedVariable>, options: &CompileOptions) {
    match options.globals.get(variable.name()) {
        Some(global) if Arc::ptr_eq(&global, variable) => {}
        Some(global) => {
            if let Err(e) = variable.bind(&global) {
                log::warn!("Graph '{}': global variable '{}': {}", graph, variable.name(), e);
            }
        }
        None => log::warn!(
            "Graph '{}': no global variable named '{}', using local storage",
            graph,
            variable.name()
        ),
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("compiled", &self.compiled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::context::ExecutionContext;
    use crate::conversion::ConversionRegistry;
    use crate::descriptor::{DescribeNode, PortDescriptor, VariableDescriptor};
    use crate::types::NodeCategory;
    use crate::variable::GlobalVariables;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Source {}

    impl DescribeNode for Source {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::dependency(
                TypeIdentity::new("Test", "Source"),
                "Source",
                NodeCategory::Value,
            )
            .with_port(PortDescriptor::output("out", PortType::Int))
        }
    }

    #[async_trait]
    impl Node for Source {
        async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
            cx.set_output("out", 1_i64);
            Ok(())
        }
    }

    /// Scalar `in`, array `items` and one node-owned variable
    #[derive(Deserialize)]
    struct Sink {}

    impl DescribeNode for Sink {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::forward(TypeIdentity::new("Test", "Sink"), "Sink", NodeCategory::Flow)
                .with_port(PortDescriptor::input("in", PortType::Int))
                .with_port(PortDescriptor::input("items", PortType::Int).array())
                .with_variable(VariableDescriptor::new("variable", PortType::Int))
        }
    }

    #[async_trait]
    impl Node for Sink {
        async fn execute(&self, _cx: &mut ExecutionContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register_type::<Source>();
        registry.register_type::<Sink>();
        registry
    }

    fn options(globals: Arc<GlobalVariables>) -> CompileOptions {
        CompileOptions::new(Arc::new(ConversionRegistry::with_defaults()), globals)
    }

    fn linked_data() -> GraphData {
        GraphBuilder::new("linked")
            .add_node("src", "Test.Source")
            .add_node("sink", "Test.Sink")
            .with_fields(json!({"variable": "counter"}))
            .add_variable(VariableData::new("counter", PortType::Int, json!(3)))
            .connect("src", "out", "sink", "in")
            .build()
    }

    #[test]
    fn test_oversized_array_index_is_skipped() {
        let data = GraphBuilder::new("huge")
            .add_node("src", "Test.Source")
            .add_node("sink", "Test.Sink")
            .with_constant_at("items", usize::MAX, json!(4))
            .with_constant_at("items", 1, json!(2))
            .connect_at(("src", "out", 0), ("sink", "items", usize::MAX))
            .connect_at(("src", "out", 0), ("sink", "items", 1_000_000_000))
            .connect_at(("src", "out", 0), ("sink", "items", 0))
            .build();

        let graph = Graph::build(&data, &registry(), &options(Arc::new(GlobalVariables::new())))
            .unwrap();
        let sink = graph.node_by_guid("sink").unwrap();
        assert_eq!(sink.port_len("items"), 2);
        assert!(sink.port("items", 0).unwrap().link().is_some());
        assert_eq!(sink.port("items", 1).unwrap().local_value(), Value::Int(2));

        // skipped records are still saved as they were loaded
        let saved = graph.to_data();
        assert_eq!(saved.node("src").unwrap().ports, data.node("src").unwrap().ports);
    }

    #[test]
    fn test_dangling_links_skipped_and_inputs_keep_defaults() {
        let data = GraphBuilder::new("dangling")
            .add_node("src", "Test.Source")
            .add_node("sink", "Test.Sink")
            .with_constant("in", json!(7))
            .connect("src", "out", "ghost", "in")
            .connect("src", "out", "sink", "nope")
            .build();

        let graph = Graph::build(&data, &registry(), &options(Arc::new(GlobalVariables::new())))
            .unwrap();
        assert!(graph.is_runnable());
        let sink = graph.node_by_guid("sink").unwrap();
        let input = sink.port("in", 0).unwrap();
        assert!(input.link().is_none());
        assert_eq!(input.local_value(), Value::Int(7));
        assert!(sink.dependencies().is_empty());
        let saved = graph.to_data();
        assert_eq!(saved.node("src").unwrap().ports, data.node("src").unwrap().ports);
    }

    #[test]
    fn test_global_variables_bind_or_stay_local() {
        let globals = Arc::new(GlobalVariables::new());
        let score = globals.set("score", 5_i64);
        let data = GraphBuilder::new("globals")
            .add_node("sink", "Test.Sink")
            .with_fields(json!({
                "variable": {"name": "score", "valueType": "int", "isGlobal": true}
            }))
            .add_variable(VariableData::new("score", PortType::Int, json!(0)).global())
            .add_variable(VariableData::new("lives", PortType::Int, json!(3)).global())
            .build();

        let graph = Graph::build(&data, &registry(), &options(globals.clone())).unwrap();

        let board = graph.blackboard();
        assert!(board.get("score").unwrap().is_bound());
        assert_eq!(board.get_value::<i64>("score"), 5);
        let owned = graph.node_by_guid("sink").unwrap().variable("variable").unwrap();
        assert!(owned.is_bound());
        owned.set(9_i64);
        assert_eq!(score.get(), Value::Int(9));

        // no global named "lives": local storage with its persisted value
        let lives = board.get("lives").unwrap();
        assert!(!lives.is_bound());
        assert_eq!(lives.get(), Value::Int(3));
        assert!(globals.get("lives").is_none());
    }

    #[test]
    fn test_dependency_cache_reused_until_cleared() {
        let mut graph = Graph::from_data(&linked_data(), &registry());
        let options = options(Arc::new(GlobalVariables::new()));
        graph.compile(&options).unwrap();
        let first = graph.dependency_paths().unwrap();

        graph.compile(&options).unwrap();
        assert!(Arc::ptr_eq(&first, &graph.dependency_paths().unwrap()));

        graph.clear_dependency_cache();
        assert!(!graph.is_compiled());
        assert!(graph.dependency_paths().is_none());

        graph.compile(&options).unwrap();
        let second = graph.dependency_paths().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_dispose_unbinds_node_variables() {
        let mut graph = Graph::from_data(&linked_data(), &registry());
        let options = options(Arc::new(GlobalVariables::new()));
        graph.compile(&options).unwrap();
        let variable = graph
            .node_by_guid("sink")
            .unwrap()
            .variable("variable")
            .unwrap()
            .clone();
        assert!(variable.is_bound());
        assert_eq!(variable.get(), Value::Int(3));

        graph.dispose();
        assert!(!variable.is_bound());
        assert!(graph.is_disposed());
        assert!(!graph.is_runnable());

        graph.compile(&options).unwrap();
        assert!(variable.is_bound());
        assert!(graph.is_runnable());
    }
}
