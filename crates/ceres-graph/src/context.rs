//! Per-dispatch execution context
//!
//! An [`ExecutionContext`] is created for every top-level dispatch and lent to
//! each node's `execute`. It carries the graph, the trigger object, the event
//! payload and the "next" slot that drives the control chain.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::arena::NodeHandle;
use crate::config::EngineConfig;
use crate::error::{CeresError, Result};
use crate::events::GraphEvent;
use crate::executor::{EventPayload, Executor};
use crate::extensions::{extension_keys, ExecutorExtensions};
use crate::graph::{Graph, GraphNode};
use crate::port::PortAddress;
use crate::scheduler::Scheduler;
use crate::types::{NodeGuid, PortType};
use crate::value::{FromValue, ObjectRef, Value};
use crate::variable::{Blackboard, SharedVariable};

/// State of one dispatch, lent to each executing node
pub struct ExecutionContext<'a> {
    executor: &'a Executor,
    graph: &'a Graph,
    trigger: Option<ObjectRef>,
    payload: Arc<EventPayload>,
    dispatch_id: String,
    current: Option<NodeHandle>,
    next: Option<NodeHandle>,
    depth: usize,
    steps: usize,
    trace: Vec<NodeGuid>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        executor: &'a Executor,
        graph: &'a Graph,
        trigger: Option<ObjectRef>,
        payload: Arc<EventPayload>,
        dispatch_id: String,
    ) -> Self {
        Self {
            executor,
            graph,
            trigger,
            payload,
            dispatch_id,
            current: None,
            next: None,
            depth: 0,
            steps: 0,
            trace: Vec::new(),
        }
    }

    /// Node count and trace, consumed at the end of a dispatch
    pub(crate) fn finish(self) -> (usize, Vec<NodeGuid>) {
        (self.steps, self.trace)
    }

    /// Walk a control chain starting at `start`
    pub(crate) async fn run_chain(&mut self, start: NodeHandle) -> Result<()> {
        let mut cursor = Some(start);
        while let Some(handle) = cursor {
            self.next = None;
            for dependency in self.graph.dependency_path(handle)? {
                self.invoke(dependency).await?;
            }
            self.next = None;
            self.invoke(handle).await?;
            cursor = self.next.take();
        }
        Ok(())
    }

    async fn invoke(&mut self, handle: NodeHandle) -> Result<()> {
        let graph_node = self
            .graph
            .node(handle)
            .ok_or_else(|| CeresError::UnknownNode(format!("{:?}", handle)))?;

        self.steps += 1;
        if let Some(limit) = self.executor.config().max_chain_steps {
            if self.steps > limit {
                return Err(CeresError::StepLimitExceeded(limit));
            }
        }

        let guid = graph_node.guid().to_string();
        self.trace.push(guid.clone());
        let emit_node_events = self.executor.config().emit_node_events;
        if emit_node_events {
            self.executor.emit(GraphEvent::NodeStarted {
                dispatch_id: self.dispatch_id.clone(),
                node_guid: guid.clone(),
                node_type: graph_node.node_type().to_string(),
            });
        }
        log::trace!("Executing node '{}' ({})", guid, graph_node.node_type());

        let node = graph_node.node().clone();
        let previous = self.current.replace(handle);
        let result = node.execute(self).await;
        self.current = previous;

        match result {
            Ok(()) => {
                if emit_node_events {
                    self.executor.emit(GraphEvent::NodeCompleted {
                        dispatch_id: self.dispatch_id.clone(),
                        node_guid: guid,
                    });
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Node '{}' failed: {}", guid, e);
                self.executor.emit(GraphEvent::NodeFailed {
                    dispatch_id: self.dispatch_id.clone(),
                    node_guid: guid,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    pub fn executor(&self) -> &'a Executor {
        self.executor
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.executor.config()
    }

    pub fn extensions(&self) -> &'a ExecutorExtensions {
        self.executor.extensions()
    }

    /// The host scheduler registered under [`extension_keys::SCHEDULER`]
    pub fn scheduler(&self) -> Option<Arc<dyn Scheduler>> {
        self.extensions()
            .get::<Arc<dyn Scheduler>>(extension_keys::SCHEDULER)
            .cloned()
    }

    /// The object that triggered this dispatch
    pub fn trigger(&self) -> Option<&ObjectRef> {
        self.trigger.as_ref()
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn dispatch_id(&self) -> &str {
        &self.dispatch_id
    }

    /// Current nesting of sub-executions and function calls
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Handle of the executing node
    pub fn current(&self) -> Option<NodeHandle> {
        self.current
    }

    /// The executing node
    pub fn current_node(&self) -> Result<&'a GraphNode> {
        self.current
            .and_then(|h| self.graph.node(h))
            .ok_or_else(|| CeresError::failed("no node is executing"))
    }

    /// Guid of the executing node, empty outside of `execute`
    pub fn guid(&self) -> &'a str {
        self.current
            .and_then(|h| self.graph.node(h))
            .map(|n| n.guid())
            .unwrap_or("")
    }

    fn address(&self, name: &str, index: usize) -> Option<PortAddress> {
        let handle = self.current?;
        let port = self.graph.node(handle)?.port_index(name, index)?;
        Some(PortAddress::new(handle, port))
    }

    /// Effective value of input slot `(name, index)`
    ///
    /// Unknown or unconnected ports read as the declared default, never fail.
    pub fn input_at(&self, name: &str, index: usize) -> Value {
        match self.address(name, index) {
            Some(address) => self.graph.read_port(address),
            None => Value::Null,
        }
    }

    pub fn input_value(&self, name: &str) -> Value {
        self.input_at(name, 0)
    }

    /// Typed input, `T::default()` on a missing or mistyped value
    pub fn input<T: FromValue + Default>(&self, name: &str) -> T {
        self.input_value(name).get_or_default()
    }

    /// Number of slots of a port on the executing node
    pub fn port_len(&self, name: &str) -> usize {
        self.current_node().map(|n| n.port_len(name)).unwrap_or(0)
    }

    pub fn set_output_at(&self, name: &str, index: usize, value: impl Into<Value>) {
        match self.address(name, index) {
            Some(address) => self.graph.write_port(address, value.into()),
            None => log::debug!(
                "Node '{}' wrote to missing port '{}[{}]'",
                self.guid(),
                name,
                index
            ),
        }
    }

    pub fn set_output(&self, name: &str, value: impl Into<Value>) {
        self.set_output_at(name, 0, value);
    }

    /// Successor linked to control output slot `(name, index)`
    pub fn target_at(&self, name: &str, index: usize) -> Option<NodeHandle> {
        let address = self.address(name, index)?;
        self.graph.port(address)?.target()
    }

    pub fn target(&self, name: &str) -> Option<NodeHandle> {
        self.target_at(name, 0)
    }

    /// Select the node the chain continues with after the executing one
    ///
    /// The last call wins.
    pub fn set_next(&mut self, node: Option<NodeHandle>) {
        self.next = node;
    }

    /// Continue with the successor linked to a control output
    pub fn continue_with(&mut self, port: &str) {
        self.next = self.target(port);
    }

    pub fn next(&self) -> Option<NodeHandle> {
        self.next
    }

    /// Run the chain starting at `node` to completion, then return here
    ///
    /// The caller's pending `next` is preserved.
    pub fn forward(&mut self, node: NodeHandle) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let limit = self.executor.config().max_forward_depth;
            if self.depth >= limit {
                return Err(CeresError::ForwardDepthExceeded(limit));
            }
            let saved_next = self.next.take();
            let saved_current = self.current;
            self.depth += 1;
            let result = self.run_chain(node).await;
            self.depth -= 1;
            self.current = saved_current;
            self.next = saved_next;
            result
        })
    }

    /// Forward into the successor of a control output; no-op if unlinked
    pub fn forward_port(&mut self, name: &str, index: usize) -> BoxFuture<'_, Result<()>> {
        let target = self.target_at(name, index);
        Box::pin(async move {
            match target {
                Some(node) => self.forward(node).await,
                None => Ok(()),
            }
        })
    }

    /// Implicit self: the input's object, or the trigger when the input is unset
    ///
    /// The trigger substitutes only if it is alive and type-compatible with
    /// the port (`any`, or `object:<kind>` of the same kind).
    pub fn target_or_default(&self, name: &str) -> Option<ObjectRef> {
        match self.input_value(name) {
            Value::Object(object) if !object.is_destroyed() => return Some(object),
            _ => {}
        }
        let trigger = self.trigger.as_ref().filter(|t| !t.is_destroyed())?;
        let port_type = self
            .current_node()
            .ok()
            .and_then(|n| n.port(name, 0))
            .map(|p| p.port_type().clone())
            .unwrap_or(PortType::Any);
        let compatible = match &port_type {
            PortType::Any => true,
            PortType::Object(kind) => kind.is_empty() || kind == trigger.kind(),
            _ => false,
        };
        compatible.then(|| trigger.clone())
    }

    /// Variable owned by the executing node
    pub fn variable(&self, field: &str) -> Option<Arc<SharedVariable>> {
        self.current_node().ok()?.variable(field).cloned()
    }

    pub fn blackboard(&self) -> &'a Blackboard {
        self.graph.blackboard()
    }

    /// Call a function sub-graph and await its return value
    ///
    /// Local functions of the current graph are searched first, then the
    /// executor's library. The callee runs in a nested context with its own
    /// payload; the returned value is whatever its output node stored in the
    /// return box (`Null` if none).
    pub fn invoke_function(
        &mut self,
        name: &str,
        args: Vec<Value>,
    ) -> BoxFuture<'_, Result<Value>> {
        let name = name.to_string();
        Box::pin(async move {
            let executor = self.executor;
            let callee: &'a Graph = match self.graph.local_function(&name) {
                Some(graph) => graph,
                None => executor
                    .functions()
                    .get(&name)
                    .map(|g| g.as_ref())
                    .ok_or_else(|| CeresError::UnknownFunction(name.clone()))?,
            };
            if !callee.is_runnable() {
                return Err(CeresError::NotCompiled(callee.name().to_string()));
            }
            let entry = callee
                .find_entry(&name)
                .ok_or_else(|| CeresError::UnknownEntry(format!("function '{}'", name)))?;

            let limit = executor.config().max_forward_depth;
            if self.depth >= limit {
                return Err(CeresError::ForwardDepthExceeded(limit));
            }

            let payload = Arc::new(EventPayload::new(name.clone(), args));
            let mut nested = ExecutionContext {
                executor,
                graph: callee,
                trigger: self.trigger.clone(),
                payload: payload.clone(),
                dispatch_id: self.dispatch_id.clone(),
                current: None,
                next: None,
                depth: self.depth + 1,
                steps: self.steps,
                trace: std::mem::take(&mut self.trace),
            };
            log::debug!("Calling function '{}' at depth {}", name, nested.depth);
            let result = nested.run_chain(entry).await;
            self.steps = nested.steps;
            self.trace = nested.trace;
            result?;
            Ok(payload.take_return().unwrap_or_default())
        })
    }

    /// Send an event to the executor's sink
    pub fn emit(&self, event: GraphEvent) {
        self.executor.emit(event);
    }

    /// Report a message from the executing node
    pub fn message(&self, message: impl Into<String>) {
        self.emit(GraphEvent::node_message(&self.dispatch_id, self.guid(), message));
    }
}
