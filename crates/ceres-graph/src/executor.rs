//! Dispatching compiled graphs
//!
//! A dispatch starts at one entry node and walks its control chain to the
//! end: every node first runs its cached dependency path, then itself, then
//! the node it selected with `set_next`. The walk is a loop; only explicit
//! sub-executions (`forward`) and function calls nest.
//!
//! ```ignore
//! let executor = Executor::new(EngineConfig::default())
//!     .with_sink(Arc::new(VecEventSink::new()));
//! let outcome = executor
//!     .dispatch(&graph, DispatchRequest::event("Start").with_args(vec![Value::Int(3)]))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{CeresError, Result};
use crate::events::{EventSink, GraphEvent, NullEventSink};
use crate::extensions::{extension_keys, ExecutorExtensions};
use crate::graph::Graph;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::types::NodeGuid;
use crate::value::{ObjectRef, Value};

/// Where a dispatch starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// The node answering to this event or function name
    Event(String),
    /// A node by guid
    Node(NodeGuid),
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entry::Event(name) => write!(f, "event '{}'", name),
            Entry::Node(guid) => write!(f, "node '{}'", guid),
        }
    }
}

/// Event data carried by a dispatch: positional arguments and a return box
#[derive(Debug, Default)]
pub struct EventPayload {
    name: String,
    args: Vec<Value>,
    returned: Mutex<Option<Value>>,
}

impl EventPayload {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
            returned: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Positional argument, `Null` when absent
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Fill the return box; a later write replaces an earlier one
    pub fn set_return(&self, value: Value) {
        *self.returned.lock() = Some(value);
    }

    pub fn returned(&self) -> Option<Value> {
        self.returned.lock().clone()
    }

    pub fn take_return(&self) -> Option<Value> {
        self.returned.lock().take()
    }
}

/// A request to run a graph from one entry
#[derive(Debug)]
pub struct DispatchRequest {
    pub entry: Entry,
    /// Context object used for implicit self
    pub trigger: Option<ObjectRef>,
    pub payload: Option<EventPayload>,
}

impl DispatchRequest {
    /// Dispatch the named event; the payload carries the same name
    pub fn event(name: impl Into<String>) -> Self {
        Self {
            entry: Entry::Event(name.into()),
            trigger: None,
            payload: None,
        }
    }

    /// Dispatch starting at a node
    pub fn node(guid: impl Into<NodeGuid>) -> Self {
        Self {
            entry: Entry::Node(guid.into()),
            trigger: None,
            payload: None,
        }
    }

    pub fn with_trigger(mut self, trigger: ObjectRef) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        let name = match &self.entry {
            Entry::Event(name) => name.clone(),
            Entry::Node(guid) => guid.clone(),
        };
        self.payload = Some(EventPayload::new(name, args));
        self
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Summary of a completed dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub dispatch_id: String,
    /// Guid of the entry node
    pub entry: NodeGuid,
    /// Node executions, dependency re-runs included
    pub nodes_executed: usize,
    /// Guids in execution order
    pub trace: Vec<NodeGuid>,
    /// Value left in the payload's return box
    pub returned: Option<Value>,
}

impl DispatchOutcome {
    /// How many times a node ran in this dispatch
    pub fn runs_of(&self, guid: &str) -> usize {
        self.trace.iter().filter(|g| g.as_str() == guid).count()
    }
}

/// Named function sub-graphs shared by every dispatch of an executor
#[derive(Debug, Default)]
pub struct FunctionLibrary {
    functions: HashMap<String, Arc<Graph>>,
}

impl FunctionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a compiled function graph; replaces one with the same name
    pub fn insert(&mut self, name: impl Into<String>, graph: Arc<Graph>) {
        self.functions.insert(name.into(), graph);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Graph>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Runs dispatches against compiled graphs
///
/// Cheap to clone; clones share config, sink, extensions and functions.
#[derive(Clone)]
pub struct Executor {
    config: Arc<EngineConfig>,
    sink: Arc<dyn EventSink>,
    extensions: Arc<ExecutorExtensions>,
    functions: Arc<FunctionLibrary>,
}

impl Executor {
    /// Executor with no event sink, a tokio scheduler and no library functions
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            sink: Arc::new(NullEventSink),
            extensions: Arc::new(Self::default_extensions(ExecutorExtensions::new())),
            functions: Arc::new(FunctionLibrary::new()),
        }
    }

    fn default_extensions(mut extensions: ExecutorExtensions) -> ExecutorExtensions {
        if !extensions.has(extension_keys::SCHEDULER) {
            let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new());
            extensions.set(extension_keys::SCHEDULER, scheduler);
        }
        extensions
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the host services; a tokio scheduler is added if none is set
    pub fn with_extensions(mut self, extensions: ExecutorExtensions) -> Self {
        self.extensions = Arc::new(Self::default_extensions(extensions));
        self
    }

    pub fn with_functions(mut self, functions: FunctionLibrary) -> Self {
        self.functions = Arc::new(functions);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub fn extensions(&self) -> &ExecutorExtensions {
        &self.extensions
    }

    pub fn functions(&self) -> &FunctionLibrary {
        &self.functions
    }

    pub(crate) fn emit(&self, event: GraphEvent) {
        if let Err(e) = self.sink.send(event) {
            log::debug!("Dropped graph event: {}", e);
        }
    }

    /// Run a dispatch to completion
    ///
    /// Fails with `NotCompiled` for graphs that are uncompiled or disposed and
    /// with `UnknownEntry` when the entry cannot be found. Any error raised by
    /// a node faults the whole dispatch; side effects already performed stay.
    pub async fn dispatch(
        &self,
        graph: &Graph,
        request: DispatchRequest,
    ) -> Result<DispatchOutcome> {
        if !graph.is_runnable() {
            return Err(CeresError::NotCompiled(graph.name().to_string()));
        }
        let entry = match &request.entry {
            Entry::Event(name) => graph.find_entry(name),
            Entry::Node(guid) => graph.handle_of(guid),
        }
        .ok_or_else(|| CeresError::UnknownEntry(request.entry.to_string()))?;
        let entry_guid = graph
            .node(entry)
            .map(|n| n.guid().to_string())
            .unwrap_or_default();

        let payload = Arc::new(request.payload.unwrap_or_else(|| {
            let name = match &request.entry {
                Entry::Event(name) => name.clone(),
                Entry::Node(guid) => guid.clone(),
            };
            EventPayload::new(name, Vec::new())
        }));
        let dispatch_id = uuid::Uuid::new_v4().to_string();

        log::debug!(
            "Dispatch {} on graph '{}' from {}",
            dispatch_id,
            graph.name(),
            request.entry
        );
        self.emit(GraphEvent::DispatchStarted {
            graph: graph.name().to_string(),
            dispatch_id: dispatch_id.clone(),
            entry: entry_guid.clone(),
        });

        let mut cx = ExecutionContext::new(
            self,
            graph,
            request.trigger,
            payload.clone(),
            dispatch_id.clone(),
        );
        let result = cx.run_chain(entry).await;
        let (nodes_executed, trace) = cx.finish();

        match result {
            Ok(()) => {
                self.emit(GraphEvent::DispatchCompleted {
                    graph: graph.name().to_string(),
                    dispatch_id: dispatch_id.clone(),
                    nodes_executed,
                });
                Ok(DispatchOutcome {
                    dispatch_id,
                    entry: entry_guid,
                    nodes_executed,
                    trace,
                    returned: payload.take_return(),
                })
            }
            Err(e) => {
                log::warn!("Dispatch {} on graph '{}' failed: {}", dispatch_id, graph.name(), e);
                self.emit(GraphEvent::DispatchFailed {
                    graph: graph.name().to_string(),
                    dispatch_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Fire-and-forget dispatch on the tokio runtime
    pub fn spawn(
        &self,
        graph: Arc<Graph>,
        request: DispatchRequest,
    ) -> JoinHandle<Result<DispatchOutcome>> {
        let executor = self.clone();
        tokio::spawn(async move { executor.dispatch(&graph, request).await })
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::compiler::CompileOptions;
    use crate::data::GraphData;
    use crate::descriptor::{DescribeNode, NodeDescriptor, PortDescriptor};
    use crate::events::VecEventSink;
    use crate::node::Node;
    use crate::registry::NodeRegistry;
    use crate::types::{NodeCategory, PortType, TypeIdentity};
    use async_trait::async_trait;
    use serde::Deserialize;

    /// Entry answering to `event`
    #[derive(Deserialize)]
    struct Start {
        event: String,
    }

    impl DescribeNode for Start {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::forward(
                TypeIdentity::new("Test", "Start"),
                "Start",
                NodeCategory::Event,
            )
            .with_port(PortDescriptor::control_output("next"))
        }
    }

    #[async_trait]
    impl Node for Start {
        async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
            cx.continue_with("next");
            Ok(())
        }

        fn entry_name(&self) -> Option<&str> {
            Some(&self.event)
        }
    }

    #[derive(Deserialize)]
    struct Constant {
        #[serde(default)]
        value: i64,
    }

    impl DescribeNode for Constant {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::dependency(
                TypeIdentity::new("Test", "Constant"),
                "Constant",
                NodeCategory::Value,
            )
            .with_port(PortDescriptor::output("out", PortType::Int))
        }
    }

    #[async_trait]
    impl Node for Constant {
        async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
            cx.set_output("out", self.value);
            Ok(())
        }
    }

    #[derive(Deserialize)]
    struct Double {}

    impl DescribeNode for Double {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::dependency(
                TypeIdentity::new("Test", "Double"),
                "Double",
                NodeCategory::Value,
            )
            .with_port(PortDescriptor::input("in", PortType::Int))
            .with_port(PortDescriptor::output("out", PortType::Int))
        }
    }

    #[async_trait]
    impl Node for Double {
        async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
            let value: i64 = cx.input("in");
            cx.set_output("out", value * 2);
            Ok(())
        }
    }

    /// Stores its input (or the implicit target's kind) in the return box
    #[derive(Deserialize)]
    struct Recorder {}

    impl DescribeNode for Recorder {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::forward(
                TypeIdentity::new("Test", "Recorder"),
                "Recorder",
                NodeCategory::Debug,
            )
            .with_port(PortDescriptor::input("in", PortType::Any))
            .with_port(PortDescriptor::input("target", PortType::Object("Entity".into())))
            .with_port(PortDescriptor::control_output("next"))
        }
    }

    #[async_trait]
    impl Node for Recorder {
        async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
            let value = match cx.target_or_default("target") {
                Some(target) => Value::String(target.kind().to_string()),
                None => cx.input_value("in"),
            };
            cx.payload().set_return(value);
            cx.continue_with("next");
            Ok(())
        }
    }

    /// Forwards into `body` every time it runs
    #[derive(Deserialize)]
    struct Recurse {}

    impl DescribeNode for Recurse {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::forward(
                TypeIdentity::new("Test", "Recurse"),
                "Recurse",
                NodeCategory::Flow,
            )
            .with_port(PortDescriptor::control_output("body"))
        }
    }

    #[async_trait]
    impl Node for Recurse {
        async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
            cx.forward_port("body", 0).await
        }
    }

    #[derive(Deserialize)]
    struct Fail {}

    impl DescribeNode for Fail {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::forward(TypeIdentity::new("Test", "Fail"), "Fail", NodeCategory::Debug)
        }
    }

    #[async_trait]
    impl Node for Fail {
        async fn execute(&self, _cx: &mut ExecutionContext<'_>) -> Result<()> {
            Err(CeresError::failed("boom"))
        }
    }

    /// Calls `function` with its `arg` field and returns the result
    #[derive(Deserialize)]
    struct Call {
        function: String,
        arg: i64,
    }

    impl DescribeNode for Call {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::forward(
                TypeIdentity::new("Test", "Call"),
                "Call",
                NodeCategory::Function,
            )
        }
    }

    #[async_trait]
    impl Node for Call {
        async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
            let result = cx.invoke_function(&self.function, vec![Value::Int(self.arg)]).await?;
            cx.payload().set_return(result);
            Ok(())
        }
    }

    /// Function entry that doubles its first argument into the return box
    #[derive(Deserialize)]
    struct DoubleArg {
        name: String,
    }

    impl DescribeNode for DoubleArg {
        fn descriptor() -> NodeDescriptor {
            NodeDescriptor::forward(
                TypeIdentity::new("Test", "DoubleArg"),
                "Double Arg",
                NodeCategory::Function,
            )
        }
    }

    #[async_trait]
    impl Node for DoubleArg {
        async fn execute(&self, cx: &mut ExecutionContext<'_>) -> Result<()> {
            let arg: i64 = cx.payload().arg(0).get_or_default();
            cx.payload().set_return(Value::Int(arg * 2));
            Ok(())
        }

        fn entry_name(&self) -> Option<&str> {
            Some(&self.name)
        }
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register_type::<Start>();
        registry.register_type::<Constant>();
        registry.register_type::<Double>();
        registry.register_type::<Recorder>();
        registry.register_type::<Recurse>();
        registry.register_type::<Fail>();
        registry.register_type::<Call>();
        registry.register_type::<DoubleArg>();
        registry
    }

    fn compile(data: &GraphData) -> Graph {
        Graph::build(data, &registry(), &CompileOptions::default()).unwrap()
    }

    fn chain_data() -> GraphData {
        GraphBuilder::new("chain")
            .add_node("a", "Test.Constant")
            .with_fields(serde_json::json!({"value": 5}))
            .add_node("b", "Test.Double")
            .add_node("c", "Test.Recorder")
            .connect("a", "out", "b", "in")
            .connect("b", "out", "c", "in")
            .build()
    }

    #[tokio::test]
    async fn test_dependencies_run_before_consumer() {
        let graph = compile(&chain_data());
        let sink = Arc::new(VecEventSink::new());
        let executor = Executor::default().with_sink(sink.clone());

        let outcome = executor.dispatch(&graph, DispatchRequest::node("c")).await.unwrap();
        assert_eq!(outcome.trace, vec!["a", "b", "c"]);
        assert_eq!(outcome.nodes_executed, 3);
        assert_eq!(outcome.returned, Some(Value::Int(10)));
        assert_eq!(sink.started_nodes(), vec!["a", "b", "c"]);

        // every dispatch re-runs the path
        let again = executor.dispatch(&graph, DispatchRequest::node("c")).await.unwrap();
        assert_eq!(again.runs_of("a"), 1);
        assert_eq!(again.returned, Some(Value::Int(10)));
    }

    #[tokio::test]
    async fn test_uncompiled_and_disposed_graphs_refuse_dispatch() {
        let executor = Executor::default();
        let graph = Graph::from_data(&chain_data(), &registry());
        let err = executor.dispatch(&graph, DispatchRequest::node("c")).await.unwrap_err();
        assert!(matches!(err, CeresError::NotCompiled(_)));

        let graph = compile(&chain_data());
        graph.dispose();
        let err = executor.dispatch(&graph, DispatchRequest::node("c")).await.unwrap_err();
        assert!(matches!(err, CeresError::NotCompiled(_)));
    }

    #[tokio::test]
    async fn test_unknown_entry() {
        let graph = compile(&chain_data());
        let err = Executor::default()
            .dispatch(&graph, DispatchRequest::event("Missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, CeresError::UnknownEntry(_)));
    }

    #[tokio::test]
    async fn test_event_entry_follows_control_chain() {
        let data = GraphBuilder::new("events")
            .add_node("start", "Test.Start")
            .with_fields(serde_json::json!({"event": "Begin"}))
            .add_node("recorder", "Test.Recorder")
            .with_constant("in", serde_json::json!("hello"))
            .connect_control("start", "next", "recorder")
            .build();
        let graph = compile(&data);

        let outcome = Executor::default()
            .dispatch(&graph, DispatchRequest::event("Begin"))
            .await
            .unwrap();
        assert_eq!(outcome.entry, "start");
        assert_eq!(outcome.trace, vec!["start", "recorder"]);
        assert_eq!(outcome.returned, Some(Value::String("hello".into())));
    }

    #[tokio::test]
    async fn test_trigger_substitutes_for_unset_target() {
        let data = GraphBuilder::new("self").add_node("p", "Test.Recorder").build();
        let graph = compile(&data);
        let entity = Arc::new(42u32);

        let outcome = Executor::default()
            .dispatch(
                &graph,
                DispatchRequest::node("p").with_trigger(ObjectRef::new("Entity", &entity)),
            )
            .await
            .unwrap();
        assert_eq!(outcome.returned, Some(Value::String("Entity".into())));

        // incompatible kind is not substituted
        let outcome = Executor::default()
            .dispatch(
                &graph,
                DispatchRequest::node("p").with_trigger(ObjectRef::new("Asset", &entity)),
            )
            .await
            .unwrap();
        assert_eq!(outcome.returned, Some(Value::Null));
    }

    #[tokio::test]
    async fn test_forward_depth_limit() {
        let data = GraphBuilder::new("recurse")
            .add_node("r", "Test.Recurse")
            .connect_control("r", "body", "r")
            .build();
        let graph = compile(&data);
        let executor = Executor::new(EngineConfig {
            max_forward_depth: 4,
            ..Default::default()
        });

        let err = executor.dispatch(&graph, DispatchRequest::node("r")).await.unwrap_err();
        assert!(matches!(err, CeresError::ForwardDepthExceeded(4)));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let data = GraphBuilder::new("loop")
            .add_node("s", "Test.Start")
            .with_fields(serde_json::json!({"event": "Spin"}))
            .connect_control("s", "next", "s")
            .build();
        let graph = compile(&data);
        let executor = Executor::new(EngineConfig {
            max_chain_steps: Some(10),
            ..Default::default()
        });

        let err = executor.dispatch(&graph, DispatchRequest::event("Spin")).await.unwrap_err();
        assert!(matches!(err, CeresError::StepLimitExceeded(10)));
    }

    #[tokio::test]
    async fn test_node_error_faults_dispatch() {
        let data = GraphBuilder::new("fail")
            .add_node("start", "Test.Start")
            .with_fields(serde_json::json!({"event": "Go"}))
            .add_node("f", "Test.Fail")
            .connect_control("start", "next", "f")
            .build();
        let graph = compile(&data);
        let sink = Arc::new(VecEventSink::new());
        let executor = Executor::default().with_sink(sink.clone());

        let err = executor.dispatch(&graph, DispatchRequest::event("Go")).await.unwrap_err();
        assert!(matches!(err, CeresError::ExecutionFailed(_)));
        let events = sink.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, GraphEvent::NodeFailed { node_guid, .. } if node_guid == "f")));
        assert!(matches!(events.last(), Some(GraphEvent::DispatchFailed { .. })));
    }

    #[tokio::test]
    async fn test_local_and_library_functions() {
        let function = GraphBuilder::new("double")
            .add_node("in", "Test.DoubleArg")
            .with_fields(serde_json::json!({"name": "double"}))
            .build();
        let data = GraphBuilder::new("caller")
            .add_node("call", "Test.Call")
            .with_fields(serde_json::json!({"function": "double", "arg": 21}))
            .add_function("double", function.clone())
            .build();
        let graph = compile(&data);

        let outcome = Executor::default()
            .dispatch(&graph, DispatchRequest::node("call"))
            .await
            .unwrap();
        assert_eq!(outcome.returned, Some(Value::Int(42)));
        assert_eq!(outcome.trace, vec!["call", "in"]);

        // the same function served from the executor's library
        let data = GraphBuilder::new("caller")
            .add_node("call", "Test.Call")
            .with_fields(serde_json::json!({"function": "double", "arg": 4}))
            .build();
        let graph = compile(&data);
        let mut library = FunctionLibrary::new();
        library.insert("double", Arc::new(compile(&function)));
        let outcome = Executor::default()
            .with_functions(library)
            .dispatch(&graph, DispatchRequest::node("call"))
            .await
            .unwrap();
        assert_eq!(outcome.returned, Some(Value::Int(8)));

        let err = Executor::default()
            .dispatch(&graph, DispatchRequest::node("call"))
            .await
            .unwrap_err();
        assert!(matches!(err, CeresError::UnknownFunction(_)));
    }

    #[tokio::test]
    async fn test_spawn() {
        let graph = Arc::new(compile(&chain_data()));
        let handle = Executor::default().spawn(graph, DispatchRequest::node("c"));
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.returned, Some(Value::Int(10)));
    }

    #[test]
    fn test_payload_return_box() {
        let payload = EventPayload::new("e", vec![Value::Int(1)]);
        assert_eq!(payload.arg(0), Value::Int(1));
        assert_eq!(payload.arg(3), Value::Null);
        payload.set_return(Value::Bool(true));
        payload.set_return(Value::Bool(false));
        assert_eq!(payload.take_return(), Some(Value::Bool(false)));
        assert_eq!(payload.returned(), None);
    }
}
