//! Built-in nodes running inside real dispatches

use std::sync::Arc;
use std::time::Duration;

use ceres_graph::{
    CeresError, CompileOptions, DispatchRequest, Executor, ExecutorExtensions, FunctionLibrary,
    Graph, GraphBuilder, GraphData, GraphEvent, NodeRegistry, ObjectRef, PortType, VariableData,
    VecEventSink,
};
use ceres_nodes::{setup_extensions, ForLoopNode, InvokeFunctionNode, SequenceNode};
use serde_json::json;

fn build(data: &GraphData) -> Graph {
    Graph::build(data, &NodeRegistry::with_builtins(), &CompileOptions::default()).unwrap()
}

fn start(builder: GraphBuilder) -> GraphBuilder {
    builder
        .add_node("start", "Ceres.Flow.ExecutionEvent")
        .with_fields(json!({"eventName": "Start"}))
}

#[tokio::test]
async fn test_loop_accumulates_into_blackboard_then_sequence() {
    let data = start(GraphBuilder::new("loop"))
        .add_variable(VariableData::new("total", PortType::Float, json!(0.0)))
        .add_node("loop", "Ceres.Flow.ForLoop")
        .with_constant(ForLoopNode::PORT_FIRST, json!(0))
        .with_constant(ForLoopNode::PORT_LAST, json!(3))
        .add_node("get", "Ceres.Variables.GetVariable")
        .with_fields(json!({"variable": "total"}))
        .add_node("add", "Ceres.Math.Add")
        .add_node("set", "Ceres.Variables.SetVariable")
        .with_fields(json!({"variable": "total"}))
        .add_node("seq", "Ceres.Flow.Sequence")
        .add_node("first", "Ceres.Flow.Log")
        .with_constant("message", json!("first"))
        .add_node("second", "Ceres.Flow.Log")
        .with_constant("message", json!("second"))
        .connect_control("start", "next", "loop")
        .connect_control("loop", ForLoopNode::PORT_BODY, "set")
        .connect("get", "value", "add", "a")
        .connect("loop", ForLoopNode::PORT_INDEX, "add", "b")
        .connect("add", "result", "set", "value")
        .connect_control("loop", ForLoopNode::PORT_COMPLETED, "seq")
        .connect_control_at("seq", SequenceNode::PORT_THEN, 0, "first")
        .connect_control_at("seq", SequenceNode::PORT_THEN, 1, "second")
        .build();
    let graph = build(&data);

    let outcome = Executor::default()
        .dispatch(&graph, DispatchRequest::event("Start"))
        .await
        .unwrap();

    assert_eq!(graph.blackboard().get_value::<f64>("total"), 3.0);
    assert_eq!(outcome.runs_of("set"), 3);
    // dependencies re-run for every consumer execution
    assert_eq!(outcome.runs_of("get"), 3);
    assert_eq!(outcome.runs_of("add"), 3);
    assert_eq!(&outcome.trace[outcome.trace.len() - 3..], ["seq", "first", "second"]);
}

#[tokio::test]
async fn test_events_and_messages_reach_sink() {
    let data = start(GraphBuilder::new("hello"))
        .add_node("log", "Ceres.Flow.Log")
        .with_constant("message", json!("hello"))
        .connect_control("start", "next", "log")
        .build();
    let graph = build(&data);
    let sink = Arc::new(VecEventSink::new());

    Executor::default()
        .with_sink(sink.clone())
        .dispatch(&graph, DispatchRequest::event("Start"))
        .await
        .unwrap();

    let events = sink.events();
    assert!(matches!(events.first(), Some(GraphEvent::DispatchStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(GraphEvent::DispatchCompleted { nodes_executed: 2, .. })
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        GraphEvent::NodeMessage { node_guid, message, .. }
            if node_guid == "log" && message == "hello"
    )));
    assert_eq!(sink.started_nodes(), vec!["start", "log"]);
}

fn delay_graph(seconds: f64) -> GraphData {
    start(GraphBuilder::new("delay"))
        .add_variable(VariableData::new("wait", PortType::Float, json!(0.0)))
        .add_node("delay", "Ceres.Flow.Delay")
        .with_constant("seconds", json!(seconds))
        .add_node("widen", "Ceres.Math.Add")
        .add_node("after", "Ceres.Variables.SetVariable")
        .with_fields(json!({"variable": "wait"}))
        .connect_control("start", "next", "delay")
        .connect("delay", "handle", "widen", "a")
        .connect("widen", "result", "after", "value")
        .connect_control("delay", "next", "after")
        .build()
}

#[tokio::test]
async fn test_delay_resumes_same_chain() {
    let graph = build(&delay_graph(0.01));
    let outcome = Executor::default()
        .dispatch(&graph, DispatchRequest::event("Start"))
        .await
        .unwrap();
    assert_eq!(outcome.trace.last().map(String::as_str), Some("after"));
    // the handle converts to a float wait id
    assert!(graph.blackboard().get_value::<f64>("wait") >= 1.0);
}

#[tokio::test]
async fn test_cancelled_delay_faults_dispatch() {
    let mut extensions = ExecutorExtensions::new();
    let scheduler = setup_extensions(&mut extensions).unwrap();
    let executor = Executor::default().with_extensions(extensions);
    let graph = Arc::new(build(&delay_graph(3600.0)));

    let handle = executor.spawn(graph.clone(), DispatchRequest::event("Start"));
    tokio::time::timeout(Duration::from_secs(5), async {
        while scheduler.pending() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(scheduler.cancel_all(), 1);

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(CeresError::Cancelled)));
    assert_eq!(graph.blackboard().get_value::<f64>("wait"), 0.0);
}

/// `input.args[0] * factor -> output`
fn scale_function(name: &str, factor: f64) -> GraphData {
    GraphBuilder::new(name)
        .add_node("in", "Ceres.Functions.FunctionInput")
        .with_fields(json!({"functionName": name}))
        .add_node("mul", "Ceres.Math.Multiply")
        .with_constant("b", json!(factor))
        .add_node("out", "Ceres.Functions.FunctionOutput")
        .connect_at(("in", "args", 0), ("mul", "a", 0))
        .connect("mul", "result", "out", "value")
        .connect_control("in", "next", "out")
        .build()
}

fn caller(function: &str, arg: serde_json::Value) -> GraphBuilder {
    start(GraphBuilder::new("caller"))
        .add_variable(VariableData::new("answer", PortType::Float, json!(0.0)))
        .add_node("call", "Ceres.Functions.InvokeFunction")
        .with_fields(json!({"functionName": function}))
        .with_constant_at(InvokeFunctionNode::PORT_ARGS, 0, arg)
        .add_node("set", "Ceres.Variables.SetVariable")
        .with_fields(json!({"variable": "answer"}))
        .connect_control("start", "next", "call")
        .connect("call", InvokeFunctionNode::PORT_RESULT, "set", "value")
        .connect_control("call", InvokeFunctionNode::PORT_NEXT, "set")
}

#[tokio::test]
async fn test_local_function_returns_value() {
    let data = caller("Double", json!(21))
        .add_function("Double", scale_function("Double", 2.0))
        .build();
    let graph = build(&data);

    Executor::default()
        .dispatch(&graph, DispatchRequest::event("Start"))
        .await
        .unwrap();
    assert_eq!(graph.blackboard().get_value::<f64>("answer"), 42.0);
}

#[tokio::test]
async fn test_library_function_and_unknown_function() {
    let mut library = FunctionLibrary::new();
    library.insert("Triple", Arc::new(build(&scale_function("Triple", 3.0))));
    let executor = Executor::default().with_functions(library);

    let graph = build(&caller("Triple", json!(5)).build());
    executor
        .dispatch(&graph, DispatchRequest::event("Start"))
        .await
        .unwrap();
    assert_eq!(graph.blackboard().get_value::<f64>("answer"), 15.0);

    let graph = build(&caller("Missing", json!(5)).build());
    let err = executor
        .dispatch(&graph, DispatchRequest::event("Start"))
        .await
        .unwrap_err();
    assert!(matches!(err, CeresError::UnknownFunction(name) if name == "Missing"));
}

struct Door;

#[tokio::test]
async fn test_describe_target_defaults_to_trigger() {
    let data = start(GraphBuilder::new("doors"))
        .add_variable(VariableData::new("kind", PortType::String, json!("")))
        .add_node("describe", "Ceres.Objects.DescribeTarget")
        .add_node("set", "Ceres.Variables.SetVariable")
        .with_fields(json!({"variable": "kind"}))
        .connect("describe", "kind", "set", "value")
        .connect_control("start", "next", "set")
        .build();
    let graph = build(&data);
    let executor = Executor::default();

    let door = Arc::new(Door);
    let trigger = ObjectRef::new("Door", &door);
    executor
        .dispatch(&graph, DispatchRequest::event("Start").with_trigger(trigger.clone()))
        .await
        .unwrap();
    assert_eq!(graph.blackboard().get_value::<String>("kind"), "Door");

    drop(door);
    executor
        .dispatch(&graph, DispatchRequest::event("Start").with_trigger(trigger))
        .await
        .unwrap();
    assert_eq!(graph.blackboard().get_value::<String>("kind"), "");
}

#[tokio::test]
async fn test_saved_graph_loads_and_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graphs").join("double.json");
    let data = caller("Double", json!(4))
        .add_function("Double", scale_function("Double", 2.0))
        .build();

    data.save(&path).await.unwrap();
    let loaded = GraphData::load(&path).await.unwrap();
    assert_eq!(loaded, data);

    let graph = build(&loaded);
    Executor::default()
        .dispatch(&graph, DispatchRequest::event("Start"))
        .await
        .unwrap();
    assert_eq!(graph.blackboard().get_value::<f64>("answer"), 8.0);
}
