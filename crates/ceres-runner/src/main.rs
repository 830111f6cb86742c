//! Ceres runner
//!
//! Loads a persisted graph, compiles it against the built-in node set and
//! dispatches one event. The dispatch's event stream is printed to stdout as
//! JSON lines, followed by the returned value if there is one.

mod options;

use std::process::ExitCode;
use std::sync::Arc;

use ceres_graph::{
    validate_graph, ChannelEventSink, CompileOptions, ConversionRegistry, DispatchRequest,
    EngineConfig, Executor, ExecutorExtensions, Graph, GraphData, NodeRegistry,
};
use clap::Parser;

use options::Options;

#[tokio::main]
async fn main() -> ExitCode {
    let options = Options::parse();

    // Config comes first so its level becomes the default log filter
    let config = match EngineConfig::load(&options.config).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {:?}: {}", options.config, e);
            return ExitCode::FAILURE;
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .format_timestamp_millis()
    .init();
    config.apply_log_level();

    log::info!("Ceres runner starting...");

    match run(options, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(options: Options, config: EngineConfig) -> ceres_graph::Result<()> {
    let data = GraphData::load(&options.graph).await?;
    let registry = NodeRegistry::with_builtins();
    log::info!(
        "Loaded graph '{}' ({} nodes, {} node types available)",
        data.name,
        data.nodes.len(),
        registry.len()
    );

    let conversions = ConversionRegistry::global();
    for problem in validate_graph(&data, &registry, &conversions) {
        log::warn!("{}", problem);
    }
    let graph = Graph::build(&data, &registry, &CompileOptions::default())?;

    let mut extensions = ExecutorExtensions::new();
    let scheduler = ceres_nodes::setup_extensions(&mut extensions);
    let (sink, mut events) = ChannelEventSink::new();
    let executor = Executor::new(config)
        .with_sink(Arc::new(sink))
        .with_extensions(extensions);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("Failed to encode event: {}", e),
            }
        }
    });

    let request = DispatchRequest::event(options.event.clone()).with_args(options.args);
    let result = executor.dispatch(&graph, request).await;

    if let Some(scheduler) = scheduler {
        let cancelled = scheduler.cancel_all();
        if cancelled > 0 {
            log::debug!("Cancelled {} pending waits", cancelled);
        }
    }
    // dropping the executor closes the event channel
    drop(executor);
    if let Err(e) = printer.await {
        log::warn!("Event printer stopped: {}", e);
    }
    graph.dispose();

    let outcome = result?;
    log::info!(
        "Event '{}' finished: {} nodes executed",
        options.event,
        outcome.nodes_executed
    );
    if let Some(value) = outcome.returned {
        println!("{}", value.to_json());
    }
    Ok(())
}
