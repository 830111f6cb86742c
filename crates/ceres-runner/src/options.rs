//! Command-line options

use std::path::PathBuf;

use ceres_graph::Value;
use clap::Parser;

/// Default event dispatched when none is named
pub const DEFAULT_EVENT: &str = "Start";

/// Default engine config location, relative to the working directory
pub const DEFAULT_CONFIG: &str = "ceres.json";

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "ceres-runner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Load a Ceres graph and dispatch one event")]
pub struct Options {
    /// Persisted graph (JSON)
    pub graph: PathBuf,

    /// Event to dispatch
    #[arg(default_value = DEFAULT_EVENT)]
    pub event: String,

    /// Engine config file, defaults apply when it does not exist
    #[arg(short, long, env = "CERES_CONFIG", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Positional event argument as JSON; repeat for more
    #[arg(
        long = "arg",
        value_name = "JSON",
        value_parser = parse_json_value,
        allow_hyphen_values = true
    )]
    pub args: Vec<Value>,
}

fn parse_json_value(text: &str) -> Result<Value, String> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|e| format!("invalid JSON '{}': {}", text, e))
}
