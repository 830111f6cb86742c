//! Event types for streaming dispatch progress
//!
//! Events are sent from the executor to any consumer (a host UI, a test, a
//! log pipe) independently of the logging facade.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Trait for sending graph events
///
/// Abstracts over the transport so the executor can be embedded anywhere.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Fails when the receiving side is gone
    fn send(&self, event: GraphEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted while dispatching a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GraphEvent {
    /// A dispatch started at an entry node
    #[serde(rename_all = "camelCase")]
    DispatchStarted {
        graph: String,
        dispatch_id: String,
        entry: String,
    },

    /// A dispatch ran to the end of its chain
    #[serde(rename_all = "camelCase")]
    DispatchCompleted {
        graph: String,
        dispatch_id: String,
        nodes_executed: usize,
    },

    /// A dispatch was faulted by an error
    #[serde(rename_all = "camelCase")]
    DispatchFailed {
        graph: String,
        dispatch_id: String,
        error: String,
    },

    /// A node started executing
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        dispatch_id: String,
        node_guid: String,
        node_type: String,
    },

    /// A node finished executing
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        dispatch_id: String,
        node_guid: String,
    },

    /// A node's execute returned an error
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        dispatch_id: String,
        node_guid: String,
        error: String,
    },

    /// A node asked to report a message (e.g. a log node)
    #[serde(rename_all = "camelCase")]
    NodeMessage {
        dispatch_id: String,
        node_guid: String,
        message: String,
    },
}

impl GraphEvent {
    /// Create a node message event
    pub fn node_message(dispatch_id: &str, node_guid: &str, message: impl Into<String>) -> Self {
        Self::NodeMessage {
            dispatch_id: dispatch_id.to_string(),
            node_guid: node_guid.to_string(),
            message: message.into(),
        }
    }

    /// Dispatch this event belongs to
    pub fn dispatch_id(&self) -> &str {
        match self {
            Self::DispatchStarted { dispatch_id, .. }
            | Self::DispatchCompleted { dispatch_id, .. }
            | Self::DispatchFailed { dispatch_id, .. }
            | Self::NodeStarted { dispatch_id, .. }
            | Self::NodeCompleted { dispatch_id, .. }
            | Self::NodeFailed { dispatch_id, .. }
            | Self::NodeMessage { dispatch_id, .. } => dispatch_id,
        }
    }
}

/// Discards every event; the executor's default
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: GraphEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Collects events in memory, mostly for assertions in tests
pub struct VecEventSink {
    events: Mutex<Vec<GraphEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.lock().clone()
    }

    /// Guids of started nodes, in order
    pub fn started_nodes(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                GraphEvent::NodeStarted { node_guid, .. } => Some(node_guid.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Sink that forwards events into an unbounded tokio channel
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<GraphEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GraphEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::channel_closed())
    }
}
