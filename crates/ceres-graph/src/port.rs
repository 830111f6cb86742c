//! Runtime ports
//!
//! A port is a shared value cell instantiated from a [`PortDescriptor`] when
//! its node is added to a graph. Ports never point at other nodes directly:
//! a linked data input stores the [`PortAddress`] of its source output, and a
//! control output stores the [`NodeHandle`] of its successor.

use parking_lot::RwLock;

use crate::arena::NodeHandle;
use crate::conversion::{Compatibility, ConversionRegistry};
use crate::descriptor::PortDescriptor;
use crate::error::{CeresError, Result};
use crate::types::{PortCapacity, PortDirection, PortKind, PortType};
use crate::value::Value;

/// Location of a port: owning node + position in its port list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortAddress {
    pub node: NodeHandle,
    pub port: usize,
}

impl PortAddress {
    pub fn new(node: NodeHandle, port: usize) -> Self {
        Self { node, port }
    }
}

/// Source of a linked data input
#[derive(Debug, Clone)]
pub struct PortLink {
    pub source: PortAddress,
    pub compatibility: Compatibility,
}

impl PortLink {
    /// Apply the link's conversion to a value read from the source
    pub fn convert(&self, value: Value) -> Value {
        match &self.compatibility {
            Compatibility::Direct => value,
            Compatibility::Converted(convert) => convert(&value),
        }
    }
}

/// A single port slot on a node
#[derive(Debug)]
pub struct Port {
    name: String,
    index: usize,
    port_type: PortType,
    direction: PortDirection,
    capacity: PortCapacity,
    kind: PortKind,
    value: RwLock<Value>,
    link: Option<PortLink>,
    target: Option<NodeHandle>,
}

impl Port {
    /// Instantiate array slot `index` of a declared port
    pub fn new(descriptor: &PortDescriptor, index: usize) -> Self {
        Self {
            name: descriptor.name.clone(),
            index,
            port_type: descriptor.port_type.clone(),
            direction: descriptor.direction,
            capacity: descriptor.capacity,
            kind: descriptor.kind,
            value: RwLock::new(Value::default_for(&descriptor.port_type)),
            link: None,
            target: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Array slot
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn port_type(&self) -> &PortType {
        &self.port_type
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn capacity(&self) -> PortCapacity {
        self.capacity
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn is_control(&self) -> bool {
        self.kind == PortKind::Control
    }

    /// `name` or `name[index]` for log messages
    pub fn label(&self) -> String {
        if self.index == 0 {
            self.name.clone()
        } else {
            format!("{}[{}]", self.name, self.index)
        }
    }

    /// Locally stored value (ignores any link)
    pub fn local_value(&self) -> Value {
        self.value.read().clone()
    }

    /// Overwrite the locally stored value
    pub fn set_value(&self, value: Value) {
        *self.value.write() = value;
    }

    /// Reset to the declared type's default
    pub fn reset(&self) {
        self.set_value(Value::default_for(&self.port_type));
    }

    /// Source of this input, if linked
    pub fn link(&self) -> Option<&PortLink> {
        self.link.as_ref()
    }

    /// Successor of this control output, if linked
    pub fn target(&self) -> Option<NodeHandle> {
        self.target
    }

    /// Check that `output` may feed `input`
    ///
    /// Directions must be opposite and kinds equal. Data ports additionally
    /// need identical types, an `any` side, or a converter registered for
    /// `output type -> input type`.
    pub fn check_link(
        output: &Port,
        input: &Port,
        conversions: &ConversionRegistry,
    ) -> Result<Compatibility> {
        if output.direction != PortDirection::Output || input.direction != PortDirection::Input {
            return Err(CeresError::InvalidDirection {
                from: output.label(),
                to: input.label(),
            });
        }
        if output.kind != input.kind {
            return Err(CeresError::IncompatiblePorts {
                from: format!("{} ({:?})", output.label(), output.kind),
                to: format!("{} ({:?})", input.label(), input.kind),
            });
        }
        if output.is_control() {
            return Ok(Compatibility::Direct);
        }
        conversions
            .compatibility(&output.port_type, &input.port_type)
            .ok_or_else(|| CeresError::IncompatiblePorts {
                from: output.port_type.to_string(),
                to: input.port_type.to_string(),
            })
    }

    /// Make this input read from `source`; replaces an earlier link
    pub(crate) fn attach(&mut self, link: PortLink) -> Option<PortLink> {
        self.link.replace(link)
    }

    /// Make this control output resolve to `target`
    pub(crate) fn set_target(&mut self, target: NodeHandle) {
        self.target = Some(target);
    }

    pub(crate) fn clear_links(&mut self) {
        self.link = None;
        self.target = None;
    }
}
