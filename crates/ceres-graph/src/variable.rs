//! Shared variables, the per-graph blackboard and the global variable table
//!
//! A [`SharedVariable`] is a named, typed storage cell. It can be bound to
//! another variable, after which reads and writes are forwarded to the
//! target. The target is stored once at bind time, so a forwarding chain is
//! never re-resolved; binding refuses to close a cycle.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CeresError, Result};
use crate::types::PortType;
use crate::value::{FromValue, Value};

/// Persisted form of a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableData {
    pub name: String,
    pub value_type: PortType,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub is_exposed: bool,
}

impl VariableData {
    pub fn new(name: impl Into<String>, value_type: PortType, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            value_type,
            value,
            is_shared: true,
            is_global: false,
            is_exposed: false,
        }
    }

    /// Mark the variable as linked to the global table
    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    /// Mark the variable as exposed to the host
    pub fn exposed(mut self) -> Self {
        self.is_exposed = true;
        self
    }
}

#[derive(Debug)]
enum VariableState {
    Local(Value),
    Bound {
        target: Arc<SharedVariable>,
        local: Value,
    },
}

/// Named, typed, bindable storage cell
#[derive(Debug)]
pub struct SharedVariable {
    name: String,
    value_type: PortType,
    is_shared: bool,
    is_global: bool,
    is_exposed: bool,
    state: RwLock<VariableState>,
}

impl SharedVariable {
    /// Create a local, shared variable
    pub fn new(name: impl Into<String>, value_type: PortType, value: Value) -> Self {
        Self {
            name: name.into(),
            value_type,
            is_shared: true,
            is_global: false,
            is_exposed: false,
            state: RwLock::new(VariableState::Local(value)),
        }
    }

    /// Hydrate from persisted data
    pub fn from_data(data: &VariableData) -> Self {
        Self {
            name: data.name.clone(),
            value_type: data.value_type.clone(),
            is_shared: data.is_shared,
            is_global: data.is_global,
            is_exposed: data.is_exposed,
            state: RwLock::new(VariableState::Local(Value::from_json_typed(
                &data.value,
                &data.value_type,
            ))),
        }
    }

    /// Persisted form carrying the current effective value
    pub fn to_data(&self) -> VariableData {
        VariableData {
            name: self.name.clone(),
            value_type: self.value_type.clone(),
            value: self.get().to_json(),
            is_shared: self.is_shared,
            is_global: self.is_global,
            is_exposed: self.is_exposed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &PortType {
        &self.value_type
    }

    pub fn is_shared(&self) -> bool {
        self.is_shared
    }

    pub fn is_global(&self) -> bool {
        self.is_global
    }

    pub fn is_exposed(&self) -> bool {
        self.is_exposed
    }

    /// Read the effective value, following the binding if any
    pub fn get(&self) -> Value {
        let target = match &*self.state.read() {
            VariableState::Local(value) => return value.clone(),
            VariableState::Bound { target, .. } => target.clone(),
        };
        target.get()
    }

    /// Read a typed value, falling back to the type's default
    pub fn get_as<T: FromValue + Default>(&self) -> T {
        self.get().get_or_default()
    }

    /// Write the effective value, following the binding if any
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        let target = {
            let mut state = self.state.write();
            match &mut *state {
                VariableState::Local(local) => {
                    *local = value;
                    return;
                }
                VariableState::Bound { target, .. } => target.clone(),
            }
        };
        target.set(value);
    }

    /// The variable this one forwards to, if bound
    pub fn bound_target(&self) -> Option<Arc<SharedVariable>> {
        match &*self.state.read() {
            VariableState::Local(_) => None,
            VariableState::Bound { target, .. } => Some(target.clone()),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound_target().is_some()
    }

    /// Forward reads and writes to `target`
    ///
    /// Fails if `target` is this variable or already forwards (directly or
    /// transitively) to this variable.
    pub fn bind(&self, target: &Arc<SharedVariable>) -> Result<()> {
        let mut cursor = Some(target.clone());
        while let Some(current) = cursor {
            if std::ptr::eq(Arc::as_ptr(&current), self) {
                return Err(CeresError::VariableBinding(format!(
                    "binding '{}' to '{}' would form a cycle",
                    self.name, target.name
                )));
            }
            cursor = current.bound_target();
        }

        let mut state = self.state.write();
        let local = match &mut *state {
            VariableState::Local(value) => std::mem::take(value),
            VariableState::Bound { local, .. } => std::mem::take(local),
        };
        *state = VariableState::Bound {
            target: target.clone(),
            local,
        };
        Ok(())
    }

    /// Drop the binding and revert to local storage
    pub fn unbind(&self) {
        let mut state = self.state.write();
        if let VariableState::Bound { local, .. } = &mut *state {
            let local = std::mem::take(local);
            *state = VariableState::Local(local);
        }
    }

    /// Copy of the value and flags; the copy starts unbound
    pub fn clone_unbound(&self) -> SharedVariable {
        SharedVariable {
            name: self.name.clone(),
            value_type: self.value_type.clone(),
            is_shared: self.is_shared,
            is_global: self.is_global,
            is_exposed: self.is_exposed,
            state: RwLock::new(VariableState::Local(self.get())),
        }
    }
}

/// Named variable set owned by a graph
#[derive(Debug, Default)]
pub struct Blackboard {
    variables: Vec<Arc<SharedVariable>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self {
            variables: Vec::new(),
        }
    }

    /// Find a variable by name
    pub fn get(&self, name: &str) -> Option<&Arc<SharedVariable>> {
        self.variables.iter().find(|v| v.name() == name)
    }

    /// Read a typed value, `T::default()` if the variable is missing
    pub fn get_value<T: FromValue + Default>(&self, name: &str) -> T {
        self.get(name).map(|v| v.get_as()).unwrap_or_default()
    }

    /// Upsert by name
    ///
    /// Updates in place if a variable with the same name and a compatible type
    /// exists; otherwise appends a new variable typed after the value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Arc<SharedVariable> {
        let value = value.into();
        let value_type = value.port_type();
        let existing = self.variables.iter().find(|v| {
            v.name() == name
                && (v.value_type().accepts_directly(&value_type) || value_type == PortType::Any)
        });
        if let Some(variable) = existing {
            variable.set(value);
            return variable.clone();
        }
        let variable = Arc::new(SharedVariable::new(name, value_type, value));
        self.variables.push(variable.clone());
        variable
    }

    /// Append an existing variable
    pub fn insert(&mut self, variable: Arc<SharedVariable>) {
        self.variables.push(variable);
    }

    /// Remove every variable with this name
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.variables.len();
        self.variables.retain(|v| v.name() != name);
        before - self.variables.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SharedVariable>> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Unbind every variable
    pub fn dispose(&self) {
        for variable in &self.variables {
            variable.unbind();
        }
    }
}

/// Process-wide table of global variables keyed by name
#[derive(Debug, Default)]
pub struct GlobalVariables {
    variables: RwLock<HashMap<String, Arc<SharedVariable>>>,
}

static GLOBALS: LazyLock<Arc<GlobalVariables>> = LazyLock::new(|| Arc::new(GlobalVariables::new()));

impl GlobalVariables {
    pub fn new() -> Self {
        Self {
            variables: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide instance
    pub fn global() -> Arc<GlobalVariables> {
        GLOBALS.clone()
    }

    /// Insert or replace (last writer wins)
    pub fn insert(&self, variable: Arc<SharedVariable>) {
        self.variables
            .write()
            .insert(variable.name().to_string(), variable);
    }

    /// Set a value, creating the variable if needed
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Arc<SharedVariable> {
        let value = value.into();
        if let Some(existing) = self.get(name) {
            existing.set(value);
            return existing;
        }
        let variable = Arc::new(SharedVariable::new(name, value.port_type(), value));
        self.insert(variable.clone());
        variable
    }

    pub fn get(&self, name: &str) -> Option<Arc<SharedVariable>> {
        self.variables.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<SharedVariable>> {
        self.variables.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.variables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.read().is_empty()
    }
}
