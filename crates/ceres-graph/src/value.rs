//! Dynamic values carried by ports and variables
//!
//! Ports are statically typed through their [`PortType`], but the storage is a
//! single [`Value`] enum so that the graph can hold heterogeneous nodes. Typed
//! access goes through [`FromValue`]; a failed extraction falls back to the
//! type's default, which is how unconnected or mistyped inputs behave.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::PortType;

/// Type-erased host object shared with the graph (entities, assets, handles)
pub type HostObject = Arc<dyn Any + Send + Sync>;

/// Weak reference to a host object
///
/// The graph never keeps host objects alive; a dropped object reads as destroyed.
#[derive(Clone)]
pub struct ObjectRef {
    kind: String,
    inner: Weak<dyn Any + Send + Sync>,
}

impl ObjectRef {
    /// Reference a host object of the given kind
    pub fn new<T: Any + Send + Sync>(kind: impl Into<String>, object: &Arc<T>) -> Self {
        let erased: HostObject = object.clone();
        Self {
            kind: kind.into(),
            inner: Arc::downgrade(&erased),
        }
    }

    /// Reference an already type-erased host object
    pub fn from_host(kind: impl Into<String>, object: &HostObject) -> Self {
        Self {
            kind: kind.into(),
            inner: Arc::downgrade(object),
        }
    }

    /// Kind name used for `object:<kind>` port types
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether the referenced object has been dropped
    pub fn is_destroyed(&self) -> bool {
        self.inner.strong_count() == 0
    }

    /// Upgrade to a strong reference if the object is still alive
    pub fn upgrade(&self) -> Option<HostObject> {
        self.inner.upgrade()
    }

    /// Upgrade and downcast to a concrete type
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.upgrade().and_then(|object| object.downcast::<T>().ok())
    }

    fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("kind", &self.kind)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// A value held by a port or variable
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
    Object(ObjectRef),
}

impl Value {
    /// Default value for a declared port type
    pub fn default_for(port_type: &PortType) -> Value {
        match port_type {
            PortType::Bool => Value::Bool(false),
            PortType::Int => Value::Int(0),
            PortType::Float => Value::Float(0.0),
            PortType::String => Value::String(String::new()),
            PortType::Any
            | PortType::Custom(_)
            | PortType::Json
            | PortType::Object(_)
            | PortType::Node
            | PortType::Generic(_) => Value::Null,
        }
    }

    /// Decode a persisted JSON value for a declared port type
    ///
    /// Values that do not fit the type decode to the type's default.
    pub fn from_json_typed(json: &serde_json::Value, port_type: &PortType) -> Value {
        let decoded = match port_type {
            PortType::Bool => json.as_bool().map(Value::Bool),
            PortType::Int => json.as_i64().map(Value::Int),
            PortType::Float => json.as_f64().map(Value::Float),
            PortType::String => json.as_str().map(|s| Value::String(s.to_string())),
            PortType::Json => Some(Value::Json(json.clone())),
            PortType::Any | PortType::Custom(_) => Some(Value::from(json.clone())),
            PortType::Object(_) | PortType::Node | PortType::Generic(_) => None,
        };
        decoded.unwrap_or_else(|| Value::default_for(port_type))
    }

    /// Encode as JSON for persistence; object references persist as null
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Object(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Json(j) => j.clone(),
        }
    }

    /// The natural port type of this value
    pub fn port_type(&self) -> PortType {
        match self {
            Value::Null => PortType::Any,
            Value::Bool(_) => PortType::Bool,
            Value::Int(_) => PortType::Int,
            Value::Float(_) => PortType::Float,
            Value::String(_) => PortType::String,
            Value::Json(_) => PortType::Json,
            Value::Object(obj) => PortType::Object(obj.kind().to_string()),
        }
    }

    /// Whether this is null or a destroyed object reference
    pub fn is_unset(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Object(obj) => obj.is_destroyed(),
            _ => false,
        }
    }

    /// Extract a typed value, falling back to `T::default()`
    pub fn get_or_default<T: FromValue + Default>(&self) -> T {
        T::from_value(self).unwrap_or_default()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            other => Value::Json(other),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// Extraction of a Rust value from a [`Value`]
pub trait FromValue: Sized {
    /// Returns `None` when the value has an incompatible shape
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromValue for usize {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|i| usize::try_from(i).ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(_) => None,
            other => Some(other.to_json()),
        }
    }
}

impl FromValue for ObjectRef {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(obj) => Some(obj.clone()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}
