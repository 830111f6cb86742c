//! Implicit port-type conversions
//!
//! Two ports of different types can only be linked when a converter from the
//! output's type to the input's type is registered. Registration is keyed by
//! the ordered `(from, to)` pair and is idempotent: the first converter
//! registered for a pair wins.
//!
//! Built-in node crates contribute converters at link time:
//!
//! ```ignore
//! inventory::submit!(ceres_graph::PortConversion {
//!     from: || PortType::Custom("SchedulerHandle".into()),
//!     to: || PortType::Float,
//!     convert: |v| Value::Float(v.get_or_default::<i64>() as f64),
//! });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use crate::types::PortType;
use crate::value::Value;

/// Converter function applied when an input reads from a differently typed output
pub type Converter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Link-time converter registration collected through `inventory`
pub struct PortConversion {
    /// Source (output) type
    pub from: fn() -> PortType,
    /// Destination (input) type
    pub to: fn() -> PortType,
    /// Conversion function
    pub convert: fn(&Value) -> Value,
}

inventory::collect!(PortConversion);

/// How an input reads from a linked output
#[derive(Clone)]
pub enum Compatibility {
    /// Types match (or one side is `Any`); the value is read as is
    Direct,
    /// The value goes through a registered converter
    Converted(Converter),
}

impl fmt::Debug for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compatibility::Direct => write!(f, "Direct"),
            Compatibility::Converted(_) => write!(f, "Converted"),
        }
    }
}

/// Registry of implicit conversions between port types
#[derive(Clone, Default)]
pub struct ConversionRegistry {
    converters: HashMap<(PortType, PortType), Converter>,
}

static GLOBAL: LazyLock<RwLock<ConversionRegistry>> =
    LazyLock::new(|| RwLock::new(ConversionRegistry::with_defaults()));

impl ConversionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Registry with numeric widening/narrowing plus every `inventory` submission
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.make_compatible(PortType::Int, PortType::Float, |v| {
            Value::Float(v.get_or_default::<i64>() as f64)
        });
        registry.make_compatible(PortType::Float, PortType::Int, |v| {
            Value::Int(v.get_or_default::<f64>() as i64)
        });
        for conversion in inventory::iter::<PortConversion> {
            registry.make_compatible((conversion.from)(), (conversion.to)(), conversion.convert);
        }
        registry
    }

    /// Register a converter for `from -> to`
    ///
    /// Returns `false` if the pair was already registered; the existing
    /// converter is kept.
    pub fn make_compatible<F>(&mut self, from: PortType, to: PortType, convert: F) -> bool
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let key = (from, to);
        if self.converters.contains_key(&key) {
            return false;
        }
        self.converters.insert(key, Arc::new(convert));
        true
    }

    /// Get the converter for `from -> to`, if any
    pub fn get(&self, from: &PortType, to: &PortType) -> Option<Converter> {
        self.converters.get(&(from.clone(), to.clone())).cloned()
    }

    /// Decide how an input of type `to` reads from an output of type `from`
    ///
    /// Returns `None` when the types are incompatible.
    pub fn compatibility(&self, from: &PortType, to: &PortType) -> Option<Compatibility> {
        if from.accepts_directly(to) || to.accepts_directly(from) {
            return Some(Compatibility::Direct);
        }
        self.get(from, to).map(Compatibility::Converted)
    }

    /// Whether `from` can feed `to`
    pub fn can_convert(&self, from: &PortType, to: &PortType) -> bool {
        self.compatibility(from, to).is_some()
    }

    /// Number of registered converters
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    /// Whether no converter is registered
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Register a converter in the process-wide registry
    ///
    /// Expected to run during startup, before any graph is compiled.
    pub fn register_global<F>(from: PortType, to: PortType, convert: F) -> bool
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        GLOBAL.write().make_compatible(from, to, convert)
    }

    /// Snapshot of the process-wide registry
    pub fn global() -> Arc<ConversionRegistry> {
        Arc::new(GLOBAL.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_defaults() {
        let registry = ConversionRegistry::with_defaults();
        let widen = registry.get(&PortType::Int, &PortType::Float).unwrap();
        assert_eq!(widen(&Value::Int(3)), Value::Float(3.0));
        let narrow = registry.get(&PortType::Float, &PortType::Int).unwrap();
        assert_eq!(narrow(&Value::Float(2.9)), Value::Int(2));
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut registry = ConversionRegistry::new();
        assert!(registry.make_compatible(PortType::Bool, PortType::String, |v| {
            Value::String(v.get_or_default::<bool>().to_string())
        }));
        assert!(!registry.make_compatible(PortType::Bool, PortType::String, |_| {
            Value::String("second".to_string())
        }));
        assert_eq!(registry.len(), 1);

        let convert = registry.get(&PortType::Bool, &PortType::String).unwrap();
        assert_eq!(convert(&Value::Bool(true)), Value::String("true".to_string()));
    }

    #[test]
    fn test_compatibility() {
        let registry = ConversionRegistry::with_defaults();
        assert!(matches!(
            registry.compatibility(&PortType::Int, &PortType::Int),
            Some(Compatibility::Direct)
        ));
        assert!(matches!(
            registry.compatibility(&PortType::Any, &PortType::String),
            Some(Compatibility::Direct)
        ));
        assert!(matches!(
            registry.compatibility(&PortType::Int, &PortType::Float),
            Some(Compatibility::Converted(_))
        ));
        assert!(registry.compatibility(&PortType::Float, &PortType::String).is_none());
    }

    #[test]
    fn test_global_snapshot() {
        ConversionRegistry::register_global(
            PortType::Custom("GlobalTestA".into()),
            PortType::Custom("GlobalTestB".into()),
            |v| v.clone(),
        );
        let snapshot = ConversionRegistry::global();
        assert!(snapshot.can_convert(
            &PortType::Custom("GlobalTestA".into()),
            &PortType::Custom("GlobalTestB".into())
        ));
    }
}
