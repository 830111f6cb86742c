//! Typed extension map for non-serializable host services.
//!
//! `ExecutorExtensions` lets a host inject runtime objects (the scheduler,
//! asset loaders, game services) into execution. Every node reaches them
//! through its execution context.
//!
//! # Example
//!
//! ```ignore
//! let mut ext = ExecutorExtensions::new();
//! ext.set(extension_keys::SCHEDULER, Arc::new(TokioScheduler::new()) as Arc<dyn Scheduler>);
//!
//! // In a node:
//! if let Some(scheduler) = cx.extensions().get::<Arc<dyn Scheduler>>(extension_keys::SCHEDULER) {
//!     scheduler.delay(duration).wait().await?;
//! }
//! ```

use std::any::Any;
use std::collections::HashMap;

/// Host services keyed by name, each stored as `Box<dyn Any>`
///
/// A lookup with the wrong type reads as missing.
#[derive(Default)]
pub struct ExecutorExtensions {
    services: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ExecutorExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any earlier one under `key`
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, service: T) {
        if self.services.insert(key.to_string(), Box::new(service)).is_some() {
            log::debug!("Replaced executor extension '{}'", key);
        }
    }

    /// Builder form of [`set`](Self::set)
    pub fn with<T: Send + Sync + 'static>(mut self, key: &str, service: T) -> Self {
        self.set(key, service);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.services.get(key)?.downcast_ref()
    }

    pub fn has(&self, key: &str) -> bool {
        self.services.contains_key(key)
    }

    /// Drop a service; returns whether one was registered
    pub fn remove(&mut self, key: &str) -> bool {
        self.services.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ExecutorExtensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ExecutorExtensions").field("keys", &keys).finish()
    }
}

/// Well-known extension keys for standard services.
pub mod extension_keys {
    /// Key for `Arc<dyn Scheduler>`: timers used by waiting nodes.
    pub const SCHEDULER: &str = "scheduler";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lookup_is_typed() {
        let mut ext = ExecutorExtensions::new();
        ext.set("limit", 42u32);

        assert_eq!(ext.get::<u32>("limit"), Some(&42));
        assert!(ext.get::<String>("limit").is_none());
        assert!(ext.has("limit"));
        assert!(!ext.has("missing"));
    }

    #[test]
    fn test_builder_and_remove() {
        let mut ext = ExecutorExtensions::new().with("a", 1u8).with("b", 2u8);
        assert!(ext.remove("a"));
        assert!(!ext.remove("a"));
        assert_eq!(ext.keys().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(format!("{:?}", ext), r#"ExecutorExtensions { keys: ["b"] }"#);
    }

    #[test]
    fn test_trait_object_values() {
        use crate::scheduler::{Scheduler, TokioScheduler};

        let mut ext = ExecutorExtensions::new();
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new());
        ext.set(extension_keys::SCHEDULER, scheduler);
        assert!(ext
            .get::<Arc<dyn Scheduler>>(extension_keys::SCHEDULER)
            .is_some());
    }
}
