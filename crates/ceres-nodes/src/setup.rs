//! Extensions setup for host applications.
//!
//! Hosts call [`setup_extensions`] at startup so time-based nodes find a
//! scheduler in the shared `ExecutorExtensions`.

use std::sync::Arc;

use ceres_graph::{extension_keys, ExecutorExtensions, Scheduler, TokioScheduler};

/// Register a [`TokioScheduler`] unless the host already provided one.
///
/// Returns the registered scheduler when this call created it, so the host
/// can cancel pending waits on shutdown.
///
/// # Example
///
/// ```ignore
/// let mut extensions = ceres_graph::ExecutorExtensions::new();
/// let scheduler = ceres_nodes::setup_extensions(&mut extensions);
/// let executor = ceres_graph::Executor::default().with_extensions(extensions);
/// ```
pub fn setup_extensions(extensions: &mut ExecutorExtensions) -> Option<Arc<TokioScheduler>> {
    if extensions.has(extension_keys::SCHEDULER) {
        log::debug!("Scheduler already registered, keeping host scheduler");
        return None;
    }
    let scheduler = Arc::new(TokioScheduler::new());
    let shared: Arc<dyn Scheduler> = scheduler.clone();
    extensions.set(extension_keys::SCHEDULER, shared);
    log::info!("Registered tokio scheduler");
    Some(scheduler)
}
