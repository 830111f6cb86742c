//! Host timer subsystem contract
//!
//! Nodes that wait (delays, frame waits) ask the [`Scheduler`] for a
//! [`WaitToken`] and await it inside their `execute`. The token is
//! cancellable through a [`CancelHandle`] or by id through the scheduler;
//! cancellation resolves the wait with [`CeresError::Cancelled`], which faults
//! the dispatch that was awaiting it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{CeresError, Result};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancels the wait of one [`WaitToken`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    id: u64,
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::AcqRel) {
            // notify_one keeps a permit if the waiter has not polled yet
            self.state.notify.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

/// Runs a cleanup once, when dropped
struct Release(Option<Box<dyn FnOnce() + Send>>);

impl Drop for Release {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// An awaitable, cancellable wait
///
/// Dropping the token, awaited or not, runs its release hook.
pub struct WaitToken {
    id: u64,
    state: Arc<CancelState>,
    wait: BoxFuture<'static, ()>,
    release: Release,
}

impl WaitToken {
    /// Wrap a future as a cancellable wait
    pub fn new<F>(id: u64, wait: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            id,
            state: Arc::new(CancelState::default()),
            wait: wait.boxed(),
            release: Release(None),
        }
    }

    /// Run `release` when the token finishes waiting or is dropped
    pub fn on_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Release(Some(Box::new(release)));
        self
    }

    /// A wait that completes immediately
    pub fn ready(id: u64) -> Self {
        Self::new(id, std::future::ready(()))
    }

    /// Host-visible id of the wait
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            id: self.id,
            state: self.state.clone(),
        }
    }

    /// Wait for completion or cancellation
    pub async fn wait(self) -> Result<()> {
        let WaitToken {
            state,
            wait,
            release: _release,
            ..
        } = self;
        if state.cancelled.load(Ordering::Acquire) {
            return Err(CeresError::Cancelled);
        }
        tokio::select! {
            _ = wait => Ok(()),
            _ = state.notify.notified() => Err(CeresError::Cancelled),
        }
    }
}

impl std::fmt::Debug for WaitToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitToken")
            .field("id", &self.id)
            .field("cancelled", &self.state.cancelled.load(Ordering::Acquire))
            .finish()
    }
}

/// Timer service used by waiting nodes
pub trait Scheduler: Send + Sync {
    /// Start a delay; the returned token completes after `duration`
    fn delay(&self, duration: Duration) -> WaitToken;

    /// Cancel a pending wait by id; returns whether it was pending
    fn cancel(&self, id: u64) -> bool;
}

/// [`Scheduler`] backed by `tokio::time`
#[derive(Default)]
pub struct TokioScheduler {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, CancelHandle>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of live waits: issued, not yet finished, cancelled or dropped
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Cancel every pending wait
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<CancelHandle> = self.pending.lock().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.cancel();
        }
        drained.len()
    }
}

impl Scheduler for TokioScheduler {
    fn delay(&self, duration: Duration) -> WaitToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).max(1);
        let pending = Arc::downgrade(&self.pending);
        let token = WaitToken::new(id, tokio::time::sleep(duration)).on_release(move || {
            if let Some(pending) = pending.upgrade() {
                pending.lock().remove(&id);
            }
        });
        self.pending.lock().insert(id, token.cancel_handle());
        log::trace!("Scheduled wait {} for {:?}", id, duration);
        token
    }

    fn cancel(&self, id: u64) -> bool {
        match self.pending.lock().remove(&id) {
            Some(handle) => {
                handle.cancel();
                log::debug!("Cancelled wait {}", id);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delay_completes() {
        let scheduler = TokioScheduler::new();
        let token = scheduler.delay(Duration::from_millis(5));
        assert_eq!(scheduler.pending(), 1);
        token.wait().await.unwrap();
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_wait() {
        let token = WaitToken::new(7, std::future::pending::<()>());
        token.cancel_handle().cancel();
        assert!(matches!(token.wait().await, Err(CeresError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_by_id_while_waiting() {
        let scheduler = Arc::new(TokioScheduler::new());
        let token = scheduler.delay(Duration::from_secs(3600));
        let id = token.id();

        let waiter = tokio::spawn(token.wait());
        tokio::task::yield_now().await;
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(CeresError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_token_is_no_longer_pending() {
        let scheduler = TokioScheduler::new();
        let token = scheduler.delay(Duration::from_secs(3600));
        assert_eq!(scheduler.pending(), 1);
        drop(token);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.cancel_all(), 0);
    }

    #[tokio::test]
    async fn test_handle_cancel_clears_pending() {
        let scheduler = TokioScheduler::new();
        let token = scheduler.delay(Duration::from_secs(3600));
        let id = token.id();
        token.cancel_handle().cancel();
        assert!(matches!(token.wait().await, Err(CeresError::Cancelled)));
        assert_eq!(scheduler.pending(), 0);
        assert!(!scheduler.cancel(id));
    }

    #[tokio::test]
    async fn test_aborted_waiter_is_no_longer_pending() {
        let scheduler = TokioScheduler::new();
        let waiter = tokio::spawn(scheduler.delay(Duration::from_secs(3600)).wait());
        tokio::task::yield_now().await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_ready_token() {
        WaitToken::ready(1).wait().await.unwrap();
    }
}
