//! Per-worker execution context lifecycle.
//!
//! In fast isolation a worker keeps one context alive and scrubs it before
//! every task; in strict isolation every task gets its own context, closed
//! right after. A [`SessionLease`] mutably borrows its manager, so nothing
//! can hold on to a context past the lease's `cleanup()`.

use std::sync::Arc;
use std::time::Instant;

use crate::error::ExecutionError;

use super::traits::{ExecutionContext, PlatformHandle};
use super::types::IsolationMode;
use super::util::elapsed_ms;

enum SessionState {
    Uninitialized,
    Active(Box<dyn ExecutionContext>),
    Disposed,
}

impl SessionState {
    fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Active(_) => "active",
            Self::Disposed => "disposed",
        }
    }
}

pub struct SessionManager {
    worker_id: usize,
    mode: IsolationMode,
    platform: Arc<dyn PlatformHandle>,
    state: SessionState,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("worker_id", &self.worker_id)
            .field("mode", &self.mode)
            .field("state", &self.state.label())
            .finish()
    }
}

impl SessionManager {
    pub fn new(worker_id: usize, mode: IsolationMode, platform: Arc<dyn PlatformHandle>) -> Self {
        Self {
            worker_id,
            mode,
            platform,
            state: SessionState::Uninitialized,
        }
    }

    pub fn mode(&self) -> IsolationMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.state, SessionState::Disposed)
    }

    /// Pre-create the shared context in fast mode. No-op in strict mode.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        if self.mode == IsolationMode::Strict || self.is_active() {
            return Ok(());
        }
        if self.is_disposed() {
            anyhow::bail!("worker {} session already disposed", self.worker_id);
        }
        let ctx = self.platform.new_context(self.worker_id).await?;
        tracing::debug!(
            target: "shotrun.session",
            worker_id = self.worker_id,
            context = ctx.id(),
            "shared context created"
        );
        self.state = SessionState::Active(ctx);
        Ok(())
    }

    /// Hand out a context for one task.
    ///
    /// Fast mode resets the shared context first (re-creating it if a failed
    /// recycle or timeout left none); strict mode opens a new one.
    pub async fn acquire(&mut self) -> Result<SessionLease<'_>, ExecutionError> {
        let started = Instant::now();
        match self.mode {
            IsolationMode::Strict => {
                if self.is_disposed() {
                    return Err(self.disposed_error());
                }
                let ctx = self
                    .platform
                    .new_context(self.worker_id)
                    .await
                    .map_err(|e| ExecutionError::Session(e.to_string()))?;
                Ok(SessionLease {
                    worker_id: self.worker_id,
                    slot: LeaseSlot::Owned(ctx),
                    acquire_ms: elapsed_ms(started),
                    reset_ms: 0.0,
                })
            }
            IsolationMode::Fast => {
                if matches!(self.state, SessionState::Uninitialized) {
                    self.initialize()
                        .await
                        .map_err(|e| ExecutionError::Session(e.to_string()))?;
                }
                if !self.is_active() {
                    return Err(self.disposed_error());
                }
                let worker_id = self.worker_id;
                let SessionState::Active(ctx) = &mut self.state else {
                    return Err(ExecutionError::Session(format!(
                        "worker {worker_id} has no active context"
                    )));
                };
                let reset_started = Instant::now();
                reset_best_effort(worker_id, &mut **ctx).await;
                let reset_ms = elapsed_ms(reset_started);
                Ok(SessionLease {
                    worker_id,
                    slot: LeaseSlot::Shared(ctx),
                    acquire_ms: elapsed_ms(started),
                    reset_ms,
                })
            }
        }
    }

    /// Fully dispose and re-create the shared context. Fast mode only.
    ///
    /// On failure the manager is left uninitialized and the next `acquire`
    /// tries again.
    pub async fn recycle(&mut self) -> anyhow::Result<()> {
        if self.mode == IsolationMode::Strict {
            return Ok(());
        }
        self.close_shared().await;
        self.state = SessionState::Uninitialized;
        self.initialize().await
    }

    /// Drop the shared context without re-creating it, e.g. after an attempt
    /// timed out and the page may be wedged.
    pub async fn invalidate(&mut self) {
        if self.is_active() {
            self.close_shared().await;
            self.state = SessionState::Uninitialized;
        }
    }

    /// Release everything this worker holds. Terminal.
    pub async fn dispose(&mut self) -> anyhow::Result<()> {
        let prev = std::mem::replace(&mut self.state, SessionState::Disposed);
        if let SessionState::Active(mut ctx) = prev {
            tracing::debug!(
                target: "shotrun.session",
                worker_id = self.worker_id,
                context = ctx.id(),
                "disposing shared context"
            );
            ctx.close().await?;
        }
        Ok(())
    }

    async fn close_shared(&mut self) {
        if let SessionState::Active(ctx) = &mut self.state {
            if let Err(e) = ctx.close().await {
                tracing::warn!(
                    target: "shotrun.session",
                    worker_id = self.worker_id,
                    context = ctx.id(),
                    error = %e,
                    "closing shared context failed"
                );
            }
        }
    }

    fn disposed_error(&self) -> ExecutionError {
        ExecutionError::Session(format!(
            "worker {} session is {}",
            self.worker_id,
            self.state.label()
        ))
    }
}

async fn reset_best_effort(worker_id: usize, ctx: &mut dyn ExecutionContext) {
    if let Err(e) = ctx.reset().await {
        tracing::warn!(
            target: "shotrun.session",
            worker_id,
            context = ctx.id(),
            error = %e,
            "context reset failed, continuing"
        );
    }
}

enum LeaseSlot<'a> {
    Shared(&'a mut Box<dyn ExecutionContext>),
    Owned(Box<dyn ExecutionContext>),
}

/// A context checked out for exactly one task.
pub struct SessionLease<'a> {
    worker_id: usize,
    slot: LeaseSlot<'a>,
    acquire_ms: f64,
    reset_ms: f64,
}

impl SessionLease<'_> {
    pub fn handle(&mut self) -> &mut dyn ExecutionContext {
        match &mut self.slot {
            LeaseSlot::Shared(ctx) => &mut ***ctx,
            LeaseSlot::Owned(ctx) => &mut **ctx,
        }
    }

    /// Time spent getting the context ready, reset included.
    pub fn acquire_ms(&self) -> f64 {
        self.acquire_ms
    }

    /// Time spent scrubbing the shared context; 0 in strict mode.
    pub fn reset_ms(&self) -> f64 {
        self.reset_ms
    }

    /// Give the context back. Strict-mode contexts are closed here; close
    /// errors are logged, never surfaced to the task.
    pub async fn cleanup(self) {
        if let LeaseSlot::Owned(mut ctx) = self.slot {
            if let Err(e) = ctx.close().await {
                tracing::warn!(
                    target: "shotrun.session",
                    worker_id = self.worker_id,
                    context = ctx.id(),
                    error = %e,
                    "closing task context failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        closed: AtomicUsize,
        resets: AtomicUsize,
    }

    struct Ctx {
        id: String,
        counters: Arc<Counters>,
        fail_reset: bool,
    }

    #[async_trait]
    impl ExecutionContext for Ctx {
        fn id(&self) -> &str {
            &self.id
        }

        async fn reset(&mut self) -> anyhow::Result<()> {
            self.counters.resets.fetch_add(1, Ordering::SeqCst);
            if self.fail_reset {
                anyhow::bail!("service worker refused to unregister");
            }
            Ok(())
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Platform {
        counters: Arc<Counters>,
        fail_reset: bool,
    }

    #[async_trait]
    impl PlatformHandle for Platform {
        async fn new_context(&self, worker_id: usize) -> anyhow::Result<Box<dyn ExecutionContext>> {
            let n = self.counters.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Ctx {
                id: format!("w{worker_id}-c{n}"),
                counters: self.counters.clone(),
                fail_reset: self.fail_reset,
            }))
        }

        async fn shutdown(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn manager(mode: IsolationMode, fail_reset: bool) -> (SessionManager, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let platform = Arc::new(Platform {
            counters: counters.clone(),
            fail_reset,
        });
        (SessionManager::new(1, mode, platform), counters)
    }

    #[tokio::test]
    async fn fast_mode_reuses_one_context() {
        let (mut mgr, counters) = manager(IsolationMode::Fast, false);
        mgr.initialize().await.unwrap();

        for _ in 0..3 {
            let mut lease = mgr.acquire().await.unwrap();
            assert_eq!(lease.handle().id(), "w1-c0");
            lease.cleanup().await;
        }

        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(counters.resets.load(Ordering::SeqCst), 3);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 0);

        mgr.dispose().await.unwrap();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert!(mgr.is_disposed());
    }

    #[tokio::test]
    async fn strict_mode_opens_and_closes_per_task() {
        let (mut mgr, counters) = manager(IsolationMode::Strict, false);
        mgr.initialize().await.unwrap();
        assert_eq!(counters.created.load(Ordering::SeqCst), 0);

        for i in 0..2 {
            let mut lease = mgr.acquire().await.unwrap();
            assert_eq!(lease.handle().id(), format!("w1-c{i}"));
            assert_eq!(lease.reset_ms(), 0.0);
            lease.cleanup().await;
        }

        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
        assert_eq!(counters.resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_reset_is_swallowed() {
        let (mut mgr, counters) = manager(IsolationMode::Fast, true);
        mgr.initialize().await.unwrap();

        let lease = mgr.acquire().await;
        assert!(lease.is_ok());
        assert_eq!(counters.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recycle_replaces_shared_context() {
        let (mut mgr, counters) = manager(IsolationMode::Fast, false);
        mgr.initialize().await.unwrap();
        mgr.recycle().await.unwrap();

        let mut lease = mgr.acquire().await.unwrap();
        assert_eq!(lease.handle().id(), "w1-c1");
        lease.cleanup().await;
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidated_context_is_recreated_lazily() {
        let (mut mgr, counters) = manager(IsolationMode::Fast, false);
        mgr.initialize().await.unwrap();
        mgr.invalidate().await;
        assert!(!mgr.is_active());

        let lease = mgr.acquire().await.unwrap();
        lease.cleanup().await;
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disposed_manager_refuses_leases() {
        let (mut mgr, _) = manager(IsolationMode::Fast, false);
        mgr.initialize().await.unwrap();
        mgr.dispose().await.unwrap();

        let err = mgr.acquire().await.err().unwrap();
        assert!(matches!(err, ExecutionError::Session(_)));
    }
}
