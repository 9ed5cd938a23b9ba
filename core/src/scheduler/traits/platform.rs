use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::scheduler::types::ExecutorOptions;

/// An isolated browsing context (browser context + page, profile dir, ...).
///
/// Owned by exactly one worker's session manager at a time.
#[async_trait]
pub trait ExecutionContext: Send {
    fn id(&self) -> &str;

    /// Scrub state left by the previous task: storage, caches, service
    /// workers, cookies, permissions, and navigate to a blank page.
    async fn reset(&mut self) -> anyhow::Result<()>;

    async fn close(&mut self) -> anyhow::Result<()>;

    /// Lets an executor reach the concrete context type its platform created.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A launched platform (e.g. one browser process) shared by all workers.
#[async_trait]
pub trait PlatformHandle: Send + Sync {
    async fn new_context(&self, worker_id: usize) -> anyhow::Result<Box<dyn ExecutionContext>>;

    async fn shutdown(&self) -> anyhow::Result<()>;
}

/// Launches the shared platform once per run.
#[async_trait]
pub trait AutomationPlatform: Send + Sync {
    fn name(&self) -> &str;

    async fn launch(&self, options: &ExecutorOptions) -> anyhow::Result<Arc<dyn PlatformHandle>>;
}
