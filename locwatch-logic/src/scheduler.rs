use std::sync::Arc;

use futures::future::BoxFuture;
use log::warn;
use tokio::{runtime::Handle, sync::mpsc};

use crate::prelude::*;

/// One scheduled run of an observer's update handler
pub type Task = BoxFuture<'static, ()>;

/// Decides where observer update handlers run
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task);

    /// A scheduler that runs its tasks one at a time, in the order they were scheduled.
    /// Every observer gets its own.
    fn serial(&self) -> Arc<dyn Scheduler>;
}

/// Spawns every task onto a tokio runtime, tasks for different observers don't wait on each
/// other.
#[derive(Clone)]
pub struct TokioScheduler(Handle);

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self(handle)
    }

    /// Use the runtime we're currently running in
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current().context("Not running inside a tokio runtime")?;
        Ok(Self(handle))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        self.0.spawn(task);
    }

    fn serial(&self) -> Arc<dyn Scheduler> {
        Arc::new(SerialScheduler::new(&self.0))
    }
}

/// Queues tasks for a single tokio task that runs them in order.
///
/// The draining task ends once every clone of this scheduler is dropped and the queue is empty.
#[derive(Clone)]
pub struct SerialScheduler {
    queue: mpsc::UnboundedSender<Task>,
}

impl SerialScheduler {
    pub fn new(handle: &Handle) -> Self {
        let (queue, mut tasks) = mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            while let Some(task) = tasks.recv().await {
                task.await;
            }
        });
        Self { queue }
    }
}

impl Scheduler for SerialScheduler {
    fn schedule(&self, task: Task) {
        if self.queue.send(task).is_err() {
            warn!("Serial task queue stopped, dropping task");
        }
    }

    fn serial(&self) -> Arc<dyn Scheduler> {
        Arc::new(self.clone())
    }
}

/// Runs every task to completion on the publishing thread before returning.
///
/// Handlers must not wait on anything that needs the publishing thread to make progress.
#[derive(Clone, Copy, Default)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn schedule(&self, task: Task) {
        futures::executor::block_on(task);
    }

    fn serial(&self) -> Arc<dyn Scheduler> {
        Arc::new(Self)
    }
}
