//! Bounded worker pool
//!
//! Submitted futures are spawned immediately but only run once they hold one
//! of `size` permits. A task's panic is caught and becomes that task's
//! outcome; it never reaches sibling tasks or the caller.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task was cancelled before it finished")]
    Cancelled,
}

/// Result of one submitted task, tagged with the label it was submitted under
#[derive(Debug)]
pub struct TaskOutcome<L, T> {
    pub label: L,
    pub result: Result<T, TaskError>,
}

pub struct WorkerPool<L, T> {
    permits: Arc<Semaphore>,
    tasks: JoinSet<TaskOutcome<L, T>>,
}

impl<L, T> WorkerPool<L, T>
where
    L: Send + 'static,
    T: Send + 'static,
{
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
            tasks: JoinSet::new(),
        }
    }

    pub fn submit<F>(&mut self, label: L, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return TaskOutcome {
                        label,
                        result: Err(TaskError::Cancelled),
                    }
                },
            };

            let result = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|panic| TaskError::Panicked(panic_message(panic.as_ref())));

            TaskOutcome { label, result }
        });
    }

    /// Tasks submitted and not yet joined
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every submitted task, in completion order
    pub async fn join_all(mut self) -> Vec<TaskOutcome<L, T>> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                // Panics are caught inside the task, so only runtime shutdown lands here
                Err(e) => error!(error = %e, "Worker task was lost"),
            }
        }
        outcomes
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
