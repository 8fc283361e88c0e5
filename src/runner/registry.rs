//! Background task registry
//!
//! Maps background ids to running tokio tasks. Each task is spawned around a
//! [`CancellationToken`]; cancelling the token makes the task drop its unit of
//! work and finish with `Ok(())`.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::{Error, Result};
use crate::scenario::StepKind;

/// A registered background task
struct BackgroundTask {
    /// Index of the step that launched it
    step_index: usize,
    kind: StepKind,
    cancel: CancellationToken,
    /// `None` once the task has been joined after ending cleanly on its own
    handle: Option<JoinHandle<Result<()>>>,
}

impl BackgroundTask {
    /// Cancel and wait for termination
    async fn shutdown(self, id: &str) -> Result<()> {
        self.cancel.cancel();
        match self.handle {
            Some(handle) => join(id, handle).await,
            None => Ok(()),
        }
    }
}

async fn join(id: &str, handle: JoinHandle<Result<()>>) -> Result<()> {
    handle
        .await
        .map_err(|e| Error::Execution(format!("Background task '{}' did not complete: {}", id, e)))?
}

/// A background task that ended with an error before it was stopped
#[derive(Debug)]
pub struct TaskFailure {
    pub id: String,
    /// Index of the step that launched the task
    pub step_index: usize,
    pub kind: StepKind,
    pub error: Error,
}

impl TaskFailure {
    /// Attribute the failure to the launching step
    pub fn into_error(self) -> Error {
        self.error.at_step(self.step_index, self.kind)
    }
}

/// Shared map of background id to running task
#[derive(Default)]
pub struct BackgroundTaskRegistry {
    tasks: Mutex<HashMap<String, BackgroundTask>>,
}

impl BackgroundTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `unit` under `id`
    ///
    /// On a duplicate id the unit is dropped without ever running.
    pub async fn start(
        &self,
        id: &str,
        step_index: usize,
        kind: StepKind,
        unit: BoxFuture<'static, Result<()>>,
    ) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(id) {
            return Err(Error::DuplicateTask(id.to_string()));
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Ok(()),
                res = unit => res,
            }
        });

        tracing::debug!(id, step_index, %kind, "Background task started");
        tasks.insert(
            id.to_string(),
            BackgroundTask {
                step_index,
                kind,
                cancel,
                handle: Some(handle),
            },
        );
        Ok(())
    }

    /// Cancel the task registered under `id` and wait for it to terminate
    ///
    /// Returns the task's own error if it failed before it was cancelled.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let task = self
            .tasks
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| Error::UnknownTask(id.to_string()))?;
        task.shutdown(id).await?;
        tracing::debug!(id, "Background task stopped");
        Ok(())
    }

    /// Cancel and join every registered task, returning how many there were
    ///
    /// Errors of individual tasks are logged, not returned.
    pub async fn cancel_all(&self) -> usize {
        let drained: Vec<(String, BackgroundTask)> = self.tasks.lock().await.drain().collect();
        let count = drained.len();
        for (_, task) in &drained {
            task.cancel.cancel();
        }
        for (id, task) in drained {
            if let Err(e) = task.shutdown(&id).await {
                tracing::warn!(id = %id, error = %e, "Background task ended with an error");
            }
        }
        count
    }

    /// Remove and return the first task that ended on its own with an error
    ///
    /// Tasks that ended cleanly stay registered so a later stop still succeeds.
    pub async fn reap_failed(&self) -> Option<TaskFailure> {
        let mut tasks = self.tasks.lock().await;
        let finished: Vec<String> = tasks
            .iter()
            .filter(|(_, task)| task.handle.as_ref().is_some_and(JoinHandle::is_finished))
            .map(|(id, _)| id.clone())
            .collect();

        for id in finished {
            let Some(task) = tasks.get_mut(&id) else {
                continue;
            };
            let Some(handle) = task.handle.take() else {
                continue;
            };
            match join(&id, handle).await {
                Ok(()) => {
                    tracing::debug!(id = %id, "Background task ended on its own");
                }
                Err(error) => {
                    let Some(task) = tasks.remove(&id) else {
                        continue;
                    };
                    return Some(TaskFailure {
                        id,
                        step_index: task.step_index,
                        kind: task.kind,
                        error,
                    });
                }
            }
        }
        None
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.tasks.lock().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
