//! The surface shared with the job-processing system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::marker::PhantomData;

/// Context of the job being executed, as handed to a task handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub task_identifier: String,
    /// Flags attached when the job was enqueued
    #[serde(default)]
    pub flags: BTreeSet<String>,
}

impl Job {
    pub fn new(id: impl Into<String>, task_identifier: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_identifier: task_identifier.into(),
            flags: BTreeSet::new(),
        }
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    /// A job may be dispatched only if none of its flags are forbidden.
    pub fn is_admissible(&self, forbidden: &HashSet<String>) -> bool {
        self.flags.iter().all(|flag| !forbidden.contains(flag))
    }
}

/// A unit of work run by the job-processing system.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, payload: serde_json::Value, job: &Job) -> anyhow::Result<()>;
}

/// [`TaskHandler`] built from an async closure, see [`task_fn`].
pub struct TaskFn<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Adapt an async closure into a [`TaskHandler`]. The closure receives an
/// owned copy of the job.
pub fn task_fn<F, Fut>(f: F) -> TaskFn<F, Fut>
where
    F: Fn(serde_json::Value, Job) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    TaskFn { f, _fut: PhantomData }
}

#[async_trait]
impl<F, Fut> TaskHandler for TaskFn<F, Fut>
where
    F: Fn(serde_json::Value, Job) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self, payload: serde_json::Value, job: &Job) -> anyhow::Result<()> {
        (self.f)(payload, job.clone()).await
    }
}
