use crate::bucket_spec::{validate_bucket_types, BucketTypes};
use crate::drainer::{BucketDrainer, DrainReport};
use crate::error::{Error, Result};
use crate::job::{Job, TaskHandler};
use crate::keys::{self, BucketFlag};
use crate::recorder::UsageRecorder;
use crate::store::CounterStore;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Leaky bucket rate limiter for flagged jobs.
///
/// Construction starts one drain timer per bucket type. Any number of
/// processes may run a limiter against the same store.
pub struct LeakyBucketRateLimiter {
    inner: Arc<Inner>,
    shutdown: watch::Sender<bool>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    store: Arc<dyn CounterStore>,
    recorder: UsageRecorder,
    bucket_types: BucketTypes,
    drainers: Vec<BucketDrainer>,
}

impl LeakyBucketRateLimiter {
    /// Create the limiter and start its drain timers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<dyn CounterStore>, bucket_types: BucketTypes) -> Result<Self> {
        validate_bucket_types(&bucket_types)?;

        let drainers: Vec<BucketDrainer> = bucket_types
            .iter()
            .map(|(bucket_type, spec)| {
                BucketDrainer::new(store.clone(), bucket_type.clone(), spec.clone())
            })
            .collect();

        let (shutdown, _) = watch::channel(false);
        let timers = drainers
            .iter()
            .map(|drainer| spawn_drain_timer(drainer.clone(), shutdown.subscribe()))
            .collect();

        tracing::info!(
            target: "job_throttler::rate_limiter",
            bucket_types = bucket_types.len(),
            "leaky bucket rate limiter started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                recorder: UsageRecorder::new(store.clone()),
                store,
                bucket_types,
                drainers,
            }),
            shutdown,
            timers: Mutex::new(timers),
        })
    }

    /// Wrap a task so every run first records usage for the job's bucket flags.
    pub fn wrap_task<T: TaskHandler>(&self, task: T) -> WrappedTask<T> {
        WrappedTask {
            inner: self.inner.clone(),
            task,
        }
    }

    /// Record one use of every configured bucket named by the job's flags.
    pub async fn record_job_usage(&self, job: &Job) -> Result<()> {
        self.inner.record_job_usage(job).await
    }

    /// Bucket ids currently overloaded; jobs carrying any of them must not run.
    pub async fn forbidden_flags(&self) -> Result<Vec<String>> {
        self.inner.store.set_members(keys::OVERLOADED_BUCKETS).await
    }

    /// Run one drain pass for every bucket type, outside the timer schedule.
    ///
    /// Every type's pass runs to completion; a failing type only affects its
    /// own entry.
    pub async fn drain_all_buckets_once(&self) -> HashMap<String, Result<DrainReport>> {
        let reports = join_all(self.inner.drainers.iter().map(|drainer| async move {
            let report = drainer.drain_once().await;
            if let Err(e) = &report {
                tracing::warn!(
                    target: "job_throttler::rate_limiter",
                    bucket_type = %drainer.bucket_type(),
                    error = %e,
                    "drain pass failed"
                );
            }
            (drainer.bucket_type().to_string(), report)
        }))
        .await;

        reports.into_iter().collect()
    }

    /// Cancel all drain timers. Drains already in flight run to completion.
    pub fn stop(&self) {
        let was_stopped = self.shutdown.send_replace(true);
        if !was_stopped {
            tracing::info!(target: "job_throttler::rate_limiter", "drain timers stopped");
        }
    }

    /// Stop the timers and wait for their loops to exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop();

        let timers = std::mem::take(
            &mut *self
                .timers
                .lock()
                .map_err(|_| Error::Internal("Failed to acquire timer lock".into()))?,
        );

        for timer in timers {
            if let Err(e) = timer.await {
                tracing::warn!(
                    target: "job_throttler::rate_limiter",
                    error = %e,
                    "drain timer ended abnormally"
                );
            }
        }

        Ok(())
    }
}

impl Drop for LeakyBucketRateLimiter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    async fn record_job_usage(&self, job: &Job) -> Result<()> {
        let uses = job
            .flags
            .iter()
            .filter_map(|flag| BucketFlag::parse(flag))
            .filter_map(|flag| {
                self.bucket_types
                    .get(flag.bucket_type)
                    .map(|spec| (flag, spec))
            })
            .map(|(flag, spec)| {
                self.recorder
                    .record_use(flag.bucket_type, flag.bucket_name, spec)
            });

        // Every use is attempted before the first error is reported
        join_all(uses).await.into_iter().collect()
    }
}

/// A task whose runs are counted against the buckets named by the job's flags.
pub struct WrappedTask<T> {
    inner: Arc<Inner>,
    task: T,
}

#[async_trait]
impl<T: TaskHandler> TaskHandler for WrappedTask<T> {
    async fn run(&self, payload: serde_json::Value, job: &Job) -> anyhow::Result<()> {
        // Usage must be recorded before the task body runs; a store failure
        // fails the job instead of letting it run uncounted
        self.inner.record_job_usage(job).await?;
        self.task.run(payload, job).await
    }
}

fn spawn_drain_timer(
    drainer: BucketDrainer,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = drainer.spec().drain_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            // Drains run detached; ticks never wait on them
            let drainer = drainer.clone();
            tokio::spawn(async move {
                if let Err(e) = drainer.drain_once().await {
                    tracing::error!(
                        target: "job_throttler::rate_limiter",
                        bucket_type = %drainer.bucket_type(),
                        error = %e,
                        "scheduled drain failed"
                    );
                }
            });
        }

        tracing::debug!(
            target: "job_throttler::rate_limiter",
            bucket_type = %drainer.bucket_type(),
            "drain timer exited"
        );
    })
}
