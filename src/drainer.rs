//! Periodic draining of one bucket type.
//!
//! Every tracked bucket of the type is drained independently. A drain only
//! touches a bucket after winning its drain lock: a random token is written
//! with set-if-absent and read back, and only a matching read-back counts as
//! acquisition. Losing the lock means another drain already ran for this
//! bucket in the current interval.

use crate::bucket_spec::LeakyBucketSpec;
use crate::error::Result;
use crate::keys;
use crate::store::CounterStore;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// What happened to one bucket during a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Counter decremented; the bucket is still tracked.
    Drained { remaining: i64 },
    /// Counter dropped below zero and the bucket's state was removed.
    Emptied,
    /// Another drain holds the lock for this interval.
    Contended,
}

/// Summary of one drain pass over a bucket type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub drained: usize,
    pub emptied: usize,
    pub contended: usize,
    pub failed: usize,
}

impl DrainReport {
    fn record(&mut self, outcome: &Result<DrainOutcome>) {
        match outcome {
            Ok(DrainOutcome::Drained { .. }) => self.drained += 1,
            Ok(DrainOutcome::Emptied) => self.emptied += 1,
            Ok(DrainOutcome::Contended) => self.contended += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Drains all buckets of a single type.
#[derive(Clone)]
pub struct BucketDrainer {
    store: Arc<dyn CounterStore>,
    bucket_type: String,
    spec: LeakyBucketSpec,
}

impl BucketDrainer {
    pub fn new(
        store: Arc<dyn CounterStore>,
        bucket_type: impl Into<String>,
        spec: LeakyBucketSpec,
    ) -> Self {
        Self {
            store,
            bucket_type: bucket_type.into(),
            spec,
        }
    }

    pub fn bucket_type(&self) -> &str {
        &self.bucket_type
    }

    pub fn spec(&self) -> &LeakyBucketSpec {
        &self.spec
    }

    /// Run one drain pass over every tracked bucket of this type.
    ///
    /// Only failing to list the buckets is an error; a failure on one bucket
    /// is logged and counted without affecting the others.
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let bucket_names = self
            .store
            .set_members(&keys::instance_set_key(&self.bucket_type))
            .await?;

        let outcomes = join_all(bucket_names.iter().map(|name| self.drain_bucket(name))).await;

        let mut report = DrainReport::default();
        for (bucket_name, outcome) in bucket_names.iter().zip(&outcomes) {
            if let Err(e) = outcome {
                tracing::warn!(
                    target: "job_throttler::drainer",
                    bucket_type = %self.bucket_type,
                    bucket_name = %bucket_name,
                    error = %e,
                    "failed to drain bucket"
                );
            }
            report.record(outcome);
        }

        tracing::debug!(
            target: "job_throttler::drainer",
            bucket_type = %self.bucket_type,
            drained = report.drained,
            emptied = report.emptied,
            contended = report.contended,
            failed = report.failed,
            "drain pass complete"
        );

        Ok(report)
    }

    /// Drain a single bucket if its lock can be acquired.
    pub async fn drain_bucket(&self, bucket_name: &str) -> Result<DrainOutcome> {
        let capacity = self.spec.capacity_counter()?;
        let drain_count = self.spec.drain_count_counter()?;

        if !self.acquire_drain_lock(bucket_name).await? {
            tracing::trace!(
                target: "job_throttler::drainer",
                bucket_type = %self.bucket_type,
                bucket_name = %bucket_name,
                "drain lock held elsewhere, skipping"
            );
            return Ok(DrainOutcome::Contended);
        }

        let counter_key = keys::counter_key(&self.bucket_type, bucket_name);
        let remaining = self.store.decrement_by(&counter_key, drain_count).await?;

        if remaining < capacity {
            self.store
                .set_remove(
                    keys::OVERLOADED_BUCKETS,
                    &keys::bucket_id(&self.bucket_type, bucket_name),
                )
                .await?;
        }

        if remaining < 0 {
            self.store
                .delete_and_untrack(
                    &counter_key,
                    &keys::instance_set_key(&self.bucket_type),
                    bucket_name,
                )
                .await?;
            return Ok(DrainOutcome::Emptied);
        }

        Ok(DrainOutcome::Drained { remaining })
    }

    async fn acquire_drain_lock(&self, bucket_name: &str) -> Result<bool> {
        let lock_key = keys::drain_lock_key(&self.bucket_type, bucket_name);
        let token = Uuid::new_v4().to_string();

        self.store
            .set_if_absent_with_ttl(&lock_key, &token, self.spec.lock_ttl())
            .await?;

        // The read-back decides, not the set-if-absent reply
        let held_by = self.store.get(&lock_key).await?;
        Ok(held_by.as_deref() == Some(token.as_str()))
    }
}
