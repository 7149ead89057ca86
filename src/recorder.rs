use crate::bucket_spec::LeakyBucketSpec;
use crate::error::Result;
use crate::keys;
use crate::store::CounterStore;
use std::sync::Arc;

/// Records bucket usage and flags buckets that reach capacity.
#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn CounterStore>,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Record one use of `bucket_type:bucket_name`.
    ///
    /// Tracks the bucket name and increments its counter in one batch, then
    /// adds the bucket to the overloaded set once the counter reaches capacity.
    /// Store errors are returned, never swallowed.
    pub async fn record_use(
        &self,
        bucket_type: &str,
        bucket_name: &str,
        spec: &LeakyBucketSpec,
    ) -> Result<()> {
        let capacity = spec.capacity_counter()?;
        let count = self
            .store
            .track_and_increment(
                &keys::instance_set_key(bucket_type),
                bucket_name,
                &keys::counter_key(bucket_type, bucket_name),
            )
            .await?;

        tracing::trace!(
            target: "job_throttler::recorder",
            bucket_type = %bucket_type,
            bucket_name = %bucket_name,
            count,
            "recorded bucket use"
        );

        if count >= capacity {
            self.store
                .set_add(
                    keys::OVERLOADED_BUCKETS,
                    &keys::bucket_id(bucket_type, bucket_name),
                )
                .await?;

            tracing::debug!(
                target: "job_throttler::recorder",
                bucket_type = %bucket_type,
                bucket_name = %bucket_name,
                count,
                capacity = spec.capacity,
                "bucket overloaded"
            );
        }

        Ok(())
    }
}
