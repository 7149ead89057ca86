use crate::error::{Error, Result};
use crate::keys;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Amount the drain lock expiry is shortened by so a lock can never survive
/// into the next scheduled drain tick.
pub const DRAIN_LOCK_SKEW: Duration = Duration::from_millis(10);

/// Leaky bucket policy for one bucket type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakyBucketSpec {
    /// Accumulated usage at which a bucket becomes overloaded
    pub capacity: u64,
    /// Time between drains
    #[serde(with = "humantime_serde")]
    pub drain_interval: Duration,
    /// Usage removed from each bucket per drain
    pub drain_count: u64,
}

/// Largest capacity or drain count a signed 64-bit store counter can hold.
pub const MAX_COUNTER: u64 = i64::MAX as u64;

/// Bucket type name to policy.
pub type BucketTypes = HashMap<String, LeakyBucketSpec>;

impl LeakyBucketSpec {
    pub fn new(capacity: u64, drain_interval_ms: u64, drain_count: u64) -> Self {
        Self {
            capacity,
            drain_interval: Duration::from_millis(drain_interval_ms),
            drain_count,
        }
    }

    /// Capacity as a store counter value.
    pub fn capacity_counter(&self) -> Result<i64> {
        to_counter("capacity", self.capacity)
    }

    /// Drain count as a store counter value.
    pub fn drain_count_counter(&self) -> Result<i64> {
        to_counter("drain count", self.drain_count)
    }

    /// Expiry of the per-bucket drain lock.
    pub fn lock_ttl(&self) -> Duration {
        self.drain_interval.saturating_sub(DRAIN_LOCK_SKEW)
    }

    /// Validate spec parameters
    pub fn validate(&self, bucket_type: &str) -> Result<()> {
        if bucket_type.is_empty() {
            return Err(Error::invalid_spec(bucket_type, "bucket type name cannot be empty"));
        }
        if bucket_type.contains(':') {
            return Err(Error::invalid_spec(
                bucket_type,
                "bucket type name cannot contain ':'",
            ));
        }
        if bucket_type == keys::OVERLOADED_BUCKETS {
            return Err(Error::invalid_spec(
                bucket_type,
                format!("'{}' is a reserved key", keys::OVERLOADED_BUCKETS),
            ));
        }
        if self.capacity == 0 {
            return Err(Error::invalid_spec(bucket_type, "capacity must be greater than 0"));
        }
        if self.drain_count == 0 {
            return Err(Error::invalid_spec(bucket_type, "drain count must be greater than 0"));
        }
        if self.capacity > MAX_COUNTER {
            return Err(Error::invalid_spec(
                bucket_type,
                format!("capacity cannot exceed {}", MAX_COUNTER),
            ));
        }
        if self.drain_count > MAX_COUNTER {
            return Err(Error::invalid_spec(
                bucket_type,
                format!("drain count cannot exceed {}", MAX_COUNTER),
            ));
        }
        if self.drain_interval <= DRAIN_LOCK_SKEW {
            return Err(Error::invalid_spec(
                bucket_type,
                format!(
                    "drain interval must be greater than {}ms",
                    DRAIN_LOCK_SKEW.as_millis()
                ),
            ));
        }

        if self.drain_count > self.capacity {
            tracing::warn!(
                target: "job_throttler::config",
                bucket_type = %bucket_type,
                capacity = self.capacity,
                drain_count = self.drain_count,
                "drain count exceeds capacity; buckets will empty on every drain"
            );
        }

        Ok(())
    }
}

fn to_counter(field: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| Error::Configuration(format!("{} {} exceeds {}", field, value, MAX_COUNTER)))
}

/// Validate every configured bucket type.
pub fn validate_bucket_types(bucket_types: &BucketTypes) -> Result<()> {
    for (bucket_type, spec) in bucket_types {
        spec.validate(bucket_type)?;
    }
    Ok(())
}

/// Parse and validate a JSON mapping of bucket type to spec, e.g.
/// `{"email": {"capacity": 6, "drain_interval": "1500ms", "drain_count": 3}}`.
pub fn bucket_types_from_json(json: &str) -> Result<BucketTypes> {
    let bucket_types: BucketTypes = serde_json::from_str(json)?;
    validate_bucket_types(&bucket_types)?;
    Ok(bucket_types)
}
