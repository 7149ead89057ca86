//! Shared counter store abstraction.
//!
//! The throttler keeps no durable state in-process; every counter, set and
//! lock lives behind [`CounterStore`]. Any number of processes may share one
//! store, so each operation here must be atomic on the store side.

mod memory;
mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Atomic primitives the throttler needs from a shared key-value store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Add `member` to the set at `set_key` and increment `counter_key` by one,
    /// as one atomic batch. Returns the counter after the increment.
    async fn track_and_increment(
        &self,
        set_key: &str,
        member: &str,
        counter_key: &str,
    ) -> Result<i64>;

    /// Add `member` to a set. Adding an existing member is not an error.
    async fn set_add(&self, key: &str, member: &str) -> Result<()>;

    /// Remove `member` from a set. Removing a missing member is not an error.
    async fn set_remove(&self, key: &str, member: &str) -> Result<()>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Set `key` to `value` with an expiry, only if `key` does not exist.
    ///
    /// The return value is advisory; callers that need certainty read the key
    /// back with [`CounterStore::get`].
    async fn set_if_absent_with_ttl(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Decrement a counter, allowing it to go negative. Returns the new value.
    async fn decrement_by(&self, key: &str, amount: i64) -> Result<i64>;

    /// Delete `counter_key` and remove `member` from `set_key` in one atomic batch.
    async fn delete_and_untrack(&self, counter_key: &str, set_key: &str, member: &str)
        -> Result<()>;

    async fn ping(&self) -> Result<()>;
}
