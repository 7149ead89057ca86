#![allow(dead_code)]

use async_trait::async_trait;
use job_throttler::{CounterStore, Error, InMemoryStore, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory store that can be made to fail, globally or for keys
/// containing a given fragment.
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    unavailable: Arc<AtomicBool>,
    poisoned_fragments: Arc<Mutex<HashSet<String>>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_keys_containing(&self, fragment: &str) {
        self.poisoned_fragments
            .lock()
            .unwrap()
            .insert(fragment.to_string());
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Store("connection refused".to_string()));
        }
        let poisoned = self.poisoned_fragments.lock().unwrap();
        if poisoned.iter().any(|fragment| key.contains(fragment.as_str())) {
            return Err(Error::Store(format!("injected failure for {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for FaultyStore {
    async fn track_and_increment(
        &self,
        set_key: &str,
        member: &str,
        counter_key: &str,
    ) -> Result<i64> {
        self.check(counter_key)?;
        self.inner.track_and_increment(set_key, member, counter_key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.check(key)?;
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        self.check(key)?;
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check(key)?;
        self.inner.set_members(key).await
    }

    async fn set_if_absent_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check(key)?;
        self.inner.set_if_absent_with_ttl(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check(key)?;
        self.inner.get(key).await
    }

    async fn decrement_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.check(key)?;
        self.inner.decrement_by(key, amount).await
    }

    async fn delete_and_untrack(
        &self,
        counter_key: &str,
        set_key: &str,
        member: &str,
    ) -> Result<()> {
        self.check(counter_key)?;
        self.inner.delete_and_untrack(counter_key, set_key, member).await
    }

    async fn ping(&self) -> Result<()> {
        self.check("")?;
        self.inner.ping().await
    }
}

/// Store whose set-if-absent always answers `false`, like stores that give
/// no definitive reply to a conditional set.
#[derive(Clone, Default)]
pub struct SilentLockStore {
    pub inner: InMemoryStore,
}

#[async_trait]
impl CounterStore for SilentLockStore {
    async fn track_and_increment(
        &self,
        set_key: &str,
        member: &str,
        counter_key: &str,
    ) -> Result<i64> {
        self.inner.track_and_increment(set_key, member, counter_key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.inner.set_members(key).await
    }

    async fn set_if_absent_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.inner.set_if_absent_with_ttl(key, value, ttl).await?;
        Ok(false)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn decrement_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.inner.decrement_by(key, amount).await
    }

    async fn delete_and_untrack(
        &self,
        counter_key: &str,
        set_key: &str,
        member: &str,
    ) -> Result<()> {
        self.inner.delete_and_untrack(counter_key, set_key, member).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}
