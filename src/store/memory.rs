use super::CounterStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Single-process [`CounterStore`].
///
/// Mirrors the Redis semantics the throttler relies on. Empty sets disappear
/// and expiring values are measured on the tokio clock. Counters, plain values
/// and sets live in separate maps, so one key name can hold one of each.
/// `get` reads a counter before a plain value of the same name.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    counters: HashMap<String, i64>,
    values: HashMap<String, Expiring>,
    sets: HashMap<String, BTreeSet<String>>,
}

struct Expiring {
    value: String,
    expires_at: Instant,
}

impl State {
    fn live_value(&mut self, key: &str) -> Option<&str> {
        let expired = self
            .values
            .get(key)
            .map(|entry| entry.expires_at <= Instant::now())?;

        if expired {
            self.values.remove(key);
            return None;
        }

        self.values.get(key).map(|entry| entry.value.as_str())
    }

    fn set_remove(&mut self, key: &str, member: &str) {
        if let Some(set) = self.sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                self.sets.remove(key);
            }
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("Failed to acquire store lock".into()))
    }

    /// Current value of a counter, if it exists.
    pub fn counter(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.lock()?.counters.get(key).copied())
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn track_and_increment(
        &self,
        set_key: &str,
        member: &str,
        counter_key: &str,
    ) -> Result<i64> {
        let mut state = self.lock()?;
        state
            .sets
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());

        let counter = state.counters.entry(counter_key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.lock()?
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        self.lock()?.set_remove(key, member);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut state = self.lock()?;
        if state.live_value(key).is_some() {
            return Ok(false);
        }

        state.values.insert(
            key.to_string(),
            Expiring {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.lock()?;
        if let Some(count) = state.counters.get(key) {
            return Ok(Some(count.to_string()));
        }
        Ok(state.live_value(key).map(str::to_string))
    }

    async fn decrement_by(&self, key: &str, amount: i64) -> Result<i64> {
        let mut state = self.lock()?;
        let counter = state.counters.entry(key.to_string()).or_insert(0);
        *counter -= amount;
        Ok(*counter)
    }

    async fn delete_and_untrack(
        &self,
        counter_key: &str,
        set_key: &str,
        member: &str,
    ) -> Result<()> {
        let mut state = self.lock()?;
        state.counters.remove(counter_key);
        state.set_remove(set_key, member);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}
