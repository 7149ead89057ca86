use super::CounterStore;
use crate::error::{Error, Result};
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use std::time::Duration;

/// [`CounterStore`] backed by Redis.
///
/// Uses a single multiplexed connection; clones of it share the underlying
/// socket, so the store is cheap to share across tasks.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Open a client for `redis_url` and establish the multiplexed connection.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| Error::Store(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| Error::Store(format!("Failed to connect to Redis: {}", e)))?;

        tracing::debug!(target: "job_throttler::store", "connected to redis");

        Ok(Self { connection })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn track_and_increment(
        &self,
        set_key: &str,
        member: &str,
        counter_key: &str,
    ) -> Result<i64> {
        let mut conn = self.conn();
        let (count,): (i64,) = ::redis::pipe()
            .atomic()
            .sadd(set_key, member)
            .ignore()
            .incr(counter_key, 1)
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.sadd::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.srem::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn();
        // SET NX PX sets the value and its expiry together
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<_, Option<String>>(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn decrement_by(&self, key: &str, amount: i64) -> Result<i64> {
        let mut conn = self.conn();
        let value: i64 = conn.decr(key, amount).await?;
        Ok(value)
    }

    async fn delete_and_untrack(
        &self,
        counter_key: &str,
        set_key: &str,
        member: &str,
    ) -> Result<()> {
        let mut conn = self.conn();
        ::redis::pipe()
            .atomic()
            .del(counter_key)
            .ignore()
            .srem(set_key, member)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        ::redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Ping failed: {}", e)))?;
        Ok(())
    }
}
