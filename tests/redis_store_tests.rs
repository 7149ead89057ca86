//! Tests against a live Redis. They are skipped unless `REDIS_URL` is set,
//! e.g. `REDIS_URL=redis://127.0.0.1:6379 cargo test --test redis_store_tests`.
//!
//! Every test works under a unique bucket type so they can share one server.

use job_throttler::keys;
use job_throttler::{
    BucketDrainer, BucketTypes, CounterStore, LeakyBucketRateLimiter, LeakyBucketSpec, RedisStore,
    UsageRecorder,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

async fn redis_store() -> Option<RedisStore> {
    let url = std::env::var("REDIS_URL").ok()?;
    Some(RedisStore::connect(&url).await.expect("failed to connect to REDIS_URL"))
}

fn unique_type(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

async fn counter(store: &RedisStore, bucket_type: &str, bucket_name: &str) -> Option<i64> {
    store
        .get(&keys::counter_key(bucket_type, bucket_name))
        .await
        .unwrap()
        .map(|value| value.parse().unwrap())
}

#[tokio::test]
async fn test_redis_ping() {
    let Some(store) = redis_store().await else { return };
    store.ping().await.unwrap();
}

#[tokio::test]
async fn test_redis_concurrent_uses_are_all_counted() {
    let Some(store) = redis_store().await else { return };
    let bucket_type = unique_type("concurrent");
    let spec = LeakyBucketSpec::new(100, 5000, 1);
    let recorder = UsageRecorder::new(Arc::new(store.clone()));

    futures::future::try_join_all(
        (0..50).map(|_| recorder.record_use(&bucket_type, "instance-one", &spec)),
    )
    .await
    .unwrap();

    assert_eq!(counter(&store, &bucket_type, "instance-one").await, Some(50));
}

#[tokio::test]
async fn test_redis_no_double_drain_on_simultaneous_fire() {
    let Some(store) = redis_store().await else { return };
    let bucket_type = unique_type("double-drain-test");
    let spec = LeakyBucketSpec::new(100, 5000, 1);
    let recorder = UsageRecorder::new(Arc::new(store.clone()));
    for _ in 0..10 {
        recorder.record_use(&bucket_type, "instance-one", &spec).await.unwrap();
    }
    assert_eq!(counter(&store, &bucket_type, "instance-one").await, Some(10));

    let drainer = BucketDrainer::new(Arc::new(store.clone()), bucket_type.clone(), spec);
    let (a, b) = tokio::join!(drainer.drain_once(), drainer.drain_once());
    a.unwrap();
    b.unwrap();

    assert_eq!(counter(&store, &bucket_type, "instance-one").await, Some(9));
}

#[tokio::test]
async fn test_redis_drain_lock_released_after_interval() {
    let Some(store) = redis_store().await else { return };
    let bucket_type = unique_type("after-interval-drain-test");
    let spec = LeakyBucketSpec::new(100, 2000, 1);
    let recorder = UsageRecorder::new(Arc::new(store.clone()));
    for _ in 0..10 {
        recorder.record_use(&bucket_type, "instance-one", &spec).await.unwrap();
    }

    let drainer = BucketDrainer::new(Arc::new(store.clone()), bucket_type.clone(), spec);
    drainer.drain_once().await.unwrap();
    sleep(Duration::from_millis(2000)).await;
    drainer.drain_once().await.unwrap();

    assert_eq!(counter(&store, &bucket_type, "instance-one").await, Some(8));
}

#[tokio::test]
async fn test_redis_drain_past_zero_removes_state() {
    let Some(store) = redis_store().await else { return };
    let bucket_type = unique_type("cleanup");
    let spec = LeakyBucketSpec::new(1, 1000, 2);
    UsageRecorder::new(Arc::new(store.clone()))
        .record_use(&bucket_type, "one", &spec)
        .await
        .unwrap();

    let drainer = BucketDrainer::new(Arc::new(store.clone()), bucket_type.clone(), spec);
    let report = drainer.drain_once().await.unwrap();

    assert_eq!(report.emptied, 1);
    assert_eq!(counter(&store, &bucket_type, "one").await, None);
    assert!(store.set_members(&bucket_type).await.unwrap().is_empty());
    let overloaded = store.set_members(keys::OVERLOADED_BUCKETS).await.unwrap();
    assert!(!overloaded.contains(&keys::bucket_id(&bucket_type, "one")));
}

#[tokio::test]
async fn test_redis_forbidden_buckets_drain_on_schedule() {
    let Some(store) = redis_store().await else { return };
    let bucket_type = unique_type("integration");
    let spec = LeakyBucketSpec::new(1, 1000, 1);
    let mut bucket_types = BucketTypes::new();
    bucket_types.insert(bucket_type.clone(), spec.clone());
    let limiter = LeakyBucketRateLimiter::new(Arc::new(store.clone()), bucket_types).unwrap();

    let recorder = UsageRecorder::new(Arc::new(store.clone()));
    let names = ["one", "two", "three"];
    for name in names {
        recorder.record_use(&bucket_type, name, &spec).await.unwrap();
    }

    let forbidden = limiter.forbidden_flags().await.unwrap();
    assert!(names
        .iter()
        .all(|name| forbidden.contains(&keys::bucket_id(&bucket_type, name))));

    sleep(Duration::from_millis(1100)).await;

    let forbidden = limiter.forbidden_flags().await.unwrap();
    assert!(names
        .iter()
        .all(|name| !forbidden.contains(&keys::bucket_id(&bucket_type, name))));

    limiter.shutdown().await.unwrap();
}
