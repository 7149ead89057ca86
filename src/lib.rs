pub mod bucket_spec;
pub mod config;
pub mod drainer;
pub mod error;
pub mod job;
pub mod keys;
pub mod rate_limiter;
pub mod recorder;
pub mod store;

pub use bucket_spec::{BucketTypes, LeakyBucketSpec};
pub use config::Config;
pub use drainer::{BucketDrainer, DrainOutcome, DrainReport};
pub use error::{Error, Result};
pub use job::{task_fn, Job, TaskHandler};
pub use rate_limiter::{LeakyBucketRateLimiter, WrappedTask};
pub use recorder::UsageRecorder;
pub use store::{CounterStore, InMemoryStore, RedisStore};
