//! Key-space conventions for the shared counter store and job flag parsing.
//!
//! Layout:
//!
//! - `{bucket_type}` is the set of bucket names currently tracked for a type
//! - `{bucket_type}:{bucket_name}:count` is the usage counter of one bucket
//! - `{bucket_type}:{bucket_name}:drain-lock` is the ephemeral drain lock token
//! - `overloaded-buckets` is the global set of `{bucket_type}:{bucket_name}` ids

use std::fmt;

/// Global set of bucket ids currently at or above capacity.
pub const OVERLOADED_BUCKETS: &str = "overloaded-buckets";

pub const COUNT_SUFFIX: &str = "count";

pub const DRAIN_LOCK_SUFFIX: &str = "drain-lock";

/// Key of the set holding every tracked bucket name of `bucket_type`.
pub fn instance_set_key(bucket_type: &str) -> String {
    bucket_type.to_string()
}

pub fn counter_key(bucket_type: &str, bucket_name: &str) -> String {
    format!("{}:{}:{}", bucket_type, bucket_name, COUNT_SUFFIX)
}

pub fn drain_lock_key(bucket_type: &str, bucket_name: &str) -> String {
    format!("{}:{}:{}", bucket_type, bucket_name, DRAIN_LOCK_SUFFIX)
}

/// Identifier stored in the overloaded set, identical to the job flag format.
pub fn bucket_id(bucket_type: &str, bucket_name: &str) -> String {
    format!("{}:{}", bucket_type, bucket_name)
}

/// A job flag that names a bucket, `{bucket_type}:{bucket_name}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketFlag<'a> {
    pub bucket_type: &'a str,
    pub bucket_name: &'a str,
}

impl<'a> BucketFlag<'a> {
    /// Parse a flag. Anything that does not split into exactly two
    /// colon-delimited parts is not a bucket flag.
    pub fn parse(flag: &'a str) -> Option<Self> {
        let mut parts = flag.split(':');
        let bucket_type = parts.next()?;
        let bucket_name = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            bucket_type,
            bucket_name,
        })
    }

    pub fn id(&self) -> String {
        bucket_id(self.bucket_type, self.bucket_name)
    }
}

impl fmt::Display for BucketFlag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bucket_type, self.bucket_name)
    }
}
