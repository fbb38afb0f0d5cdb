//! Recycling of short tuple buffers.
//!
//! Buffers are bucketed by exact length (1..=`max_bucket_len`). Every bucket
//! has its own lock so concurrent scripts do not contend on a single mutex.

use crate::config::PoolConfig;
use crate::value::Value;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

static TUPLE_POOL: Lazy<TuplePool> = Lazy::new(|| TuplePool::new(PoolConfig::default()));

/// The process-wide pool used by tuples.
pub fn global() -> &'static TuplePool {
    &TUPLE_POOL
}

pub struct TuplePool {
    config: PoolConfig,
    buckets: Vec<Mutex<Vec<Vec<Value>>>>,
}

impl TuplePool {
    pub fn new(config: PoolConfig) -> Self {
        let buckets = (0..config.max_bucket_len)
            .map(|_| Mutex::new(Vec::new()))
            .collect();
        TuplePool { config, buckets }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn bucket(&self, len: usize) -> Option<&Mutex<Vec<Vec<Value>>>> {
        if !self.config.enabled || len == 0 {
            return None;
        }
        self.buckets.get(len - 1)
    }

    /// An empty buffer with capacity for at least `len` values.
    pub fn request(&self, len: usize) -> Vec<Value> {
        if let Some(bucket) = self.bucket(len) {
            if let Some(buf) = bucket.lock().pop() {
                return buf;
            }
        }
        Vec::with_capacity(len)
    }

    /// Return a buffer. Its contents are dropped before the bucket lock is taken.
    pub fn release(&self, mut buf: Vec<Value>) {
        let len = buf.len();
        buf.clear();
        if let Some(bucket) = self.bucket(len) {
            let mut bucket = bucket.lock();
            if bucket.len() < self.config.max_per_bucket {
                bucket.push(buf);
            }
        }
    }

    /// Number of idle buffers held for tuples of length `len`.
    pub fn idle(&self, len: usize) -> usize {
        self.bucket(len).map_or(0, |b| b.lock().len())
    }
}
