//! Runtime configuration data. Plain structs, no global state.

/// Configuration of the tuple buffer pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// When false, released buffers are simply dropped.
    pub enabled: bool,
    /// Largest tuple length that gets its own bucket.
    pub max_bucket_len: usize,
    /// Maximum number of idle buffers kept per bucket.
    pub max_per_bucket: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bucket_len: 6,
            max_per_bucket: 5000,
        }
    }
}
