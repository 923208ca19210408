// docvault-core/src/ports/rate_limit_store.rs
// Pluggable counter backend for C12 Rate Limiter: an in-memory dashmap
// implementation is the default (single-process), with this trait as the
// seam for a distributed (Redis) backend in a multi-instance deployment.

use async_trait::async_trait;

use crate::error::CoreResult;

#[async_trait]
pub trait RateLimitStorePort: Send + Sync {
    /// Consumes one token from the bucket identified by `key`, replenishing
    /// at `rate_per_minute` on a leaky schedule. Returns
    /// `(allowed, remaining, reset_in_secs)`.
    async fn try_consume(&self, key: &str, rate_per_minute: u32, burst: u32) -> CoreResult<(bool, u32, u64)>;
}
