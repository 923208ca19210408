// docvault-core/src/engine/rate_limiter.rs
// C12 Rate Limiter: leaky-token-bucket per (tenant, endpoint class), plus a
// global per-client-ip class (spec section 4.10). The bucket arithmetic
// lives in the default in-memory `InMemoryRateLimitStore`; a distributed
// deployment swaps in a Redis-backed `RateLimitStorePort` without touching
// this engine wrapper (open question (a): everything here is per-minute
// until an operator configures otherwise).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::RateLimiterConfig;
use crate::error::{CoreError, CoreResult};
use crate::ports::rate_limit_store::RateLimitStorePort;
use crate::telemetry::request_span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Global,
    Upload,
    Search,
    Tenant,
}

impl KeyClass {
    fn label(&self) -> &'static str {
        match self {
            KeyClass::Global => "global",
            KeyClass::Upload => "upload",
            KeyClass::Search => "search",
            KeyClass::Tenant => "tenant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub limit: u32,
    pub remaining: u32,
    pub reset_in_secs: u64,
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStorePort>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStorePort>, config: RateLimiterConfig) -> Self {
        Self { store, config }
    }

    fn rate_for(&self, class: KeyClass) -> u32 {
        match class {
            KeyClass::Global => self.config.global_per_minute,
            KeyClass::Upload => self.config.upload_per_minute,
            KeyClass::Search => self.config.search_per_minute,
            KeyClass::Tenant => self.config.tenant_per_minute,
        }
    }

    fn key_for(class: KeyClass, client_ip: &str, tenant_id: Option<Uuid>) -> String {
        match (class, tenant_id) {
            (KeyClass::Tenant, Some(tenant_id)) => format!("{}:{tenant_id}", class.label()),
            (_, Some(tenant_id)) => format!("{}:{client_ip}:{tenant_id}", class.label()),
            (_, None) => format!("{}:{client_ip}", class.label()),
        }
    }

    /// Consumes one token from `class`'s bucket for the given caller.
    /// Returns `RateLimitExceeded` (carrying the headers the response
    /// surface is expected to add, spec section 4.10) when the bucket is dry.
    pub async fn check(
        &self,
        class: KeyClass,
        client_ip: &str,
        tenant_id: Option<Uuid>,
        cancel: CancellationToken,
    ) -> CoreResult<RateLimitDecision> {
        let span = request_span(tenant_id.unwrap_or(Uuid::nil()), Uuid::nil(), "rate_limiter_check");
        async move {
            let rate = self.rate_for(class);
            let key = Self::key_for(class, client_ip, tenant_id);
            let (allowed, remaining, reset_in_secs) = tokio::select! {
                res = self.store.try_consume(&key, rate, rate) => res?,
                _ = cancel.cancelled() => return Err(CoreError::conflict("rate limit check cancelled")),
            };
            if !allowed {
                return Err(CoreError::RateLimitExceeded {
                    key,
                    retry_after_secs: reset_in_secs,
                });
            }
            Ok(RateLimitDecision {
                limit: rate,
                remaining,
                reset_in_secs,
            })
        }
        .instrument(span)
        .await
    }
}

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, rate_per_minute: u32) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_per_sec: rate_per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn consume(&mut self) -> (bool, u32, u64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            let reset_in_secs = if self.tokens >= 1.0 {
                0
            } else {
                ((1.0 - self.tokens) / self.refill_per_sec).ceil() as u64
            };
            (true, self.tokens.floor() as u32, reset_in_secs)
        } else {
            let reset_in_secs = ((1.0 - self.tokens) / self.refill_per_sec).ceil() as u64;
            (false, 0, reset_in_secs.max(1))
        }
    }
}

/// Single-process default backend. Buckets are created lazily per key and
/// live for the process lifetime; a distributed deployment behind multiple
/// instances needs the Redis-backed port instead so limits are shared.
pub struct InMemoryRateLimitStore {
    buckets: DashMap<String, Mutex<Bucket>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self { buckets: DashMap::new() }
    }
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStorePort for InMemoryRateLimitStore {
    async fn try_consume(&self, key: &str, rate_per_minute: u32, burst: u32) -> CoreResult<(bool, u32, u64)> {
        let entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(Bucket::new(burst, rate_per_minute)));
        Ok(entry.lock().consume())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exhausts_then_recovers_over_time() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let limiter = RateLimiter::new(
            store,
            RateLimiterConfig {
                global_per_minute: 60,
                upload_per_minute: 2,
                search_per_minute: 50,
                tenant_per_minute: 100,
            },
        );
        let tenant = Uuid::new_v4();
        assert!(limiter.check(KeyClass::Upload, "1.2.3.4", Some(tenant), CancellationToken::new()).await.is_ok());
        assert!(limiter.check(KeyClass::Upload, "1.2.3.4", Some(tenant), CancellationToken::new()).await.is_ok());
        let err = limiter.check(KeyClass::Upload, "1.2.3.4", Some(tenant), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn distinct_tenants_have_independent_buckets() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let limiter = RateLimiter::new(store, RateLimiterConfig {
            global_per_minute: 60,
            upload_per_minute: 1,
            search_per_minute: 50,
            tenant_per_minute: 100,
        });
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        assert!(limiter.check(KeyClass::Upload, "1.2.3.4", Some(t1), CancellationToken::new()).await.is_ok());
        assert!(limiter.check(KeyClass::Upload, "1.2.3.4", Some(t2), CancellationToken::new()).await.is_ok());
    }
}
