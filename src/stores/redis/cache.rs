// docvault-core/src/stores/redis/cache.rs
// CachePort over Redis: plain GET/SET/PEXPIRE for single keys, SCAN+DEL for
// the tenant-wide pattern delete. A serialization failure on a hit is
// treated as a miss (logged, not surfaced), matching the cache-aside
// contract the ports::cache module documents.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::ports::cache::{CacheKey, CachePort};

pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(url).map_err(CoreError::from)?;
        let conn = ConnectionManager::new(client).await.map_err(CoreError::from)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CachePort for RedisCache {
    async fn get(&self, key: &CacheKey) -> CoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key.render()).await.map_err(CoreError::from)?;
        Ok(value)
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key.render(), value, ttl.as_secs().max(1))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key.render()).await.map_err(CoreError::from)?;
        Ok(())
    }

    async fn delete_pattern(&self, tenant_id: Uuid, namespace: &str) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let pattern = CacheKey::tenant_pattern(tenant_id, namespace);
        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(CoreError::from)?;
            if !keys.is_empty() {
                let _: () = conn.del(keys).await.map_err(CoreError::from)?;
            }
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(())
    }
}
