// docvault-core/src/ports/cache.rs
// C5 Cache Layer: read-through for single-document reads and paginated
// list/search results. Keys embed tenant id as an explicit component (never
// trailing data) so a pattern-delete by tenant is exact.
// Serialization failures on a hit are logged and treated as a miss by
// callers, never surfaced as an error.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::error::CoreResult;

/// A cache key is always `(tenant_id, namespace, discriminator)`; tenant_id
/// is never folded into a composite string so wildcard invalidation by
/// tenant stays exact rather than relying on string-prefix luck.
#[derive(Debug, Clone)]
pub struct CacheKey {
    pub tenant_id: Uuid,
    pub namespace: &'static str,
    pub discriminator: String,
}

impl CacheKey {
    pub fn document(tenant_id: Uuid, document_id: Uuid) -> Self {
        Self {
            tenant_id,
            namespace: "doc",
            discriminator: document_id.to_string(),
        }
    }

    pub fn search(tenant_id: Uuid, query_fingerprint: String) -> Self {
        Self {
            tenant_id,
            namespace: "search",
            discriminator: query_fingerprint,
        }
    }

    pub fn folder_list(tenant_id: Uuid, folder_id: Uuid) -> Self {
        Self {
            tenant_id,
            namespace: "folder-list",
            discriminator: folder_id.to_string(),
        }
    }

    pub fn render(&self) -> String {
        format!("t:{}:{}:{}", self.tenant_id, self.namespace, self.discriminator)
    }

    pub fn tenant_pattern(tenant_id: Uuid, namespace: &str) -> String {
        format!("t:{tenant_id}:{namespace}:*")
    }
}

#[async_trait]
pub trait CachePort: Send + Sync {
    async fn get(&self, key: &CacheKey) -> CoreResult<Option<Vec<u8>>>;

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CoreResult<()>;

    async fn delete(&self, key: &CacheKey) -> CoreResult<()>;

    /// Deletes every key matching `t:{tenant_id}:{namespace}:*`.
    async fn delete_pattern(&self, tenant_id: Uuid, namespace: &str) -> CoreResult<()>;
}
