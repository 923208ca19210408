// docvault-core/src/ports/object_store.rs
// C2 Object Store Port: three logical buckets per tenant (temporary,
// permanent, quarantine). Keys embed tenant_id as the first path segment;
// implementations must reject a Get whose key does not start with the
// scope's tenant prefix, before any backend call.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::CoreResult;

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath(pub String);

impl ObjectPath {
    pub fn tenant_prefix(&self) -> Option<&str> {
        self.0.split('/').nth(1)
    }

    /// Canonical temporary-bucket key layout:
    /// `{temp}/{tenant_id}/{doc_id}/{upload_id}`.
    pub fn temp_key(tenant_id: Uuid, doc_id: Uuid, upload_id: Uuid) -> Self {
        Self(format!("temp/{tenant_id}/{doc_id}/{upload_id}"))
    }

    /// `{bucket}/{tenant_id}/{doc_id}/{version_id}` for the permanent bucket.
    pub fn permanent_key(tenant_id: Uuid, doc_id: Uuid, version_id: Uuid) -> Self {
        Self(format!("permanent/{tenant_id}/{doc_id}/{version_id}"))
    }

    /// Same layout, quarantine bucket.
    pub fn quarantine_key(tenant_id: Uuid, doc_id: Uuid, version_id: Uuid) -> Self {
        Self(format!("quarantine/{tenant_id}/{doc_id}/{version_id}"))
    }
}

impl std::fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait]
pub trait ObjectStorePort: Send + Sync {
    /// Atomic PUT of a byte stream into the temporary bucket. Returns the
    /// opaque key; callers must not interpret its structure beyond the
    /// tenant-prefix contract.
    async fn put_temporary(
        &self,
        tenant_id: Uuid,
        doc_id: Uuid,
        upload_id: Uuid,
        stream: ByteStream,
        content_type: &str,
    ) -> CoreResult<ObjectPath>;

    /// Server-side copy+delete into the permanent bucket. Idempotent: a
    /// second call with the same args succeeds if the destination already
    /// exists with a matching content hash.
    async fn move_to_permanent(
        &self,
        temp_path: &ObjectPath,
        tenant_id: Uuid,
        folder_id: Uuid,
        doc_id: Uuid,
        version_id: Uuid,
        expected_hash: &str,
    ) -> CoreResult<ObjectPath>;

    /// Server-side copy+delete into the quarantine bucket. Idempotent on the
    /// same terms as `move_to_permanent`.
    async fn move_to_quarantine(
        &self,
        path: &ObjectPath,
        tenant_id: Uuid,
        doc_id: Uuid,
        version_id: Uuid,
        expected_hash: &str,
    ) -> CoreResult<ObjectPath>;

    async fn get(&self, tenant_id: Uuid, path: &ObjectPath) -> CoreResult<ByteStream>;

    async fn delete(&self, tenant_id: Uuid, path: &ObjectPath) -> CoreResult<()>;

    /// True if the object store already holds a matching object at `path`
    /// with content hash `expected_hash`; used by idempotent moves and the
    /// reconciliation sweep.
    async fn exists_with_hash(&self, tenant_id: Uuid, path: &ObjectPath, expected_hash: &str) -> CoreResult<bool>;
}
