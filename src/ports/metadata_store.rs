// docvault-core/src/ports/metadata_store.rs
// C3 Metadata Store Port: transactional persistence of documents, versions,
// folders, tags, permissions, webhooks, deliveries. Every write takes a
// TenantScope and fails if the entity's tenant_id disagrees; every read by
// id takes (id, tenant_id) and returns NotFound (never a different error)
// if the row belongs to another tenant, so existence is never leaked.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::*;
use crate::error::CoreResult;

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub folder_id: Uuid,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub owner_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewVersion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub size: i64,
    pub content_hash: String,
    pub storage_path: String,
    pub created_by: Uuid,
}

/// A transaction handle spanning document + version + metadata + tag
/// inserts for upload, and status + version + metadata updates for scan
/// completion. Concrete stores implement this as a thin
/// wrapper over e.g. `sqlx::Transaction`.
#[async_trait]
pub trait MetadataTransaction: Send {
    async fn insert_document(&mut self, doc: NewDocument) -> CoreResult<()>;

    /// Allocates the next monotonic `version_number` for `document_id` under
    /// a row lock and inserts the version row, returning the allocated
    /// version_number.
    async fn insert_version(&mut self, version: NewVersion) -> CoreResult<i64>;

    async fn set_current_version(&mut self, document_id: Uuid, version_id: Uuid) -> CoreResult<()>;

    async fn upsert_metadata(&mut self, document_id: Uuid, entries: &[(String, String)]) -> CoreResult<()>;

    async fn link_tags(&mut self, document_id: Uuid, tenant_id: Uuid, tag_names: &[String]) -> CoreResult<()>;

    async fn update_document_status(&mut self, document_id: Uuid, status: DocumentStatus) -> CoreResult<()>;

    async fn update_version_status(
        &mut self,
        version_id: Uuid,
        status: DocumentStatus,
        storage_path: Option<&str>,
    ) -> CoreResult<()>;

    async fn insert_event(&mut self, event: Event) -> CoreResult<()>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;

    async fn rollback(self: Box<Self>) -> CoreResult<()>;
}

#[async_trait]
pub trait MetadataStorePort: Send + Sync {
    async fn begin(&self) -> CoreResult<Box<dyn MetadataTransaction>>;

    async fn get_document(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<Document>;

    async fn get_version(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<DocumentVersion>;

    async fn get_current_version(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<DocumentVersion>;

    async fn list_versions(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<Vec<DocumentVersion>>;

    async fn get_metadata(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<Vec<DocumentMetadata>>;

    async fn list_documents_in_folder(
        &self,
        folder_id: Uuid,
        tenant_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> CoreResult<(Vec<Document>, u64)>;

    async fn list_stuck_processing(&self, older_than_secs: i64) -> CoreResult<Vec<(Document, DocumentVersion)>>;

    async fn soft_delete_document(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<()>;

    // Folders
    async fn get_folder(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<Folder>;

    async fn get_root_folder(&self, tenant_id: Uuid) -> CoreResult<Folder>;

    async fn insert_folder(&self, folder: Folder) -> CoreResult<()>;

    /// Rewrites `folder_id`'s own `parent_id` to `new_parent_id` and
    /// rewrites its materialized `path` (and every descendant's) to
    /// `new_path` in the same step, so the adjacency list and the
    /// materialized path never disagree about where the folder lives.
    async fn rewrite_subtree_paths(
        &self,
        folder_id: Uuid,
        tenant_id: Uuid,
        new_parent_id: Uuid,
        new_path: String,
    ) -> CoreResult<()>;

    async fn list_folder_children(&self, folder_id: Uuid, tenant_id: Uuid) -> CoreResult<Vec<Folder>>;

    // Tenants
    async fn get_tenant(&self, id: Uuid) -> CoreResult<Tenant>;

    async fn insert_tenant(&self, tenant: Tenant) -> CoreResult<()>;

    // Webhooks
    async fn insert_webhook(&self, webhook: Webhook) -> CoreResult<()>;

    async fn get_webhook(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<Webhook>;

    async fn list_active_webhooks_for_event(
        &self,
        tenant_id: Uuid,
        event_type: EventType,
    ) -> CoreResult<Vec<Webhook>>;

    async fn update_webhook(&self, webhook: Webhook) -> CoreResult<()>;

    async fn delete_webhook(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<()>;

    // Deliveries
    async fn find_delivery(&self, webhook_id: Uuid, event_id: Uuid) -> CoreResult<Option<WebhookDelivery>>;

    async fn insert_delivery(&self, delivery: WebhookDelivery) -> CoreResult<()>;

    async fn update_delivery(&self, delivery: WebhookDelivery) -> CoreResult<()>;

    // Events / outbox
    async fn insert_event_standalone(&self, event: Event) -> CoreResult<()>;

    async fn list_pending_events(&self, limit: u32) -> CoreResult<Vec<Event>>;

    // Permissions
    async fn list_permissions_for_resource(
        &self,
        tenant_id: Uuid,
        resource_type: ResourceType,
        resource_id: Uuid,
    ) -> CoreResult<Vec<Permission>>;

    async fn insert_permission(&self, permission: Permission) -> CoreResult<()>;
}

/// Looks up a tenant's status for the suspended/inactive checks spec section
/// 3 requires on every write (and, for `inactive`, every read). Tenant
/// provisioning itself has no engine-level operation in this core (it's
/// upstream's job), so a tenant with no row at all is treated as `active`
/// rather than failing every call a never-provisioned tenant makes.
pub async fn resolve_tenant_status(store: &dyn MetadataStorePort, tenant_id: Uuid) -> TenantStatus {
    match store.get_tenant(tenant_id).await {
        Ok(tenant) => tenant.status,
        Err(_) => TenantStatus::Active,
    }
}
