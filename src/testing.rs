// docvault-core/src/testing.rs
// In-memory fakes of every port, compiled only under `test-util`/`test` so
// unit and integration tests can drive the full engine without a real
// Postgres/Redis/Elasticsearch/scanner behind it. Mirrors the shape of the
// `stores::*` backends (same traits, same tenant-prefix/hash rules) but
// backed by plain `HashMap`s instead of a network client.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::*;
use crate::error::{CoreError, CoreResult};
use crate::ports::cache::{CacheKey, CachePort};
use crate::ports::metadata_store::{MetadataStorePort, MetadataTransaction, NewDocument, NewVersion};
use crate::ports::object_store::{ByteStream, ObjectPath, ObjectStorePort};
use crate::ports::scan_queue::{ScanQueuePort, ScanTask};
use crate::ports::search_index::{IndexDocument, SearchIndexPort, SearchHit, SearchQuery, SearchResults, SortField, SortOrder};
use crate::ports::virus_scanner::{ScanOutcome, VirusScannerPort};

fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn drain(mut stream: ByteStream) -> std::io::Result<Bytes> {
    use futures::StreamExt;
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buf))
}

fn to_stream(bytes: Bytes) -> ByteStream {
    Box::pin(stream::once(async move { Ok(bytes) }))
}

// ---------------------------------------------------------------------
// Object store fake
// ---------------------------------------------------------------------

#[derive(Clone)]
struct StoredObject {
    bytes: Bytes,
    content_hash: String,
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_tenant_prefix(tenant_id: Uuid, path: &ObjectPath) -> CoreResult<()> {
        match path.tenant_prefix() {
            Some(prefix) if prefix == tenant_id.to_string() => Ok(()),
            _ => Err(CoreError::forbidden("object key does not belong to the requesting tenant")),
        }
    }
}

#[async_trait]
impl ObjectStorePort for InMemoryObjectStore {
    async fn put_temporary(
        &self,
        tenant_id: Uuid,
        doc_id: Uuid,
        upload_id: Uuid,
        stream: ByteStream,
        _content_type: &str,
    ) -> CoreResult<ObjectPath> {
        let bytes = drain(stream).await.map_err(|e| CoreError::dependency("object_store", e))?;
        let content_hash = hash_bytes(&bytes);
        let path = ObjectPath::temp_key(tenant_id, doc_id, upload_id);
        self.objects.lock().insert(path.0.clone(), StoredObject { bytes, content_hash });
        Ok(path)
    }

    async fn move_to_permanent(
        &self,
        temp_path: &ObjectPath,
        tenant_id: Uuid,
        _folder_id: Uuid,
        doc_id: Uuid,
        version_id: Uuid,
        expected_hash: &str,
    ) -> CoreResult<ObjectPath> {
        Self::check_tenant_prefix(tenant_id, temp_path)?;
        let dest = ObjectPath::permanent_key(tenant_id, doc_id, version_id);
        let mut objects = self.objects.lock();
        if let Some(existing) = objects.get(&dest.0) {
            if existing.content_hash == expected_hash {
                return Ok(dest);
            }
        }
        let object = objects
            .remove(&temp_path.0)
            .ok_or_else(|| CoreError::conflict("source object no longer exists"))?;
        objects.insert(dest.0.clone(), object);
        Ok(dest)
    }

    async fn move_to_quarantine(
        &self,
        path: &ObjectPath,
        tenant_id: Uuid,
        doc_id: Uuid,
        version_id: Uuid,
        expected_hash: &str,
    ) -> CoreResult<ObjectPath> {
        Self::check_tenant_prefix(tenant_id, path)?;
        let dest = ObjectPath::quarantine_key(tenant_id, doc_id, version_id);
        let mut objects = self.objects.lock();
        if let Some(existing) = objects.get(&dest.0) {
            if existing.content_hash == expected_hash {
                return Ok(dest);
            }
        }
        let object = objects
            .remove(&path.0)
            .ok_or_else(|| CoreError::conflict("source object no longer exists"))?;
        objects.insert(dest.0.clone(), object);
        Ok(dest)
    }

    async fn get(&self, tenant_id: Uuid, path: &ObjectPath) -> CoreResult<ByteStream> {
        Self::check_tenant_prefix(tenant_id, path)?;
        let object = self
            .objects
            .lock()
            .get(&path.0)
            .cloned()
            .ok_or(CoreError::NotFound)?;
        Ok(to_stream(object.bytes))
    }

    async fn delete(&self, tenant_id: Uuid, path: &ObjectPath) -> CoreResult<()> {
        Self::check_tenant_prefix(tenant_id, path)?;
        self.objects.lock().remove(&path.0);
        Ok(())
    }

    async fn exists_with_hash(&self, tenant_id: Uuid, path: &ObjectPath, expected_hash: &str) -> CoreResult<bool> {
        Self::check_tenant_prefix(tenant_id, path)?;
        Ok(self
            .objects
            .lock()
            .get(&path.0)
            .is_some_and(|o| o.content_hash == expected_hash))
    }
}

// ---------------------------------------------------------------------
// Metadata store fake
// ---------------------------------------------------------------------

#[derive(Default, Clone)]
struct StoreData {
    documents: HashMap<Uuid, Document>,
    versions: HashMap<Uuid, DocumentVersion>,
    metadata: HashMap<Uuid, Vec<DocumentMetadata>>,
    folders: HashMap<Uuid, Folder>,
    tags: HashMap<(Uuid, String), Uuid>,
    webhooks: HashMap<Uuid, Webhook>,
    deliveries: HashMap<(Uuid, Uuid), WebhookDelivery>,
    all_events: Vec<Event>,
    pending_events: VecDeque<Uuid>,
    permissions: Vec<Permission>,
    next_version_number: HashMap<Uuid, i64>,
    tenants: HashMap<Uuid, Tenant>,
}

pub struct InMemoryMetadataStore {
    data: Arc<Mutex<StoreData>>,
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(StoreData::default())),
        }
    }

    /// Test helper: backdates a document's `updated_at`/its version's
    /// `created_at` so `list_stuck_processing` will find it; exercises the
    /// reconciliation sweep without a real clock dependency.
    pub fn backdate(&self, document_id: Uuid, age: chrono::Duration) {
        let mut data = self.data.lock();
        let backdated = Utc::now() - age;
        if let Some(doc) = data.documents.get_mut(&document_id) {
            doc.created_at = backdated;
            doc.updated_at = backdated;
        }
    }
}

pub struct InMemoryTransaction {
    shared: Arc<Mutex<StoreData>>,
    local: StoreData,
}

#[async_trait]
impl MetadataTransaction for InMemoryTransaction {
    async fn insert_document(&mut self, doc: NewDocument) -> CoreResult<()> {
        let now = Utc::now();
        self.local.documents.insert(
            doc.id,
            Document {
                id: doc.id,
                tenant_id: doc.tenant_id,
                folder_id: doc.folder_id,
                name: doc.name,
                content_type: doc.content_type,
                size: doc.size,
                owner_id: doc.owner_id,
                status: DocumentStatus::Processing,
                current_version_id: Uuid::nil(),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        );
        self.local.next_version_number.insert(doc.id, 1);
        Ok(())
    }

    async fn insert_version(&mut self, version: NewVersion) -> CoreResult<i64> {
        let number_slot = self.local.next_version_number.entry(version.document_id).or_insert(1);
        let version_number = *number_slot;
        *number_slot += 1;
        self.local.versions.insert(
            version.id,
            DocumentVersion {
                id: version.id,
                document_id: version.document_id,
                version_number,
                size: version.size,
                content_hash: version.content_hash,
                status: DocumentStatus::Processing,
                storage_path: version.storage_path,
                created_at: Utc::now(),
                created_by: version.created_by,
            },
        );
        Ok(version_number)
    }

    async fn set_current_version(&mut self, document_id: Uuid, version_id: Uuid) -> CoreResult<()> {
        let doc = self.local.documents.get_mut(&document_id).ok_or(CoreError::NotFound)?;
        doc.current_version_id = version_id;
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_metadata(&mut self, document_id: Uuid, entries: &[(String, String)]) -> CoreResult<()> {
        let list = self.local.metadata.entry(document_id).or_default();
        for (key, value) in entries {
            if let Some(existing) = list.iter_mut().find(|m| &m.key == key) {
                existing.value = value.clone();
                existing.updated_at = Utc::now();
            } else {
                list.push(DocumentMetadata {
                    id: Uuid::new_v4(),
                    document_id,
                    key: key.clone(),
                    value: value.clone(),
                    updated_at: Utc::now(),
                });
            }
        }
        Ok(())
    }

    async fn link_tags(&mut self, document_id: Uuid, tenant_id: Uuid, tag_names: &[String]) -> CoreResult<()> {
        for name in tag_names {
            self.local.tags.entry((tenant_id, name.clone())).or_insert_with(Uuid::new_v4);
        }
        let _ = document_id;
        Ok(())
    }

    async fn update_document_status(&mut self, document_id: Uuid, status: DocumentStatus) -> CoreResult<()> {
        let doc = self.local.documents.get_mut(&document_id).ok_or(CoreError::NotFound)?;
        doc.status = status;
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn update_version_status(
        &mut self,
        version_id: Uuid,
        status: DocumentStatus,
        storage_path: Option<&str>,
    ) -> CoreResult<()> {
        let version = self.local.versions.get_mut(&version_id).ok_or(CoreError::NotFound)?;
        version.status = status;
        if let Some(path) = storage_path {
            version.storage_path = path.to_string();
        }
        Ok(())
    }

    async fn insert_event(&mut self, event: Event) -> CoreResult<()> {
        self.local.pending_events.push_back(event.id);
        self.local.all_events.push(event);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        *self.shared.lock() = self.local;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> CoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl MetadataStorePort for InMemoryMetadataStore {
    async fn begin(&self) -> CoreResult<Box<dyn MetadataTransaction>> {
        let local = self.data.lock().clone();
        Ok(Box::new(InMemoryTransaction {
            shared: self.data.clone(),
            local,
        }))
    }

    async fn get_document(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<Document> {
        let data = self.data.lock();
        data.documents
            .get(&id)
            .filter(|d| d.tenant_id == tenant_id)
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    async fn get_version(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<DocumentVersion> {
        let data = self.data.lock();
        let version = data.versions.get(&id).cloned().ok_or(CoreError::NotFound)?;
        let doc = data.documents.get(&version.document_id).ok_or(CoreError::NotFound)?;
        if doc.tenant_id != tenant_id {
            return Err(CoreError::NotFound);
        }
        Ok(version)
    }

    async fn get_current_version(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<DocumentVersion> {
        let data = self.data.lock();
        let doc = data
            .documents
            .get(&document_id)
            .filter(|d| d.tenant_id == tenant_id)
            .ok_or(CoreError::NotFound)?;
        data.versions.get(&doc.current_version_id).cloned().ok_or(CoreError::NotFound)
    }

    async fn list_versions(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<Vec<DocumentVersion>> {
        let data = self.data.lock();
        if !data.documents.get(&document_id).is_some_and(|d| d.tenant_id == tenant_id) {
            return Err(CoreError::NotFound);
        }
        let mut versions: Vec<_> = data
            .versions
            .values()
            .filter(|v| v.document_id == document_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn get_metadata(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<Vec<DocumentMetadata>> {
        let data = self.data.lock();
        if !data.documents.get(&document_id).is_some_and(|d| d.tenant_id == tenant_id) {
            return Err(CoreError::NotFound);
        }
        Ok(data.metadata.get(&document_id).cloned().unwrap_or_default())
    }

    async fn list_documents_in_folder(
        &self,
        folder_id: Uuid,
        tenant_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> CoreResult<(Vec<Document>, u64)> {
        let data = self.data.lock();
        let mut all: Vec<_> = data
            .documents
            .values()
            .filter(|d| d.folder_id == folder_id && d.tenant_id == tenant_id && d.status != DocumentStatus::Deleted)
            .cloned()
            .collect();
        all.sort_by_key(|d| d.created_at);
        let total = all.len() as u64;
        let start = ((page.saturating_sub(1)) as usize) * page_size as usize;
        let page_docs = all.into_iter().skip(start).take(page_size as usize).collect();
        Ok((page_docs, total))
    }

    async fn list_stuck_processing(&self, older_than_secs: i64) -> CoreResult<Vec<(Document, DocumentVersion)>> {
        let data = self.data.lock();
        let cutoff = Utc::now() - chrono::Duration::seconds(older_than_secs);
        let mut out = Vec::new();
        for doc in data.documents.values() {
            if doc.status == DocumentStatus::Processing && doc.updated_at < cutoff {
                if let Some(version) = data.versions.get(&doc.current_version_id) {
                    out.push((doc.clone(), version.clone()));
                }
            }
        }
        Ok(out)
    }

    async fn soft_delete_document(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<()> {
        let mut data = self.data.lock();
        let doc = data
            .documents
            .get_mut(&document_id)
            .filter(|d| d.tenant_id == tenant_id)
            .ok_or(CoreError::NotFound)?;
        doc.status = DocumentStatus::Deleted;
        doc.deleted_at = Some(Utc::now());
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn get_folder(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<Folder> {
        self.data
            .lock()
            .folders
            .get(&id)
            .filter(|f| f.tenant_id == tenant_id)
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    async fn get_root_folder(&self, tenant_id: Uuid) -> CoreResult<Folder> {
        self.data
            .lock()
            .folders
            .values()
            .find(|f| f.tenant_id == tenant_id && f.parent_id.is_none())
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    async fn insert_folder(&self, folder: Folder) -> CoreResult<()> {
        self.data.lock().folders.insert(folder.id, folder);
        Ok(())
    }

    async fn rewrite_subtree_paths(
        &self,
        folder_id: Uuid,
        tenant_id: Uuid,
        new_parent_id: Uuid,
        new_path: String,
    ) -> CoreResult<()> {
        let mut data = self.data.lock();
        let old_path = data
            .folders
            .get(&folder_id)
            .filter(|f| f.tenant_id == tenant_id)
            .map(|f| f.path.clone())
            .ok_or(CoreError::NotFound)?;

        let descendants: Vec<Uuid> = data
            .folders
            .values()
            .filter(|f| f.tenant_id == tenant_id && f.id != folder_id && f.path.starts_with(&format!("{old_path}/")))
            .map(|f| f.id)
            .collect();

        for id in descendants {
            if let Some(f) = data.folders.get_mut(&id) {
                f.path = format!("{new_path}{}", &f.path[old_path.len()..]);
                f.updated_at = Utc::now();
            }
        }
        // Only the moved folder's own `parent_id` changes; descendants keep
        // pointing at their existing parent inside the subtree.
        if let Some(f) = data.folders.get_mut(&folder_id) {
            f.parent_id = Some(new_parent_id);
            f.path = new_path;
            f.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_folder_children(&self, folder_id: Uuid, tenant_id: Uuid) -> CoreResult<Vec<Folder>> {
        Ok(self
            .data
            .lock()
            .folders
            .values()
            .filter(|f| f.tenant_id == tenant_id && f.parent_id == Some(folder_id))
            .cloned()
            .collect())
    }

    async fn insert_webhook(&self, webhook: Webhook) -> CoreResult<()> {
        self.data.lock().webhooks.insert(webhook.id, webhook);
        Ok(())
    }

    async fn get_webhook(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<Webhook> {
        self.data
            .lock()
            .webhooks
            .get(&id)
            .filter(|w| w.tenant_id == tenant_id)
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    async fn list_active_webhooks_for_event(&self, tenant_id: Uuid, event_type: EventType) -> CoreResult<Vec<Webhook>> {
        Ok(self
            .data
            .lock()
            .webhooks
            .values()
            .filter(|w| w.tenant_id == tenant_id && w.status == WebhookStatus::Active && w.event_types.contains(&event_type))
            .cloned()
            .collect())
    }

    async fn update_webhook(&self, webhook: Webhook) -> CoreResult<()> {
        self.data.lock().webhooks.insert(webhook.id, webhook);
        Ok(())
    }

    async fn delete_webhook(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<()> {
        let mut data = self.data.lock();
        if data.webhooks.get(&id).is_some_and(|w| w.tenant_id == tenant_id) {
            data.webhooks.remove(&id);
        }
        Ok(())
    }

    async fn find_delivery(&self, webhook_id: Uuid, event_id: Uuid) -> CoreResult<Option<WebhookDelivery>> {
        Ok(self.data.lock().deliveries.get(&(webhook_id, event_id)).cloned())
    }

    async fn insert_delivery(&self, delivery: WebhookDelivery) -> CoreResult<()> {
        self.data
            .lock()
            .deliveries
            .insert((delivery.webhook_id, delivery.event_id), delivery);
        Ok(())
    }

    async fn update_delivery(&self, delivery: WebhookDelivery) -> CoreResult<()> {
        self.data
            .lock()
            .deliveries
            .insert((delivery.webhook_id, delivery.event_id), delivery);
        Ok(())
    }

    async fn insert_event_standalone(&self, event: Event) -> CoreResult<()> {
        let mut data = self.data.lock();
        data.pending_events.push_back(event.id);
        data.all_events.push(event);
        Ok(())
    }

    async fn list_pending_events(&self, limit: u32) -> CoreResult<Vec<Event>> {
        let mut data = self.data.lock();
        let mut out = Vec::new();
        for _ in 0..limit {
            let Some(id) = data.pending_events.pop_front() else { break };
            if let Some(event) = data.all_events.iter().find(|e| e.id == id).cloned() {
                out.push(event);
            }
        }
        Ok(out)
    }

    async fn list_permissions_for_resource(
        &self,
        tenant_id: Uuid,
        resource_type: ResourceType,
        resource_id: Uuid,
    ) -> CoreResult<Vec<Permission>> {
        Ok(self
            .data
            .lock()
            .permissions
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.resource_type == resource_type && p.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn insert_permission(&self, permission: Permission) -> CoreResult<()> {
        self.data.lock().permissions.push(permission);
        Ok(())
    }

    async fn get_tenant(&self, id: Uuid) -> CoreResult<Tenant> {
        self.data.lock().tenants.get(&id).cloned().ok_or(CoreError::NotFound)
    }

    async fn insert_tenant(&self, tenant: Tenant) -> CoreResult<()> {
        self.data.lock().tenants.insert(tenant.id, tenant);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Search index fake: the canonical in-process index doubles as the test
// fake, so it's just re-exported under its historical test name here
// rather than duplicated.
// ---------------------------------------------------------------------

pub use crate::stores::search::memory::MemorySearchIndex as InMemorySearchIndex;

// ---------------------------------------------------------------------
// Cache fake
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (Vec<u8>, std::time::Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CachePort for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> CoreResult<Option<Vec<u8>>> {
        let mut entries = self.entries.lock();
        let rendered = key.render();
        if let Some((value, expires_at)) = entries.get(&rendered) {
            if *expires_at > std::time::Instant::now() {
                return Ok(Some(value.clone()));
            }
            entries.remove(&rendered);
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: std::time::Duration) -> CoreResult<()> {
        self.entries.lock().insert(key.render(), (value, std::time::Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CoreResult<()> {
        self.entries.lock().remove(&key.render());
        Ok(())
    }

    async fn delete_pattern(&self, tenant_id: Uuid, namespace: &str) -> CoreResult<()> {
        let prefix = format!("t:{tenant_id}:{namespace}:");
        self.entries.lock().retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Scan queue fake
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryScanQueue {
    tasks: Mutex<VecDeque<ScanTask>>,
    dead_letters: Mutex<Vec<(ScanTask, String)>>,
}

impl InMemoryScanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().len()
    }
}

#[async_trait]
impl ScanQueuePort for InMemoryScanQueue {
    async fn enqueue(&self, task: ScanTask) -> CoreResult<()> {
        self.tasks.lock().push_back(task);
        Ok(())
    }

    async fn dequeue(&self) -> CoreResult<Option<ScanTask>> {
        Ok(self.tasks.lock().pop_front())
    }

    async fn complete(&self, _task: &ScanTask) -> CoreResult<()> {
        Ok(())
    }

    async fn retry(&self, task: ScanTask) -> CoreResult<()> {
        self.tasks.lock().push_back(task);
        Ok(())
    }

    async fn dead_letter(&self, task: ScanTask, reason: String) -> CoreResult<()> {
        self.dead_letters.lock().push((task, reason));
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Virus scanner fake: wraps the canonical `NullVirusScanner` (same EICAR
// detection, no duplicated logic) and adds the one thing a real double
// needs that the always-on default doesn't: the ability to force a run
// of `ScanOutcome::Error` so tests can drive the retry-then-give-up path.
// ---------------------------------------------------------------------

pub use crate::stores::scanner::null_scanner::EICAR_SIGNATURE;
use crate::stores::scanner::null_scanner::NullVirusScanner;

#[derive(Default)]
pub struct FakeVirusScanner {
    inner: NullVirusScanner,
    force_errors: std::sync::atomic::AtomicU32,
}

impl FakeVirusScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` scans return `ScanOutcome::Error`, for
    /// exercising the retry-then-fail transition.
    pub fn force_errors(&self, count: u32) {
        self.force_errors.store(count, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl VirusScannerPort for FakeVirusScanner {
    async fn scan(&self, stream: ByteStream) -> CoreResult<ScanOutcome> {
        use std::sync::atomic::Ordering;
        let remaining = self.force_errors.load(Ordering::SeqCst);
        if remaining > 0 {
            self.force_errors.store(remaining - 1, Ordering::SeqCst);
            return Ok(ScanOutcome::Error {
                message: "scanner temporarily unavailable".to_string(),
            });
        }
        self.inner.scan(stream).await
    }

    async fn health_check(&self) -> CoreResult<bool> {
        self.inner.health_check().await
    }
}
