// docvault-core/src/engine/document_engine.rs
// Document engine: the upload -> scan -> promote/quarantine state
// machine. This is the heart of the system; every other
// engine component either feeds it (folder/permission) or consumes what it
// emits (search indexing, webhook dispatch).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::{
    validate_document_name, validate_document_size, validate_metadata_entries, Capability, Document,
    DocumentStatus, DocumentVersion, ResourceType, TenantStatus,
};
use crate::engine::event_bus::EventBus;
use crate::engine::hashing::hash_while_streaming;
use crate::engine::permission_evaluator::PermissionEvaluator;
use crate::error::{CoreError, CoreResult};
use crate::ports::cache::{CacheKey, CachePort};
use crate::ports::metadata_store::{resolve_tenant_status, MetadataStorePort, NewDocument, NewVersion};
use crate::ports::object_store::{ByteStream, ObjectPath, ObjectStorePort};
use crate::ports::scan_queue::{ScanQueuePort, ScanTask};
use crate::ports::search_index::{IndexDocument, SearchIndexPort};
use crate::ports::virus_scanner::ScanOutcome;
use crate::scope::TenantScope;
use crate::telemetry::request_span;

const UPLOAD_INGEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub folder_id: Uuid,
    pub name: String,
    pub content_type: String,
    pub declared_size: i64,
    pub metadata: Vec<(String, String)>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub document_id: Uuid,
    pub version_id: Uuid,
    pub status: DocumentStatus,
}

pub struct DocumentEngine {
    object_store: Arc<dyn ObjectStorePort>,
    metadata_store: Arc<dyn MetadataStorePort>,
    search_index: Arc<dyn SearchIndexPort>,
    cache: Arc<dyn CachePort>,
    scan_queue: Arc<dyn ScanQueuePort>,
    events: Arc<EventBus>,
    permissions: Arc<PermissionEvaluator>,
    document_cache_ttl: Duration,
    max_scan_retries: u32,
}

impl DocumentEngine {
    pub fn new(
        object_store: Arc<dyn ObjectStorePort>,
        metadata_store: Arc<dyn MetadataStorePort>,
        search_index: Arc<dyn SearchIndexPort>,
        cache: Arc<dyn CachePort>,
        scan_queue: Arc<dyn ScanQueuePort>,
        events: Arc<EventBus>,
        permissions: Arc<PermissionEvaluator>,
        document_cache_ttl: Duration,
        max_scan_retries: u32,
    ) -> Self {
        Self {
            object_store,
            metadata_store,
            search_index,
            cache,
            scan_queue,
            events,
            permissions,
            document_cache_ttl,
            max_scan_retries,
        }
    }

    async fn require_writable_tenant(&self, tenant_id: Uuid) -> CoreResult<()> {
        match resolve_tenant_status(self.metadata_store.as_ref(), tenant_id).await {
            TenantStatus::Inactive => Err(CoreError::NotFound),
            TenantStatus::Suspended => Err(CoreError::forbidden("tenant is suspended; document mutations are disabled")),
            TenantStatus::Active => Ok(()),
        }
    }

    async fn require_visible_tenant(&self, tenant_id: Uuid) -> CoreResult<()> {
        if resolve_tenant_status(self.metadata_store.as_ref(), tenant_id).await == TenantStatus::Inactive {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    pub async fn upload(
        &self,
        scope: &TenantScope,
        req: UploadRequest,
        stream: ByteStream,
        cancel: CancellationToken,
    ) -> CoreResult<UploadOutcome> {
        let span = request_span(scope.tenant_id, scope.user_id, "upload");
        async move {
            validate_document_name(&req.name)?;
            validate_document_size(req.declared_size)?;
            validate_metadata_entries(&req.metadata)?;

            let folder = self.metadata_store.get_folder(req.folder_id, scope.tenant_id).await?;
            scope.check_tenant(folder.tenant_id)?;
            self.permissions
                .evaluate(
                    scope,
                    ResourceType::Folder,
                    req.folder_id,
                    folder.tenant_id,
                    &scope.role_ids,
                    Capability::Write,
                    cancel.clone(),
                )
                .await?;
            self.require_writable_tenant(scope.tenant_id).await?;

            let document_id = Uuid::new_v4();
            let version_id = Uuid::new_v4();
            let upload_id = Uuid::new_v4();
            let expected_temp_path = ObjectPath::temp_key(scope.tenant_id, document_id, upload_id);

            let (hashed_stream, hash_handle) = hash_while_streaming(stream);

            let put_fut = self
                .object_store
                .put_temporary(scope.tenant_id, document_id, upload_id, hashed_stream, &req.content_type);

            let temp_path = tokio::select! {
                res = tokio::time::timeout(UPLOAD_INGEST_TIMEOUT, put_fut) => {
                    match res {
                        Ok(inner) => inner?,
                        Err(_) => {
                            let _ = self.object_store.delete(scope.tenant_id, &expected_temp_path).await;
                            return Err(CoreError::conflict("upload ingest timed out"))
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    let _ = self.object_store.delete(scope.tenant_id, &expected_temp_path).await;
                    return Err(CoreError::conflict("upload cancelled"))
                }
            };

            let hash_result = hash_handle.lock().take().ok_or(CoreError::Internal)?;
            if hash_result.byte_count != req.declared_size {
                let _ = self.object_store.delete(scope.tenant_id, &temp_path).await;
                return Err(CoreError::validation(format!(
                    "declared size {} does not match actual size {}",
                    req.declared_size, hash_result.byte_count
                )));
            }

            if let Err(err) = self
                .persist_upload(scope, &req, document_id, version_id, &temp_path, &hash_result.content_hash, hash_result.byte_count)
                .await
            {
                let _ = self.object_store.delete(scope.tenant_id, &temp_path).await;
                return Err(err);
            }

            let task = ScanTask {
                document_id,
                version_id,
                tenant_id: scope.tenant_id,
                temp_path: temp_path.to_string(),
                retry_count: 0,
            };
            if let Err(err) = self.scan_queue.enqueue(task).await {
                tracing::warn!(%document_id, error = %err, "scan enqueue failed; reconciliation sweep will retry");
            }

            self.invalidate_for_write(scope.tenant_id, document_id).await;

            let events = self.events.clone();
            let tenant_id = scope.tenant_id;
            tokio::spawn(async move {
                events
                    .publish_best_effort(EventBus::document_uploaded(tenant_id, document_id, version_id), CancellationToken::new())
                    .await;
            });

            Ok(UploadOutcome {
                document_id,
                version_id,
                status: DocumentStatus::Processing,
            })
        }
        .instrument(span)
        .await
    }

    async fn persist_upload(
        &self,
        scope: &TenantScope,
        req: &UploadRequest,
        document_id: Uuid,
        version_id: Uuid,
        temp_path: &ObjectPath,
        content_hash: &str,
        actual_size: i64,
    ) -> CoreResult<()> {
        let mut tx = self.metadata_store.begin().await?;
        let result = async {
            tx.insert_document(NewDocument {
                id: document_id,
                tenant_id: scope.tenant_id,
                folder_id: req.folder_id,
                name: req.name.clone(),
                content_type: req.content_type.clone(),
                size: actual_size,
                owner_id: scope.user_id,
            })
            .await?;
            tx.insert_version(NewVersion {
                id: version_id,
                document_id,
                size: actual_size,
                content_hash: content_hash.to_string(),
                storage_path: temp_path.to_string(),
                created_by: scope.user_id,
            })
            .await?;
            tx.set_current_version(document_id, version_id).await?;
            if !req.metadata.is_empty() {
                tx.upsert_metadata(document_id, &req.metadata).await?;
            }
            if !req.tags.is_empty() {
                tx.link_tags(document_id, scope.tenant_id, &req.tags).await?;
            }
            Ok::<(), CoreError>(())
        }
        .await;

        match result {
            Ok(()) => tx.commit().await,
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    pub async fn get_document(&self, scope: &TenantScope, document_id: Uuid, cancel: CancellationToken) -> CoreResult<Document> {
        let span = request_span(scope.tenant_id, scope.user_id, "get_document");
        async move {
            self.require_visible_tenant(scope.tenant_id).await?;
            let key = CacheKey::document(scope.tenant_id, document_id);
            if let Ok(Some(bytes)) = self.cache.get(&key).await {
                match serde_json::from_slice::<Document>(&bytes) {
                    Ok(doc) if doc.status != DocumentStatus::Deleted => {
                        self.permissions
                            .evaluate(
                                scope,
                                ResourceType::Document,
                                doc.id,
                                doc.tenant_id,
                                &scope.role_ids,
                                Capability::Read,
                                cancel.clone(),
                            )
                            .await?;
                        return Ok(doc);
                    }
                    Ok(_) => return Err(CoreError::NotFound),
                    Err(err) => tracing::warn!(error = %err, "document cache hit failed to deserialize, treating as miss"),
                }
            }

            let doc = tokio::select! {
                res = self.metadata_store.get_document(document_id, scope.tenant_id) => res?,
                _ = cancel.cancelled() => return Err(CoreError::conflict("operation cancelled")),
            };
            scope.check_tenant(doc.tenant_id)?;
            if doc.status == DocumentStatus::Deleted {
                return Err(CoreError::NotFound);
            }
            self.permissions
                .evaluate(
                    scope,
                    ResourceType::Document,
                    doc.id,
                    doc.tenant_id,
                    &scope.role_ids,
                    Capability::Read,
                    cancel.clone(),
                )
                .await?;

            if let Ok(bytes) = serde_json::to_vec(&doc) {
                let _ = self.cache.set(&key, bytes, self.document_cache_ttl).await;
            }
            Ok(doc)
        }
        .instrument(span)
        .await
    }

    pub async fn download_document(
        &self,
        scope: &TenantScope,
        document_id: Uuid,
        cancel: CancellationToken,
    ) -> CoreResult<(Document, DocumentVersion, ByteStream)> {
        let span = request_span(scope.tenant_id, scope.user_id, "download_document");
        async move {
            let doc = self.get_document(scope, document_id, cancel.clone()).await?;
            if doc.status != DocumentStatus::Available {
                return Err(CoreError::conflict("document is not available for download"));
            }
            let version = self.metadata_store.get_current_version(doc.id, scope.tenant_id).await?;
            let stream = tokio::select! {
                res = self.object_store.get(scope.tenant_id, &ObjectPath(version.storage_path.clone())) => res?,
                _ = cancel.cancelled() => return Err(CoreError::conflict("download cancelled")),
            };

            let events = self.events.clone();
            let tenant_id = scope.tenant_id;
            let doc_id = doc.id;
            let version_id = version.id;
            tokio::spawn(async move {
                events
                    .publish_best_effort(EventBus::document_downloaded(tenant_id, doc_id, version_id), CancellationToken::new())
                    .await;
            });

            Ok((doc, version, stream))
        }
        .instrument(span)
        .await
    }

    /// Engine-side contract backing
    /// `GET /api/v1/documents?folder_id=&page=&page_size=`. Tenant
    /// filtering happens inside the store query itself (spec section 4.3);
    /// deleted documents are excluded there too.
    pub async fn list_folder_documents(
        &self,
        scope: &TenantScope,
        folder_id: Uuid,
        page: u32,
        page_size: u32,
        cancel: CancellationToken,
    ) -> CoreResult<(Vec<Document>, u64)> {
        let span = request_span(scope.tenant_id, scope.user_id, "list_folder_documents");
        async move {
            self.require_visible_tenant(scope.tenant_id).await?;
            if page < 1 {
                return Err(CoreError::validation("page must be >= 1"));
            }
            if page_size < 1 || page_size > 100 {
                return Err(CoreError::validation("page_size must be between 1 and 100"));
            }
            let folder = self.metadata_store.get_folder(folder_id, scope.tenant_id).await?;
            scope.check_tenant(folder.tenant_id)?;
            self.permissions
                .evaluate(
                    scope,
                    ResourceType::Folder,
                    folder_id,
                    folder.tenant_id,
                    &scope.role_ids,
                    Capability::Read,
                    cancel.clone(),
                )
                .await?;
            tokio::select! {
                res = self.metadata_store.list_documents_in_folder(folder_id, scope.tenant_id, page, page_size) => res,
                _ = cancel.cancelled() => Err(CoreError::conflict("operation cancelled")),
            }
        }
        .instrument(span)
        .await
    }

    /// Engine-side contract backing `POST /api/v1/documents/batch-download`:
    /// at most 100 ids, one independent
    /// result per id so a single bad id doesn't fail the whole batch.
    pub async fn batch_download(
        &self,
        scope: &TenantScope,
        document_ids: Vec<Uuid>,
        cancel: CancellationToken,
    ) -> CoreResult<Vec<(Uuid, CoreResult<ByteStream>)>> {
        let span = request_span(scope.tenant_id, scope.user_id, "batch_download");
        async move {
            if document_ids.is_empty() || document_ids.len() > 100 {
                return Err(CoreError::validation("batch-download accepts between 1 and 100 ids"));
            }
            let mut out = Vec::with_capacity(document_ids.len());
            for id in document_ids {
                if cancel.is_cancelled() {
                    return Err(CoreError::conflict("batch download cancelled"));
                }
                let result = self.download_document(scope, id, cancel.clone()).await.map(|(_, _, stream)| stream);
                out.push((id, result));
            }
            Ok(out)
        }
        .instrument(span)
        .await
    }

    pub async fn delete_document(&self, scope: &TenantScope, document_id: Uuid, cancel: CancellationToken) -> CoreResult<()> {
        let span = request_span(scope.tenant_id, scope.user_id, "delete_document");
        async move {
            let doc = self.metadata_store.get_document(document_id, scope.tenant_id).await?;
            scope.check_tenant(doc.tenant_id)?;
            self.permissions
                .evaluate(
                    scope,
                    ResourceType::Document,
                    doc.id,
                    doc.tenant_id,
                    &scope.role_ids,
                    Capability::Delete,
                    cancel.clone(),
                )
                .await?;
            self.require_writable_tenant(scope.tenant_id).await?;

            tokio::select! {
                res = self.metadata_store.soft_delete_document(document_id, scope.tenant_id) => res?,
                _ = cancel.cancelled() => return Err(CoreError::conflict("delete cancelled")),
            };

            if let Err(err) = self.search_index.remove(scope.tenant_id, document_id).await {
                tracing::warn!(%document_id, error = %err, "search index removal failed on delete");
            }
            match self.metadata_store.list_versions(document_id, scope.tenant_id).await {
                Ok(versions) => {
                    for v in versions {
                        if let Err(err) = self.object_store.delete(scope.tenant_id, &ObjectPath(v.storage_path)).await {
                            tracing::warn!(%document_id, version_id = %v.id, error = %err, "object deletion failed on delete");
                        }
                    }
                }
                Err(err) => tracing::warn!(%document_id, error = %err, "failed to list versions for cleanup on delete"),
            }

            self.invalidate_for_write(scope.tenant_id, document_id).await;
            self.events
                .publish_best_effort(EventBus::document_deleted(scope.tenant_id, document_id), CancellationToken::new())
                .await;
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub async fn update_metadata(
        &self,
        scope: &TenantScope,
        document_id: Uuid,
        entries: Vec<(String, String)>,
        cancel: CancellationToken,
    ) -> CoreResult<()> {
        let span = request_span(scope.tenant_id, scope.user_id, "update_metadata");
        async move {
            validate_metadata_entries(&entries)?;
            let doc = self.metadata_store.get_document(document_id, scope.tenant_id).await?;
            scope.check_tenant(doc.tenant_id)?;
            self.permissions
                .evaluate(
                    scope,
                    ResourceType::Document,
                    doc.id,
                    doc.tenant_id,
                    &scope.role_ids,
                    Capability::Write,
                    cancel.clone(),
                )
                .await?;
            self.require_writable_tenant(scope.tenant_id).await?;

            if cancel.is_cancelled() {
                return Err(CoreError::conflict("update cancelled"));
            }

            let mut tx = self.metadata_store.begin().await?;
            let result = async {
                tx.upsert_metadata(document_id, &entries).await?;
                tx.insert_event(EventBus::document_updated(scope.tenant_id, document_id)).await?;
                Ok::<(), CoreError>(())
            }
            .await;
            match result {
                Ok(()) => tx.commit().await?,
                Err(err) => {
                    let _ = tx.rollback().await;
                    return Err(err);
                }
            }

            if doc.status == DocumentStatus::Available {
                if let Ok(version) = self.metadata_store.get_current_version(document_id, scope.tenant_id).await {
                    if let Err(err) = self.reindex(scope.tenant_id, &doc, &version).await {
                        tracing::warn!(%document_id, error = %err, "reindex after metadata update failed");
                    }
                }
            }

            self.invalidate_for_write(scope.tenant_id, document_id).await;
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// The transition matrix from spec section 4.4. Idempotent at every
    /// terminal state so an at-least-once scan callback delivery is safe.
    pub async fn process_scan_callback(&self, task: ScanTask, outcome: ScanOutcome, cancel: CancellationToken) -> CoreResult<()> {
        let span = request_span(task.tenant_id, Uuid::nil(), "process_scan_callback");
        async move {
            if cancel.is_cancelled() {
                return Err(CoreError::conflict("scan callback processing cancelled"));
            }

            let version = self
                .metadata_store
                .get_version(task.version_id, task.tenant_id)
                .await?;

            if version.status.is_terminal() {
                // Duplicate delivery after the first one already committed.
                self.scan_queue.complete(&task).await?;
                return Ok(());
            }

            match outcome {
                ScanOutcome::Clean => self.transition_to_available(&task, &version).await,
                ScanOutcome::Infected { threat_name } => self.transition_to_quarantined(&task, &version, &threat_name).await,
                ScanOutcome::Error { message } => {
                    if task.retry_count < self.max_scan_retries {
                        self.scan_queue
                            .retry(ScanTask {
                                retry_count: task.retry_count + 1,
                                ..task
                            })
                            .await
                    } else {
                        self.transition_to_failed(&task, &message).await
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn transition_to_available(&self, task: &ScanTask, version: &DocumentVersion) -> CoreResult<()> {
        let document = self.metadata_store.get_document(task.document_id, task.tenant_id).await?;
        let perm_path = self
            .object_store
            .move_to_permanent(
                &ObjectPath(task.temp_path.clone()),
                task.tenant_id,
                document.folder_id,
                task.document_id,
                task.version_id,
                &version.content_hash,
            )
            .await?;

        let mut tx = self.metadata_store.begin().await?;
        let result = async {
            tx.update_version_status(task.version_id, DocumentStatus::Available, Some(&perm_path.to_string()))
                .await?;
            tx.update_document_status(task.document_id, DocumentStatus::Available).await?;
            tx.set_current_version(task.document_id, task.version_id).await?;
            tx.insert_event(EventBus::document_available(task.tenant_id, task.document_id, task.version_id))
                .await?;
            Ok::<(), CoreError>(())
        }
        .await;
        match result {
            Ok(()) => tx.commit().await?,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        }

        let mut available_version = version.clone();
        available_version.storage_path = perm_path.to_string();
        available_version.status = DocumentStatus::Available;
        if let Err(err) = self.reindex(task.tenant_id, &document, &available_version).await {
            tracing::warn!(document_id = %task.document_id, error = %err, "reindex on scan-clean failed");
        }

        self.invalidate_for_write(task.tenant_id, task.document_id).await;
        self.scan_queue.complete(task).await?;
        Ok(())
    }

    async fn transition_to_quarantined(&self, task: &ScanTask, version: &DocumentVersion, threat_name: &str) -> CoreResult<()> {
        let quarantine_path = self
            .object_store
            .move_to_quarantine(
                &ObjectPath(task.temp_path.clone()),
                task.tenant_id,
                task.document_id,
                task.version_id,
                &version.content_hash,
            )
            .await?;

        let mut tx = self.metadata_store.begin().await?;
        let result = async {
            tx.update_version_status(task.version_id, DocumentStatus::Quarantined, Some(&quarantine_path.to_string()))
                .await?;
            tx.update_document_status(task.document_id, DocumentStatus::Quarantined).await?;
            tx.upsert_metadata(
                task.document_id,
                &[
                    ("threat_name".to_string(), threat_name.to_string()),
                    ("scan_time".to_string(), Utc::now().to_rfc3339()),
                ],
            )
            .await?;
            tx.insert_event(EventBus::document_quarantined(task.tenant_id, task.document_id, task.version_id, threat_name))
                .await?;
            Ok::<(), CoreError>(())
        }
        .await;
        match result {
            Ok(()) => tx.commit().await?,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        }

        self.invalidate_for_write(task.tenant_id, task.document_id).await;
        self.scan_queue.complete(task).await?;
        Ok(())
    }

    async fn transition_to_failed(&self, task: &ScanTask, message: &str) -> CoreResult<()> {
        let mut tx = self.metadata_store.begin().await?;
        let result = async {
            tx.update_version_status(task.version_id, DocumentStatus::Failed, None).await?;
            tx.update_document_status(task.document_id, DocumentStatus::Failed).await?;
            tx.upsert_metadata(task.document_id, &[("processing_error".to_string(), message.to_string())])
                .await?;
            tx.insert_event(EventBus::document_processing_failed(
                task.tenant_id,
                task.document_id,
                task.version_id,
                message,
            ))
            .await?;
            Ok::<(), CoreError>(())
        }
        .await;
        match result {
            Ok(()) => tx.commit().await?,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        }

        self.invalidate_for_write(task.tenant_id, task.document_id).await;
        self.scan_queue
            .dead_letter(task.clone(), message.to_string())
            .await?;
        Ok(())
    }

    /// Re-derives searchable text from the current version's bytes and
    /// reindexes name + metadata alongside it. Naive text extraction only
    /// (spec non-goal: "no content transformation beyond text extraction");
    /// non-text content types index with empty body text.
    async fn reindex(&self, tenant_id: Uuid, document: &Document, version: &DocumentVersion) -> CoreResult<()> {
        let content_text = if document.content_type.starts_with("text/") || document.content_type.is_empty() {
            let mut stream = self
                .object_store
                .get(tenant_id, &ObjectPath(version.storage_path.clone()))
                .await?;
            let mut buf = Vec::with_capacity(version.size.max(0) as usize);
            while let Some(chunk) = stream.next().await {
                buf.extend_from_slice(&chunk?);
            }
            String::from_utf8_lossy(&buf).into_owned()
        } else {
            String::new()
        };

        let metadata = self
            .metadata_store
            .get_metadata(document.id, tenant_id)
            .await?
            .into_iter()
            .map(|m| (m.key, m.value))
            .collect();

        self.search_index
            .index(IndexDocument {
                document_id: document.id,
                tenant_id,
                folder_id: document.folder_id,
                name: document.name.clone(),
                content_text,
                metadata,
                created_at: document.created_at,
                updated_at: Utc::now(),
                size: version.size,
            })
            .await
    }

    async fn invalidate_for_write(&self, tenant_id: Uuid, document_id: Uuid) {
        let _ = self.cache.delete(&CacheKey::document(tenant_id, document_id)).await;
        let _ = self.cache.delete_pattern(tenant_id, "folder-list").await;
        let _ = self.cache.delete_pattern(tenant_id, "search").await;
    }

    /// Finds `processing` versions older than `older_than_secs` and redrives
    /// them. When the object already exists under the permanent bucket with
    /// a matching hash (the move succeeded but the metadata update that
    /// should have followed it did not), the metadata transition is retried
    /// directly instead of re-enqueueing a redundant rescan (spec section
    /// 4.4's storage/DB ordering rule).
    pub async fn reconcile_stuck_processing(&self, older_than_secs: i64, cancel: CancellationToken) -> CoreResult<usize> {
        let span = request_span(Uuid::nil(), Uuid::nil(), "reconcile_stuck_processing");
        async move {
            let stuck = self.metadata_store.list_stuck_processing(older_than_secs).await?;
            let mut redriven = 0;
            for (document, version) in stuck {
                if cancel.is_cancelled() {
                    break;
                }
                let perm_path = ObjectPath::permanent_key(document.tenant_id, document.id, version.id);
                let already_moved = self
                    .object_store
                    .exists_with_hash(document.tenant_id, &perm_path, &version.content_hash)
                    .await
                    .unwrap_or(false);

                if already_moved {
                    let task = ScanTask {
                        document_id: document.id,
                        version_id: version.id,
                        tenant_id: document.tenant_id,
                        temp_path: version.storage_path.clone(),
                        retry_count: 0,
                    };
                    if let Err(err) = self.transition_to_available(&task, &version).await {
                        tracing::warn!(document_id = %document.id, error = %err, "reconciliation retry of stalled metadata update failed");
                        continue;
                    }
                } else {
                    let task = ScanTask {
                        document_id: document.id,
                        version_id: version.id,
                        tenant_id: document.tenant_id,
                        temp_path: version.storage_path.clone(),
                        retry_count: 0,
                    };
                    if let Err(err) = self.scan_queue.enqueue(task).await {
                        tracing::warn!(document_id = %document.id, error = %err, "reconciliation re-enqueue failed");
                        continue;
                    }
                }
                redriven += 1;
            }
            Ok(redriven)
        }
        .instrument(span)
        .await
    }
}
