// docvault-core/src/lib.rs
// Multi-tenant document management lifecycle engine: upload, virus-scan,
// search indexing, and webhook fan-out, built as a library crate that an
// HTTP/CLI layer (out of scope here) embeds.
//
// Module layout is leaf-first: `domain` and
// `scope` are the pure data/value types everything else depends on; `ports`
// are the trait seams for every external collaborator (object store,
// metadata store, search index, cache, scan queue, virus scanner, rate-limit
// counters); `engine` is the orchestration layer coded purely against those
// traits; `stores` holds concrete backend implementations (Postgres, Redis,
// Elasticsearch, filesystem, a TCP scan protocol client); `testing` holds
// in-memory fakes of every port for unit and integration tests.

pub mod audit;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod scope;
pub mod stores;
pub mod telemetry;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::AppConfig;
pub use domain::*;
pub use error::{CoreError, CoreResult};
pub use scope::{Role, TenantScope};

use std::sync::Arc;

use crate::audit::{AuditLog, InMemoryAuditLog};
use crate::engine::{
    DocumentEngine, EventBus, FolderService, PermissionEvaluator, RateLimiter, SearchService,
    WebhookDispatcher,
};
use crate::ports::{CachePort, MetadataStorePort, ObjectStorePort, RateLimitStorePort, ScanQueuePort, SearchIndexPort};

/// Every wired-up component a binary embedding this crate needs to drive a
/// request or a background worker loop. Construction is the binary's job
/// (it owns picking concrete backends); this struct just groups the
/// resulting `Arc`s so call sites don't thread eight parameters around.
///
/// There is deliberately no global/static instance of this: the core carries
/// no global mutable state, and an
/// `Engine` is constructed once per process and handed to request handlers
/// and worker loops as an explicit value.
pub struct Engine {
    pub documents: Arc<DocumentEngine>,
    pub folders: Arc<FolderService>,
    pub search: Arc<SearchService>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub permissions: Arc<PermissionEvaluator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub events: Arc<EventBus>,
    pub audit: Arc<dyn AuditLog>,
}

impl Engine {
    /// Assembles the engine from concrete port implementations and config.
    /// Callers typically build the ports from `stores::*` against
    /// `AppConfig`, then hand them here; tests build them from
    /// `testing::*` fakes instead.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        object_store: Arc<dyn ObjectStorePort>,
        metadata_store: Arc<dyn MetadataStorePort>,
        search_index: Arc<dyn SearchIndexPort>,
        cache: Arc<dyn CachePort>,
        scan_queue: Arc<dyn ScanQueuePort>,
        rate_limit_store: Arc<dyn RateLimitStorePort>,
        config: &AppConfig,
    ) -> Self {
        let events = Arc::new(EventBus::new(metadata_store.clone()));
        let audit: Arc<dyn AuditLog> = Arc::new(InMemoryAuditLog::default());
        let permissions = Arc::new(PermissionEvaluator::new(metadata_store.clone(), audit.clone()));

        let documents = Arc::new(DocumentEngine::new(
            object_store.clone(),
            metadata_store.clone(),
            search_index.clone(),
            cache.clone(),
            scan_queue,
            events.clone(),
            permissions.clone(),
            config.cache.document_ttl,
            config.scan_queue.max_retries,
        ));
        let folders = Arc::new(FolderService::new(metadata_store.clone(), events.clone(), permissions.clone()));
        let search = Arc::new(SearchService::new(
            search_index,
            metadata_store.clone(),
            cache,
            config.cache.search_ttl,
        ));
        let webhooks = Arc::new(WebhookDispatcher::new(metadata_store, config.webhook.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(rate_limit_store, config.rate_limiter.clone()));

        Self {
            documents,
            folders,
            search,
            webhooks,
            permissions,
            rate_limiter,
            events,
            audit,
        }
    }
}
