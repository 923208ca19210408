// docvault-core/src/engine/search_service.rs
// C9 Search Service: content, metadata-equality, combined, and folder-scoped
// queries. Every call forces tenant_id onto the index query AND re-checks it
// on the materialized rows the index returns ids for — the belt-and-braces
// defense-in-depth spec section 4.5 calls out explicitly, since an index bug
// or stale shard is a different failure mode than a store bug and neither
// should be trusted alone to enforce tenant isolation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::Document;
use crate::error::{CoreError, CoreResult};
use crate::ports::cache::{CacheKey, CachePort};
use crate::ports::metadata_store::MetadataStorePort;
use crate::ports::search_index::{SearchIndexPort, SearchQuery, SortField, SortOrder};
use crate::scope::TenantScope;
use crate::telemetry::request_span;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub content_term: Option<String>,
    pub metadata_equals: BTreeMap<String, String>,
    pub folder_id: Option<Uuid>,
    pub page: u32,
    pub page_size: Option<u32>,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone)]
pub struct SearchResultPage {
    pub documents: Vec<Document>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

fn validate_pagination(page: u32, page_size: Option<u32>) -> CoreResult<(u32, u32)> {
    if page < 1 {
        return Err(CoreError::validation("page must be >= 1"));
    }
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size < 1 || page_size > MAX_PAGE_SIZE {
        return Err(CoreError::validation("page_size must be between 1 and 100"));
    }
    Ok((page, page_size))
}

fn fingerprint(tenant_id: Uuid, req: &SearchRequest, page: u32, page_size: u32) -> String {
    let mut buf = format!(
        "{tenant_id}|{:?}|{:?}|{:?}|{page}|{page_size}|{:?}|{:?}",
        req.content_term, req.folder_id, req.sort_field, req.sort_order, req.metadata_equals
    );
    buf.push_str(&req.metadata_equals.len().to_string());
    hex::encode(Sha256::digest(buf.as_bytes()))
}

pub struct SearchService {
    index: Arc<dyn SearchIndexPort>,
    store: Arc<dyn MetadataStorePort>,
    cache: Arc<dyn CachePort>,
    search_ttl: Duration,
}

impl SearchService {
    pub fn new(
        index: Arc<dyn SearchIndexPort>,
        store: Arc<dyn MetadataStorePort>,
        cache: Arc<dyn CachePort>,
        search_ttl: Duration,
    ) -> Self {
        Self {
            index,
            store,
            cache,
            search_ttl,
        }
    }

    pub async fn search_content(
        &self,
        scope: &TenantScope,
        term: &str,
        req: SearchRequest,
        cancel: CancellationToken,
    ) -> CoreResult<SearchResultPage> {
        self.search(
            scope,
            SearchRequest {
                content_term: Some(term.to_string()),
                metadata_equals: BTreeMap::new(),
                ..req
            },
            cancel,
        )
        .await
    }

    pub async fn search_metadata(
        &self,
        scope: &TenantScope,
        metadata_equals: BTreeMap<String, String>,
        req: SearchRequest,
        cancel: CancellationToken,
    ) -> CoreResult<SearchResultPage> {
        self.search(
            scope,
            SearchRequest {
                content_term: None,
                metadata_equals,
                ..req
            },
            cancel,
        )
        .await
    }

    pub async fn search_combined(
        &self,
        scope: &TenantScope,
        term: &str,
        metadata_equals: BTreeMap<String, String>,
        req: SearchRequest,
        cancel: CancellationToken,
    ) -> CoreResult<SearchResultPage> {
        self.search(
            scope,
            SearchRequest {
                content_term: Some(term.to_string()),
                metadata_equals,
                ..req
            },
            cancel,
        )
        .await
    }

    pub async fn search_folder(
        &self,
        scope: &TenantScope,
        folder_id: Uuid,
        req: SearchRequest,
        cancel: CancellationToken,
    ) -> CoreResult<SearchResultPage> {
        let folder = self.store.get_folder(folder_id, scope.tenant_id).await?;
        scope.check_tenant(folder.tenant_id)?;
        self.search(
            scope,
            SearchRequest {
                folder_id: Some(folder_id),
                ..req
            },
            cancel,
        )
        .await
    }

    async fn search(&self, scope: &TenantScope, req: SearchRequest, cancel: CancellationToken) -> CoreResult<SearchResultPage> {
        let span = request_span(scope.tenant_id, scope.user_id, "search");
        async move {
            let (page, page_size) = validate_pagination(req.page, req.page_size)?;
            let key = CacheKey::search(scope.tenant_id, fingerprint(scope.tenant_id, &req, page, page_size));

            if let Ok(Some(bytes)) = self.cache.get(&key).await {
                match serde_json::from_slice::<SearchResultPage>(&bytes) {
                    Ok(page) => return Ok(page),
                    Err(err) => tracing::warn!(error = %err, "search cache hit failed to deserialize, treating as miss"),
                }
            }

            let query = SearchQuery {
                tenant_id: scope.tenant_id,
                content_term: req.content_term,
                metadata_equals: req.metadata_equals.into_iter().collect(),
                folder_id: req.folder_id,
                page,
                page_size,
                sort_field: req.sort_field,
                sort_order: req.sort_order,
            };

            let results = tokio::select! {
                res = self.index.search(&query) => res?,
                _ = cancel.cancelled() => return Err(CoreError::conflict("search cancelled")),
            };

            let mut documents = Vec::with_capacity(results.hits.len());
            for hit in &results.hits {
                if cancel.is_cancelled() {
                    return Err(CoreError::conflict("search cancelled"));
                }
                match self.store.get_document(hit.document_id, scope.tenant_id).await {
                    Ok(doc) => {
                        // Defense-in-depth: the store already filters by tenant,
                        // but a second explicit check keeps this true even if a
                        // future store implementation forgets to.
                        if doc.tenant_id == scope.tenant_id {
                            documents.push(doc);
                        }
                    }
                    Err(CoreError::NotFound) => continue,
                    Err(err) => return Err(err),
                }
            }

            let page_result = SearchResultPage {
                documents,
                total: results.total,
                page,
                page_size,
            };

            if let Ok(bytes) = serde_json::to_vec(&page_result) {
                let _ = self.cache.set(&key, bytes, self.search_ttl).await;
            }

            Ok(page_result)
        }
        .instrument(span)
        .await
    }
}

impl serde::Serialize for SearchResultPage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("SearchResultPage", 4)?;
        s.serialize_field("documents", &self.documents)?;
        s.serialize_field("total", &self.total)?;
        s.serialize_field("page", &self.page)?;
        s.serialize_field("page_size", &self.page_size)?;
        s.end()
    }
}

impl<'de> serde::Deserialize<'de> for SearchResultPage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Raw {
            documents: Vec<Document>,
            total: u64,
            page: u32,
            page_size: u32,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(SearchResultPage {
            documents: raw.documents,
            total: raw.total,
            page: raw.page,
            page_size: raw.page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_page_zero() {
        assert!(validate_pagination(0, Some(10)).is_err());
    }

    #[test]
    fn rejects_oversize_page() {
        assert!(validate_pagination(1, Some(101)).is_err());
    }

    #[test]
    fn defaults_page_size_to_twenty() {
        let (_, size) = validate_pagination(1, None).unwrap();
        assert_eq!(size, 20);
    }
}
