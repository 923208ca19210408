// docvault-core/src/ports/search_index.rs
// C4 Search Index Port: index/update/remove document text+metadata, and
// tenant-scoped queries. The tenant filter is mandatory on every query, not
// optional: this is the first half of a belt-and-braces defense-in-depth,
// and is re-checked again in the search service after ids come back.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::CoreResult;

#[derive(Debug, Clone)]
pub struct IndexDocument {
    pub document_id: Uuid,
    pub tenant_id: Uuid,
    pub folder_id: Uuid,
    pub name: String,
    pub content_text: String,
    pub metadata: HashMap<String, String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Relevance,
    Name,
    CreatedAt,
    UpdatedAt,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub tenant_id: Uuid,
    pub content_term: Option<String>,
    pub metadata_equals: HashMap<String, String>,
    pub folder_id: Option<Uuid>,
    pub page: u32,
    pub page_size: u32,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document_id: Uuid,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total: u64,
}

#[async_trait]
pub trait SearchIndexPort: Send + Sync {
    async fn index(&self, doc: IndexDocument) -> CoreResult<()>;

    async fn remove(&self, tenant_id: Uuid, document_id: Uuid) -> CoreResult<()>;

    async fn search(&self, query: &SearchQuery) -> CoreResult<SearchResults>;
}
