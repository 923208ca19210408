// docvault-core/src/stores/search/memory.rs
// In-process SearchIndexPort: a tenant-scoped HashMap, linear-scanned per
// query. Fine for a single-node deployment or a test harness; the
// `elasticsearch` backend is what a multi-node deployment reaches for.
// The tenant filter is applied here even though every caller already
// scopes the query, matching the port's documented defense-in-depth.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::ports::search_index::{IndexDocument, SearchHit, SearchIndexPort, SearchQuery, SearchResults, SortField, SortOrder};

#[derive(Default)]
pub struct MemorySearchIndex {
    documents: Mutex<HashMap<(Uuid, Uuid), IndexDocument>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchIndexPort for MemorySearchIndex {
    async fn index(&self, doc: IndexDocument) -> CoreResult<()> {
        self.documents.lock().insert((doc.tenant_id, doc.document_id), doc);
        Ok(())
    }

    async fn remove(&self, tenant_id: Uuid, document_id: Uuid) -> CoreResult<()> {
        self.documents.lock().remove(&(tenant_id, document_id));
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> CoreResult<SearchResults> {
        let documents = self.documents.lock();
        let mut matches: Vec<&IndexDocument> = documents
            .values()
            .filter(|d| d.tenant_id == query.tenant_id)
            .filter(|d| query.folder_id.is_none_or(|f| d.folder_id == f))
            .filter(|d| {
                query.content_term.as_ref().is_none_or(|term| {
                    let term = term.to_lowercase();
                    d.content_text.to_lowercase().contains(&term) || d.name.to_lowercase().contains(&term)
                })
            })
            .filter(|d| query.metadata_equals.iter().all(|(k, v)| d.metadata.get(k).is_some_and(|val| val == v)))
            .collect();

        match query.sort_field {
            SortField::Name => matches.sort_by(|a, b| a.name.cmp(&b.name)),
            SortField::CreatedAt => matches.sort_by_key(|d| d.created_at),
            SortField::UpdatedAt => matches.sort_by_key(|d| d.updated_at),
            SortField::Size => matches.sort_by_key(|d| d.size),
            SortField::Relevance => {}
        }
        if query.sort_order == SortOrder::Descending {
            matches.reverse();
        }

        let total = matches.len() as u64;
        let start = ((query.page.saturating_sub(1)) as usize) * query.page_size as usize;
        let hits = matches
            .into_iter()
            .skip(start)
            .take(query.page_size as usize)
            .map(|d| SearchHit { document_id: d.document_id, score: 1.0 })
            .collect();

        Ok(SearchResults { hits, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(tenant_id: Uuid, name: &str) -> IndexDocument {
        IndexDocument {
            document_id: Uuid::new_v4(),
            tenant_id,
            folder_id: Uuid::new_v4(),
            name: name.to_string(),
            content_text: "quarterly report contents".to_string(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            size: 1024,
        }
    }

    #[tokio::test]
    async fn search_never_crosses_tenants() {
        let index = MemorySearchIndex::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        index.index(doc(tenant_a, "a.pdf")).await.unwrap();
        index.index(doc(tenant_b, "b.pdf")).await.unwrap();

        let query = SearchQuery {
            tenant_id: tenant_a,
            content_term: None,
            metadata_equals: HashMap::new(),
            folder_id: None,
            page: 1,
            page_size: 10,
            sort_field: SortField::Name,
            sort_order: SortOrder::Ascending,
        };
        let results = index.search(&query).await.unwrap();
        assert_eq!(results.total, 1);
    }
}
