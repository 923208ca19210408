// docvault-core/src/stores/search/elasticsearch.rs
// SearchIndexPort backed by a single `docvault-documents` index. Every
// query carries an explicit `term` filter on `tenant_id` in addition to
// whatever the caller asked for, so a bug upstream that forgot to scope a
// query still can't see across tenants.

use async_trait::async_trait;
use elasticsearch::http::transport::Transport;
use elasticsearch::{Elasticsearch, IndexParts, SearchParts};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::ports::search_index::{IndexDocument, SearchHit, SearchIndexPort, SearchQuery, SearchResults, SortField, SortOrder};

const INDEX_NAME: &str = "docvault-documents";

pub struct ElasticsearchIndex {
    client: Elasticsearch,
}

impl ElasticsearchIndex {
    pub fn connect(url: &str) -> CoreResult<Self> {
        let transport = Transport::single_node(url).map_err(|e| CoreError::dependency("elasticsearch", e))?;
        Ok(Self { client: Elasticsearch::new(transport) })
    }

    /// Issues the index mapping; safe to call repeatedly, a conflict with an
    /// existing index is swallowed the way the teacher's bootstrap does.
    pub async fn ensure_index(&self) -> CoreResult<()> {
        let mapping = json!({
            "mappings": {
                "properties": {
                    "document_id": { "type": "keyword" },
                    "tenant_id": { "type": "keyword" },
                    "folder_id": { "type": "keyword" },
                    "name": { "type": "text", "analyzer": "standard" },
                    "content_text": { "type": "text", "analyzer": "standard" },
                    "metadata": { "type": "object", "dynamic": true },
                    "created_at": { "type": "date" },
                    "updated_at": { "type": "date" },
                    "size": { "type": "long" }
                }
            }
        });
        let response = self
            .client
            .indices()
            .create(elasticsearch::indices::IndicesCreateParts::Index(INDEX_NAME))
            .body(mapping)
            .send()
            .await;
        if let Err(err) = response {
            tracing::debug!(error = %err, "elasticsearch index creation failed (likely already exists)");
        }
        Ok(())
    }

    fn sort_clause(query: &SearchQuery) -> Value {
        let order = match query.sort_order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        match query.sort_field {
            SortField::Relevance => json!([{ "_score": { "order": "desc" } }]),
            SortField::Name => json!([{ "name.keyword": { "order": order } }]),
            SortField::CreatedAt => json!([{ "created_at": { "order": order } }]),
            SortField::UpdatedAt => json!([{ "updated_at": { "order": order } }]),
            SortField::Size => json!([{ "size": { "order": order } }]),
        }
    }
}

#[async_trait]
impl SearchIndexPort for ElasticsearchIndex {
    async fn index(&self, doc: IndexDocument) -> CoreResult<()> {
        let body = json!({
            "document_id": doc.document_id,
            "tenant_id": doc.tenant_id,
            "folder_id": doc.folder_id,
            "name": doc.name,
            "content_text": doc.content_text,
            "metadata": doc.metadata,
            "created_at": doc.created_at,
            "updated_at": doc.updated_at,
            "size": doc.size,
        });
        self.client
            .index(IndexParts::IndexId(INDEX_NAME, &doc.document_id.to_string()))
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::dependency("elasticsearch", e))?;
        Ok(())
    }

    async fn remove(&self, tenant_id: Uuid, document_id: Uuid) -> CoreResult<()> {
        // Deleting by id alone would let a caller that already lost tenant
        // scoping delete another tenant's row; the tenant_id term keeps this
        // path honoring the same filter every query path does.
        let body = json!({
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "document_id": document_id } },
                        { "term": { "tenant_id": tenant_id } },
                    ]
                }
            }
        });
        let response = self
            .client
            .delete_by_query(elasticsearch::DeleteByQueryParts::Index(&[INDEX_NAME]))
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::dependency("elasticsearch", e))?;
        if !response.status_code().is_success() && response.status_code().as_u16() != 404 {
            return Err(CoreError::dependency(
                "elasticsearch",
                anyhow::anyhow!("delete_by_query returned status {}", response.status_code()),
            ));
        }
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> CoreResult<SearchResults> {
        let mut filters = vec![json!({ "term": { "tenant_id": query.tenant_id } })];
        if let Some(folder_id) = query.folder_id {
            filters.push(json!({ "term": { "folder_id": folder_id } }));
        }
        for (key, value) in &query.metadata_equals {
            filters.push(json!({ "term": { format!("metadata.{key}.keyword"): value } }));
        }
        let mut must = Vec::new();
        if let Some(term) = &query.content_term {
            must.push(json!({
                "multi_match": { "query": term, "fields": ["name", "content_text"] }
            }));
        } else {
            must.push(json!({ "match_all": {} }));
        }

        let body = json!({
            "query": { "bool": { "must": must, "filter": filters } },
            "sort": Self::sort_clause(query),
            "from": (query.page.saturating_sub(1) as u64) * query.page_size as u64,
            "size": query.page_size,
        });

        let response = self
            .client
            .search(SearchParts::Index(&[INDEX_NAME]))
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::dependency("elasticsearch", e))?;
        let parsed: Value = response.json().await.map_err(|e| CoreError::dependency("elasticsearch", e))?;

        let total = parsed
            .pointer("/hits/total/value")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let hits = parsed
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|hit| {
                let document_id = hit.pointer("/_source/document_id")?.as_str()?.parse::<Uuid>().ok()?;
                let score = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
                Some(SearchHit { document_id, score })
            })
            .collect();

        Ok(SearchResults { hits, total })
    }
}
