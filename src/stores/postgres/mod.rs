// docvault-core/src/stores/postgres/mod.rs
// Postgres-backed MetadataStorePort. Uses sqlx's runtime-checked `query`/
// `query_as` API rather than the `query!` macro family: the macros need a
// live database (or a checked-in `.sqlx` cache) at compile time, which this
// crate can't assume its embedders always have. Row -> domain conversion is
// therefore explicit, the way the teacher's own repositories do it by hand
// for the columns a query-time macro can't give them (enum/JSON columns).
//
// Every write takes (or re-derives) a tenant_id and includes it in the WHERE
// clause; reads by id that land on another tenant's row come back NotFound,
// never a different error, so existence never leaks across tenants.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::*;
use crate::error::{CoreError, CoreResult};
use crate::ports::metadata_store::{MetadataStorePort, MetadataTransaction, NewDocument, NewVersion};

pub struct PostgresMetadataStore {
    pool: PgPool,
}

impl PostgresMetadataStore {
    pub async fn connect(database_url: &str, pool_size: u32) -> CoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::dependency("postgres", e))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Issues the `CREATE TABLE IF NOT EXISTS` DDL this store expects.
    /// Migrations in a real deployment would own this; exposed here so a
    /// fresh database (e.g. in a test harness with `postgres-store` on) can
    /// bootstrap itself without a separate migration runner.
    pub async fn create_tables(&self) -> CoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                settings JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                folder_id UUID NOT NULL,
                name TEXT NOT NULL,
                content_type TEXT NOT NULL,
                size BIGINT NOT NULL,
                owner_id UUID NOT NULL,
                status TEXT NOT NULL,
                current_version_id UUID NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ
            );
            CREATE INDEX IF NOT EXISTS idx_documents_tenant_folder ON documents(tenant_id, folder_id);
            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status, updated_at);

            CREATE TABLE IF NOT EXISTS document_versions (
                id UUID PRIMARY KEY,
                document_id UUID NOT NULL,
                version_number BIGINT NOT NULL,
                size BIGINT NOT NULL,
                content_hash TEXT NOT NULL,
                status TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                created_by UUID NOT NULL,
                UNIQUE (document_id, version_number)
            );
            CREATE INDEX IF NOT EXISTS idx_versions_document ON document_versions(document_id);

            CREATE TABLE IF NOT EXISTS document_metadata (
                id UUID PRIMARY KEY,
                document_id UUID NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (document_id, key)
            );

            CREATE TABLE IF NOT EXISTS tags (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                name TEXT NOT NULL,
                UNIQUE (tenant_id, name)
            );

            CREATE TABLE IF NOT EXISTS document_tags (
                document_id UUID NOT NULL,
                tag_id UUID NOT NULL,
                PRIMARY KEY (document_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS folders (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                parent_id UUID,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                owner_id UUID NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_folders_tenant_path ON folders(tenant_id, path);

            CREATE TABLE IF NOT EXISTS webhooks (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                url TEXT NOT NULL,
                event_types JSONB NOT NULL,
                secret_key TEXT NOT NULL,
                status TEXT NOT NULL,
                failure_count INT NOT NULL,
                last_failure_time TIMESTAMPTZ
            );
            CREATE INDEX IF NOT EXISTS idx_webhooks_tenant_status ON webhooks(tenant_id, status);

            CREATE TABLE IF NOT EXISTS webhook_deliveries (
                id UUID PRIMARY KEY,
                webhook_id UUID NOT NULL,
                event_id UUID NOT NULL,
                status TEXT NOT NULL,
                attempt_count INT NOT NULL,
                response_status INT,
                response_body TEXT,
                error_message TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                UNIQUE (webhook_id, event_id)
            );

            CREATE TABLE IF NOT EXISTS events (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                event_type TEXT NOT NULL,
                payload JSONB NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                dispatched BOOLEAN NOT NULL DEFAULT FALSE
            );
            CREATE INDEX IF NOT EXISTS idx_events_pending ON events(dispatched, created_at) WHERE NOT dispatched;

            CREATE TABLE IF NOT EXISTS permissions (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                role_id UUID NOT NULL,
                resource_type TEXT NOT NULL,
                resource_id UUID NOT NULL,
                permission_type TEXT NOT NULL,
                inherited BOOLEAN NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_permissions_resource ON permissions(tenant_id, resource_type, resource_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::dependency("postgres", e))?;
        Ok(())
    }
}

fn document_status_to_str(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Processing => "processing",
        DocumentStatus::Available => "available",
        DocumentStatus::Quarantined => "quarantined",
        DocumentStatus::Failed => "failed",
        DocumentStatus::Deleted => "deleted",
    }
}

fn document_status_from_str(s: &str) -> CoreResult<DocumentStatus> {
    match s {
        "processing" => Ok(DocumentStatus::Processing),
        "available" => Ok(DocumentStatus::Available),
        "quarantined" => Ok(DocumentStatus::Quarantined),
        "failed" => Ok(DocumentStatus::Failed),
        "deleted" => Ok(DocumentStatus::Deleted),
        other => Err(CoreError::dependency("postgres", anyhow::anyhow!("unknown document status {other}"))),
    }
}

fn resource_type_to_str(rt: ResourceType) -> &'static str {
    match rt {
        ResourceType::Document => "document",
        ResourceType::Folder => "folder",
    }
}

fn resource_type_from_str(s: &str) -> CoreResult<ResourceType> {
    match s {
        "document" => Ok(ResourceType::Document),
        "folder" => Ok(ResourceType::Folder),
        other => Err(CoreError::dependency("postgres", anyhow::anyhow!("unknown resource type {other}"))),
    }
}

fn permission_type_to_str(pt: PermissionType) -> &'static str {
    match pt {
        PermissionType::Read => "read",
        PermissionType::Write => "write",
        PermissionType::Delete => "delete",
        PermissionType::Admin => "admin",
    }
}

fn permission_type_from_str(s: &str) -> CoreResult<PermissionType> {
    match s {
        "read" => Ok(PermissionType::Read),
        "write" => Ok(PermissionType::Write),
        "delete" => Ok(PermissionType::Delete),
        "admin" => Ok(PermissionType::Admin),
        other => Err(CoreError::dependency("postgres", anyhow::anyhow!("unknown permission type {other}"))),
    }
}

fn webhook_status_to_str(status: WebhookStatus) -> &'static str {
    match status {
        WebhookStatus::Active => "active",
        WebhookStatus::Inactive => "inactive",
    }
}

fn webhook_status_from_str(s: &str) -> CoreResult<WebhookStatus> {
    match s {
        "active" => Ok(WebhookStatus::Active),
        "inactive" => Ok(WebhookStatus::Inactive),
        other => Err(CoreError::dependency("postgres", anyhow::anyhow!("unknown webhook status {other}"))),
    }
}

fn delivery_status_to_str(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Pending => "pending",
        DeliveryStatus::Success => "success",
        DeliveryStatus::Failed => "failed",
    }
}

fn delivery_status_from_str(s: &str) -> CoreResult<DeliveryStatus> {
    match s {
        "pending" => Ok(DeliveryStatus::Pending),
        "success" => Ok(DeliveryStatus::Success),
        "failed" => Ok(DeliveryStatus::Failed),
        other => Err(CoreError::dependency("postgres", anyhow::anyhow!("unknown delivery status {other}"))),
    }
}

fn tenant_status_to_str(status: TenantStatus) -> &'static str {
    match status {
        TenantStatus::Active => "active",
        TenantStatus::Suspended => "suspended",
        TenantStatus::Inactive => "inactive",
    }
}

fn tenant_status_from_str(s: &str) -> CoreResult<TenantStatus> {
    match s {
        "active" => Ok(TenantStatus::Active),
        "suspended" => Ok(TenantStatus::Suspended),
        "inactive" => Ok(TenantStatus::Inactive),
        other => Err(CoreError::dependency("postgres", anyhow::anyhow!("unknown tenant status {other}"))),
    }
}

fn tenant_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<Tenant> {
    let settings_json: serde_json::Value = row.try_get("settings")?;
    let settings = match settings_json {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    Ok(Tenant {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: tenant_status_from_str(row.try_get("status")?)?,
        settings,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn document_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<Document> {
    Ok(Document {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        folder_id: row.try_get("folder_id")?,
        name: row.try_get("name")?,
        content_type: row.try_get("content_type")?,
        size: row.try_get("size")?,
        owner_id: row.try_get("owner_id")?,
        status: document_status_from_str(row.try_get("status")?)?,
        current_version_id: row.try_get("current_version_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn version_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<DocumentVersion> {
    Ok(DocumentVersion {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        version_number: row.try_get("version_number")?,
        size: row.try_get("size")?,
        content_hash: row.try_get("content_hash")?,
        status: document_status_from_str(row.try_get("status")?)?,
        storage_path: row.try_get("storage_path")?,
        created_at: row.try_get("created_at")?,
        created_by: row.try_get("created_by")?,
    })
}

fn folder_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<Folder> {
    Ok(Folder {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        parent_id: row.try_get("parent_id")?,
        name: row.try_get("name")?,
        path: row.try_get("path")?,
        owner_id: row.try_get("owner_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn webhook_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<Webhook> {
    let event_types_json: serde_json::Value = row.try_get("event_types")?;
    let event_type_strs: Vec<String> = serde_json::from_value(event_types_json)
        .map_err(|e| CoreError::dependency("postgres", e))?;
    let event_types = event_type_strs
        .iter()
        .map(|s| EventType::from_str(s))
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(Webhook {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        url: row.try_get("url")?,
        event_types,
        secret_key: row.try_get("secret_key")?,
        status: webhook_status_from_str(row.try_get("status")?)?,
        failure_count: row.try_get::<i32, _>("failure_count")? as u32,
        last_failure_time: row.try_get("last_failure_time")?,
    })
}

fn delivery_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<WebhookDelivery> {
    Ok(WebhookDelivery {
        id: row.try_get("id")?,
        webhook_id: row.try_get("webhook_id")?,
        event_id: row.try_get("event_id")?,
        status: delivery_status_from_str(row.try_get("status")?)?,
        attempt_count: row.try_get::<i32, _>("attempt_count")? as u32,
        response_status: row.try_get::<Option<i32>, _>("response_status")?.map(|v| v as u16),
        response_body: row.try_get("response_body")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn event_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<Event> {
    let event_type: String = row.try_get("event_type")?;
    Ok(Event {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        event_type: EventType::from_str(&event_type)?,
        payload: row.try_get("payload")?,
        occurred_at: row.try_get("occurred_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn permission_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<Permission> {
    Ok(Permission {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        role_id: row.try_get("role_id")?,
        resource_type: resource_type_from_str(row.try_get("resource_type")?)?,
        resource_id: row.try_get("resource_id")?,
        permission_type: permission_type_from_str(row.try_get("permission_type")?)?,
        inherited: row.try_get("inherited")?,
    })
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl MetadataTransaction for PostgresTransaction {
    async fn insert_document(&mut self, doc: NewDocument) -> CoreResult<()> {
        let now = chrono::Utc::now();
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, tenant_id, folder_id, name, content_type, size, owner_id, status, current_version_id, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NULL)
            "#,
        )
        .bind(doc.id)
        .bind(doc.tenant_id)
        .bind(doc.folder_id)
        .bind(&doc.name)
        .bind(&doc.content_type)
        .bind(doc.size)
        .bind(doc.owner_id)
        .bind(document_status_to_str(DocumentStatus::Processing))
        .bind(Uuid::nil())
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn insert_version(&mut self, version: NewVersion) -> CoreResult<i64> {
        let next_number: i64 = sqlx::query(
            "SELECT COALESCE(MAX(version_number), 0) + 1 AS next FROM document_versions WHERE document_id = $1 FOR UPDATE",
        )
        .bind(version.document_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(CoreError::from)?
        .try_get("next")?;

        sqlx::query(
            r#"
            INSERT INTO document_versions
                (id, document_id, version_number, size, content_hash, status, storage_path, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(version.id)
        .bind(version.document_id)
        .bind(next_number)
        .bind(version.size)
        .bind(&version.content_hash)
        .bind(document_status_to_str(DocumentStatus::Processing))
        .bind(&version.storage_path)
        .bind(chrono::Utc::now())
        .bind(version.created_by)
        .execute(&mut *self.tx)
        .await
        .map_err(CoreError::from)?;

        Ok(next_number)
    }

    async fn set_current_version(&mut self, document_id: Uuid, version_id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("UPDATE documents SET current_version_id = $2, updated_at = now() WHERE id = $1")
            .bind(document_id)
            .bind(version_id)
            .execute(&mut *self.tx)
            .await
            .map_err(CoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn upsert_metadata(&mut self, document_id: Uuid, entries: &[(String, String)]) -> CoreResult<()> {
        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO document_metadata (id, document_id, key, value, updated_at)
                VALUES ($1, $2, $3, $4, now())
                ON CONFLICT (document_id, key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(document_id)
            .bind(key)
            .bind(value)
            .execute(&mut *self.tx)
            .await
            .map_err(CoreError::from)?;
        }
        Ok(())
    }

    async fn link_tags(&mut self, document_id: Uuid, tenant_id: Uuid, tag_names: &[String]) -> CoreResult<()> {
        for name in tag_names {
            let tag_id: Uuid = sqlx::query(
                r#"
                INSERT INTO tags (id, tenant_id, name) VALUES ($1, $2, $3)
                ON CONFLICT (tenant_id, name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(CoreError::from)?
            .try_get("id")?;

            sqlx::query("INSERT INTO document_tags (document_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(document_id)
                .bind(tag_id)
                .execute(&mut *self.tx)
                .await
                .map_err(CoreError::from)?;
        }
        Ok(())
    }

    async fn update_document_status(&mut self, document_id: Uuid, status: DocumentStatus) -> CoreResult<()> {
        let result = sqlx::query("UPDATE documents SET status = $2, updated_at = now() WHERE id = $1")
            .bind(document_id)
            .bind(document_status_to_str(status))
            .execute(&mut *self.tx)
            .await
            .map_err(CoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn update_version_status(
        &mut self,
        version_id: Uuid,
        status: DocumentStatus,
        storage_path: Option<&str>,
    ) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE document_versions SET status = $2, storage_path = COALESCE($3, storage_path) WHERE id = $1",
        )
        .bind(version_id)
        .bind(document_status_to_str(status))
        .bind(storage_path)
        .execute(&mut *self.tx)
        .await
        .map_err(CoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_event(&mut self, event: Event) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO events (id, tenant_id, event_type, payload, occurred_at, created_at, dispatched) VALUES ($1, $2, $3, $4, $5, $6, FALSE)",
        )
        .bind(event.id)
        .bind(event.tenant_id)
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(event.occurred_at)
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.tx.commit().await.map_err(CoreError::from)
    }

    async fn rollback(self: Box<Self>) -> CoreResult<()> {
        self.tx.rollback().await.map_err(CoreError::from)
    }
}

#[async_trait]
impl MetadataStorePort for PostgresMetadataStore {
    async fn begin(&self) -> CoreResult<Box<dyn MetadataTransaction>> {
        let tx = self.pool.begin().await.map_err(CoreError::from)?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn get_document(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<Document> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?
            .ok_or(CoreError::NotFound)?;
        document_from_row(&row)
    }

    async fn get_version(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<DocumentVersion> {
        let row = sqlx::query(
            r#"
            SELECT v.* FROM document_versions v
            JOIN documents d ON d.id = v.document_id
            WHERE v.id = $1 AND d.tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::from)?
        .ok_or(CoreError::NotFound)?;
        version_from_row(&row)
    }

    async fn get_current_version(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<DocumentVersion> {
        let row = sqlx::query(
            r#"
            SELECT v.* FROM document_versions v
            JOIN documents d ON d.id = v.document_id AND d.current_version_id = v.id
            WHERE d.id = $1 AND d.tenant_id = $2
            "#,
        )
        .bind(document_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::from)?
        .ok_or(CoreError::NotFound)?;
        version_from_row(&row)
    }

    async fn list_versions(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<Vec<DocumentVersion>> {
        let owned = sqlx::query("SELECT 1 FROM documents WHERE id = $1 AND tenant_id = $2")
            .bind(document_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;
        if owned.is_none() {
            return Err(CoreError::NotFound);
        }

        let rows = sqlx::query("SELECT * FROM document_versions WHERE document_id = $1 ORDER BY version_number ASC")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;
        rows.iter().map(version_from_row).collect()
    }

    async fn get_metadata(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<Vec<DocumentMetadata>> {
        let owned = sqlx::query("SELECT 1 FROM documents WHERE id = $1 AND tenant_id = $2")
            .bind(document_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;
        if owned.is_none() {
            return Err(CoreError::NotFound);
        }

        let rows = sqlx::query("SELECT * FROM document_metadata WHERE document_id = $1")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;
        rows.iter()
            .map(|row| {
                Ok(DocumentMetadata {
                    id: row.try_get("id")?,
                    document_id: row.try_get("document_id")?,
                    key: row.try_get("key")?,
                    value: row.try_get("value")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    async fn list_documents_in_folder(
        &self,
        folder_id: Uuid,
        tenant_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> CoreResult<(Vec<Document>, u64)> {
        let offset = (page.saturating_sub(1)) as i64 * page_size as i64;
        let rows = sqlx::query(
            r#"
            SELECT * FROM documents
            WHERE folder_id = $1 AND tenant_id = $2 AND status != 'deleted'
            ORDER BY created_at ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(folder_id)
        .bind(tenant_id)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM documents WHERE folder_id = $1 AND tenant_id = $2 AND status != 'deleted'",
        )
        .bind(folder_id)
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(CoreError::from)?
        .try_get("total")?;

        let docs = rows.iter().map(document_from_row).collect::<CoreResult<Vec<_>>>()?;
        Ok((docs, total as u64))
    }

    async fn list_stuck_processing(&self, older_than_secs: i64) -> CoreResult<Vec<(Document, DocumentVersion)>> {
        let rows = sqlx::query(
            r#"
            SELECT d.*, v.id AS v_id, v.document_id AS v_document_id, v.version_number AS v_version_number,
                   v.size AS v_size, v.content_hash AS v_content_hash, v.status AS v_status,
                   v.storage_path AS v_storage_path, v.created_at AS v_created_at, v.created_by AS v_created_by
            FROM documents d
            JOIN document_versions v ON v.id = d.current_version_id
            WHERE d.status = 'processing' AND d.updated_at < now() - make_interval(secs => $1)
            "#,
        )
        .bind(older_than_secs as f64)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;

        rows.iter()
            .map(|row| {
                let document = document_from_row(row)?;
                let version = DocumentVersion {
                    id: row.try_get("v_id")?,
                    document_id: row.try_get("v_document_id")?,
                    version_number: row.try_get("v_version_number")?,
                    size: row.try_get("v_size")?,
                    content_hash: row.try_get("v_content_hash")?,
                    status: document_status_from_str(row.try_get("v_status")?)?,
                    storage_path: row.try_get("v_storage_path")?,
                    created_at: row.try_get("v_created_at")?,
                    created_by: row.try_get("v_created_by")?,
                };
                Ok((document, version))
            })
            .collect()
    }

    async fn soft_delete_document(&self, document_id: Uuid, tenant_id: Uuid) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE documents SET status = 'deleted', deleted_at = now(), updated_at = now() WHERE id = $1 AND tenant_id = $2",
        )
        .bind(document_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn get_folder(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<Folder> {
        let row = sqlx::query("SELECT * FROM folders WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?
            .ok_or(CoreError::NotFound)?;
        folder_from_row(&row)
    }

    async fn get_root_folder(&self, tenant_id: Uuid) -> CoreResult<Folder> {
        let row = sqlx::query("SELECT * FROM folders WHERE tenant_id = $1 AND parent_id IS NULL")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?
            .ok_or(CoreError::NotFound)?;
        folder_from_row(&row)
    }

    async fn insert_folder(&self, folder: Folder) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO folders (id, tenant_id, parent_id, name, path, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(folder.id)
        .bind(folder.tenant_id)
        .bind(folder.parent_id)
        .bind(&folder.name)
        .bind(&folder.path)
        .bind(folder.owner_id)
        .bind(folder.created_at)
        .bind(folder.updated_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn rewrite_subtree_paths(
        &self,
        folder_id: Uuid,
        tenant_id: Uuid,
        new_parent_id: Uuid,
        new_path: String,
    ) -> CoreResult<()> {
        // Descendant rewrite and the moved folder's own row update must land
        // atomically -- a crash between the two would otherwise leave
        // descendants pointing at a new path prefix while the folder itself
        // still carries its old one.
        let mut tx = self.pool.begin().await.map_err(CoreError::from)?;

        let old_path: String = sqlx::query("SELECT path FROM folders WHERE id = $1 AND tenant_id = $2")
            .bind(folder_id)
            .bind(tenant_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(CoreError::from)?
            .ok_or(CoreError::NotFound)?
            .try_get("path")?;

        sqlx::query(
            r#"
            UPDATE folders
            SET path = $3 || substr(path, length($4) + 1), updated_at = now()
            WHERE tenant_id = $2 AND id != $1 AND path LIKE $4 || '/%'
            "#,
        )
        .bind(folder_id)
        .bind(tenant_id)
        .bind(&new_path)
        .bind(&old_path)
        .execute(&mut *tx)
        .await
        .map_err(CoreError::from)?;

        // Only the moved folder's own `parent_id` changes -- its
        // descendants' `parent_id` rows still point at the right ancestor
        // inside the subtree, which didn't change shape.
        sqlx::query("UPDATE folders SET parent_id = $2, path = $3, updated_at = now() WHERE id = $1")
            .bind(folder_id)
            .bind(new_parent_id)
            .bind(&new_path)
            .execute(&mut *tx)
            .await
            .map_err(CoreError::from)?;

        tx.commit().await.map_err(CoreError::from)?;
        Ok(())
    }

    async fn list_folder_children(&self, folder_id: Uuid, tenant_id: Uuid) -> CoreResult<Vec<Folder>> {
        let rows = sqlx::query("SELECT * FROM folders WHERE tenant_id = $1 AND parent_id = $2")
            .bind(tenant_id)
            .bind(folder_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::from)?;
        rows.iter().map(folder_from_row).collect()
    }

    async fn insert_webhook(&self, webhook: Webhook) -> CoreResult<()> {
        let event_type_strs: Vec<&str> = webhook.event_types.iter().map(|e| e.as_str()).collect();
        sqlx::query(
            r#"
            INSERT INTO webhooks (id, tenant_id, url, event_types, secret_key, status, failure_count, last_failure_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(webhook.id)
        .bind(webhook.tenant_id)
        .bind(&webhook.url)
        .bind(serde_json::to_value(&event_type_strs).map_err(|e| CoreError::dependency("postgres", e))?)
        .bind(&webhook.secret_key)
        .bind(webhook_status_to_str(webhook.status))
        .bind(webhook.failure_count as i32)
        .bind(webhook.last_failure_time)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn get_webhook(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<Webhook> {
        let row = sqlx::query("SELECT * FROM webhooks WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?
            .ok_or(CoreError::NotFound)?;
        webhook_from_row(&row)
    }

    async fn list_active_webhooks_for_event(&self, tenant_id: Uuid, event_type: EventType) -> CoreResult<Vec<Webhook>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM webhooks
            WHERE tenant_id = $1 AND status = 'active' AND event_types @> $2
            "#,
        )
        .bind(tenant_id)
        .bind(serde_json::to_value([event_type.as_str()]).map_err(|e| CoreError::dependency("postgres", e))?)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;
        rows.iter().map(webhook_from_row).collect()
    }

    async fn update_webhook(&self, webhook: Webhook) -> CoreResult<()> {
        let event_type_strs: Vec<&str> = webhook.event_types.iter().map(|e| e.as_str()).collect();
        let result = sqlx::query(
            r#"
            UPDATE webhooks
            SET url = $3, event_types = $4, secret_key = $5, status = $6, failure_count = $7, last_failure_time = $8
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(webhook.id)
        .bind(webhook.tenant_id)
        .bind(&webhook.url)
        .bind(serde_json::to_value(&event_type_strs).map_err(|e| CoreError::dependency("postgres", e))?)
        .bind(&webhook.secret_key)
        .bind(webhook_status_to_str(webhook.status))
        .bind(webhook.failure_count as i32)
        .bind(webhook.last_failure_time)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_webhook(&self, id: Uuid, tenant_id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM webhooks WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    async fn find_delivery(&self, webhook_id: Uuid, event_id: Uuid) -> CoreResult<Option<WebhookDelivery>> {
        let row = sqlx::query("SELECT * FROM webhook_deliveries WHERE webhook_id = $1 AND event_id = $2")
            .bind(webhook_id)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn insert_delivery(&self, delivery: WebhookDelivery) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries
                (id, webhook_id, event_id, status, attempt_count, response_status, response_body, error_message, created_at, updated_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.webhook_id)
        .bind(delivery.event_id)
        .bind(delivery_status_to_str(delivery.status))
        .bind(delivery.attempt_count as i32)
        .bind(delivery.response_status.map(|v| v as i32))
        .bind(&delivery.response_body)
        .bind(&delivery.error_message)
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .bind(delivery.completed_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn update_delivery(&self, delivery: WebhookDelivery) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = $3, attempt_count = $4, response_status = $5, response_body = $6,
                error_message = $7, updated_at = $8, completed_at = $9
            WHERE webhook_id = $1 AND event_id = $2
            "#,
        )
        .bind(delivery.webhook_id)
        .bind(delivery.event_id)
        .bind(delivery_status_to_str(delivery.status))
        .bind(delivery.attempt_count as i32)
        .bind(delivery.response_status.map(|v| v as i32))
        .bind(&delivery.response_body)
        .bind(&delivery.error_message)
        .bind(delivery.updated_at)
        .bind(delivery.completed_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn insert_event_standalone(&self, event: Event) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO events (id, tenant_id, event_type, payload, occurred_at, created_at, dispatched) VALUES ($1, $2, $3, $4, $5, $6, FALSE)",
        )
        .bind(event.id)
        .bind(event.tenant_id)
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(event.occurred_at)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn list_pending_events(&self, limit: u32) -> CoreResult<Vec<Event>> {
        let rows = sqlx::query(
            r#"
            UPDATE events SET dispatched = TRUE
            WHERE id IN (
                SELECT id FROM events WHERE NOT dispatched ORDER BY created_at ASC LIMIT $1 FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;
        rows.iter().map(event_from_row).collect()
    }

    async fn list_permissions_for_resource(
        &self,
        tenant_id: Uuid,
        resource_type: ResourceType,
        resource_id: Uuid,
    ) -> CoreResult<Vec<Permission>> {
        let rows = sqlx::query(
            "SELECT * FROM permissions WHERE tenant_id = $1 AND resource_type = $2 AND resource_id = $3",
        )
        .bind(tenant_id)
        .bind(resource_type_to_str(resource_type))
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::from)?;
        rows.iter().map(permission_from_row).collect()
    }

    async fn insert_permission(&self, permission: Permission) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, tenant_id, role_id, resource_type, resource_id, permission_type, inherited)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(permission.id)
        .bind(permission.tenant_id)
        .bind(permission.role_id)
        .bind(resource_type_to_str(permission.resource_type))
        .bind(permission.resource_id)
        .bind(permission_type_to_str(permission.permission_type))
        .bind(permission.inherited)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }

    async fn get_tenant(&self, id: Uuid) -> CoreResult<Tenant> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::from)?
            .ok_or(CoreError::NotFound)?;
        tenant_from_row(&row)
    }

    async fn insert_tenant(&self, tenant: Tenant) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, status, settings, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(tenant_status_to_str(tenant.status))
        .bind(serde_json::Value::Object(tenant.settings))
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }
}
