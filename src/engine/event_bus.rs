// docvault-core/src/engine/event_bus.rs
// C10 Event Bus. Transactional state changes write their event through the
// same `MetadataTransaction` the caller already holds (outbox pattern,
// adopted for spec section 9 Open Question (b) — see DESIGN.md); the two
// emissions the spec calls out as post-commit (`document.uploaded`,
// `document.downloaded`) go through `publish_best_effort` instead, logged on
// failure and never allowed to fail the caller's request.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::{Event, EventType};
use crate::ports::metadata_store::MetadataStorePort;
use crate::telemetry::request_span;

pub struct EventBus {
    store: Arc<dyn MetadataStorePort>,
}

impl EventBus {
    pub fn new(store: Arc<dyn MetadataStorePort>) -> Self {
        Self { store }
    }

    pub fn build(tenant_id: Uuid, event_type: EventType, payload: serde_json::Value) -> Event {
        Event {
            id: Uuid::new_v4(),
            tenant_id,
            event_type,
            payload,
            occurred_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    /// Fire-and-forget publish for the two post-commit emissions the spec
    /// names explicitly. `cancel` only gates *starting* the publish -- once
    /// the write is in flight it always runs to completion, since passing the
    /// originating request's own token here would mean a cancelled request
    /// drops an event it already promised to emit (design note, spec section
    /// 9); callers spawn this onto its own task rather than awaiting it
    /// inline on the hot path.
    pub async fn publish_best_effort(&self, event: Event, cancel: CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        let event_type = event.event_type;
        let tenant_id = event.tenant_id;
        let span = request_span(tenant_id, Uuid::nil(), "publish_best_effort");
        async move {
            if let Err(err) = self.store.insert_event_standalone(event).await {
                tracing::warn!(
                    %tenant_id,
                    event_type = event_type.as_str(),
                    error = %err,
                    "best-effort event publish failed"
                );
            }
        }
        .instrument(span)
        .await
    }

    pub fn document_uploaded(tenant_id: Uuid, document_id: Uuid, version_id: Uuid) -> Event {
        Self::build(
            tenant_id,
            EventType::DocumentUploaded,
            json!({ "document_id": document_id, "version_id": version_id }),
        )
    }

    pub fn document_downloaded(tenant_id: Uuid, document_id: Uuid, version_id: Uuid) -> Event {
        Self::build(
            tenant_id,
            EventType::DocumentDownloaded,
            json!({ "document_id": document_id, "version_id": version_id }),
        )
    }

    pub fn document_available(tenant_id: Uuid, document_id: Uuid, version_id: Uuid) -> Event {
        Self::build(
            tenant_id,
            EventType::DocumentAvailable,
            json!({ "document_id": document_id, "version_id": version_id }),
        )
    }

    pub fn document_quarantined(tenant_id: Uuid, document_id: Uuid, version_id: Uuid, threat_name: &str) -> Event {
        Self::build(
            tenant_id,
            EventType::DocumentQuarantined,
            json!({ "document_id": document_id, "version_id": version_id, "threat_name": threat_name }),
        )
    }

    pub fn document_processing_failed(tenant_id: Uuid, document_id: Uuid, version_id: Uuid, reason: &str) -> Event {
        Self::build(
            tenant_id,
            EventType::DocumentProcessingFailed,
            json!({ "document_id": document_id, "version_id": version_id, "reason": reason }),
        )
    }

    pub fn document_deleted(tenant_id: Uuid, document_id: Uuid) -> Event {
        Self::build(
            tenant_id,
            EventType::DocumentDeleted,
            json!({ "document_id": document_id }),
        )
    }

    pub fn document_updated(tenant_id: Uuid, document_id: Uuid) -> Event {
        Self::build(
            tenant_id,
            EventType::DocumentUpdated,
            json!({ "document_id": document_id }),
        )
    }

    pub fn folder_created(tenant_id: Uuid, folder_id: Uuid) -> Event {
        Self::build(tenant_id, EventType::FolderCreated, json!({ "folder_id": folder_id }))
    }

    pub fn folder_updated(tenant_id: Uuid, folder_id: Uuid) -> Event {
        Self::build(tenant_id, EventType::FolderUpdated, json!({ "folder_id": folder_id }))
    }
}
