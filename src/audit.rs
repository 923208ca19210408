// docvault-core/src/audit.rs
// Audit logging for permission decisions and security-relevant Forbidden
// errors: every permission decision is audit-logged, and every Forbidden
// error triggers a security-audit log entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Capability, ResourceType};
use crate::error::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub resource_type: ResourceType,
    pub resource_id: Uuid,
    pub capability: Capability,
    pub permitted: bool,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, record: AuditRecord) -> CoreResult<()>;
    async fn recent(&self, tenant_id: Uuid, limit: usize) -> CoreResult<Vec<AuditRecord>>;
}

/// In-memory ring buffer implementation: sufficient for unit/integration
/// tests and for a single-process deployment; a Postgres-backed
/// implementation would insert into an `audit_log` table with the same
/// shape and is a drop-in swap behind the `AuditLog` trait.
pub struct InMemoryAuditLog {
    capacity: usize,
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, record: AuditRecord) -> CoreResult<()> {
        let mut records = self.records.write().await;
        records.push(record);
        if records.len() > self.capacity {
            let overflow = records.len() - self.capacity;
            records.drain(0..overflow);
        }
        Ok(())
    }

    async fn recent(&self, tenant_id: Uuid, limit: usize) -> CoreResult<Vec<AuditRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_are_tenant_scoped_on_read() {
        let log = InMemoryAuditLog::new(10);
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        log.record(AuditRecord {
            id: Uuid::new_v4(),
            tenant_id: t1,
            user_id: Uuid::new_v4(),
            resource_type: ResourceType::Document,
            resource_id: Uuid::new_v4(),
            capability: Capability::Read,
            permitted: true,
            reason: "role grant".into(),
            recorded_at: Utc::now(),
        })
        .await
        .unwrap();
        assert_eq!(log.recent(t1, 10).await.unwrap().len(), 1);
        assert_eq!(log.recent(t2, 10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest() {
        let log = InMemoryAuditLog::new(2);
        let t1 = Uuid::new_v4();
        for _ in 0..5 {
            log.record(AuditRecord {
                id: Uuid::new_v4(),
                tenant_id: t1,
                user_id: Uuid::new_v4(),
                resource_type: ResourceType::Document,
                resource_id: Uuid::new_v4(),
                capability: Capability::Read,
                permitted: true,
                reason: "role grant".into(),
                recorded_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        assert_eq!(log.recent(t1, 100).await.unwrap().len(), 2);
    }
}
