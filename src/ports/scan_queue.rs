// docvault-core/src/ports/scan_queue.rs
// C6 Scan Queue: durable FIFO of scan tasks with visibility timeout, retry
// counter, and dead-letter. retry_count lives on the task, never on the
// document row, so retries can't race with terminal-state transitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTask {
    pub document_id: Uuid,
    pub version_id: Uuid,
    pub tenant_id: Uuid,
    pub temp_path: String,
    pub retry_count: u32,
}

#[async_trait]
pub trait ScanQueuePort: Send + Sync {
    async fn enqueue(&self, task: ScanTask) -> CoreResult<()>;

    /// Blocks up to the backend's long-poll interval; `None` signals an
    /// empty queue after the timeout elapses.
    async fn dequeue(&self) -> CoreResult<Option<ScanTask>>;

    async fn complete(&self, task: &ScanTask) -> CoreResult<()>;

    async fn retry(&self, task: ScanTask) -> CoreResult<()>;

    async fn dead_letter(&self, task: ScanTask, reason: String) -> CoreResult<()>;
}
