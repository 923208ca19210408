// docvault-core/src/stores/redis/scan_queue.rs
// ScanQueuePort over Redis lists: `dequeue` claims a task by moving it
// atomically from the pending list to a processing list (BRPOPLPUSH), so a
// worker that dies mid-scan leaves the task visible there rather than
// silently dropped. `complete` removes the claim; `retry`/`dead_letter`
// remove the claim and route the task onward. retry_count lives on the
// task itself, never in a separate counter key, so it survives a crash
// exactly as the port's contract requires.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{CoreError, CoreResult};
use crate::ports::scan_queue::{ScanQueuePort, ScanTask};

const PENDING_KEY: &str = "docvault:scan:pending";
const PROCESSING_KEY: &str = "docvault:scan:processing";
const DEAD_LETTER_KEY: &str = "docvault:scan:dead_letter";

pub struct RedisScanQueue {
    conn: ConnectionManager,
    poll_timeout_secs: f64,
}

impl RedisScanQueue {
    pub async fn connect(url: &str, poll_timeout: std::time::Duration) -> CoreResult<Self> {
        let client = redis::Client::open(url).map_err(CoreError::from)?;
        let conn = ConnectionManager::new(client).await.map_err(CoreError::from)?;
        Ok(Self {
            conn,
            poll_timeout_secs: poll_timeout.as_secs_f64().max(0.1),
        })
    }

    fn encode(task: &ScanTask) -> CoreResult<String> {
        serde_json::to_string(task).map_err(|e| CoreError::dependency("redis", e))
    }

    fn decode(raw: &str) -> CoreResult<ScanTask> {
        serde_json::from_str(raw).map_err(|e| CoreError::dependency("redis", e))
    }
}

#[async_trait]
impl ScanQueuePort for RedisScanQueue {
    async fn enqueue(&self, task: ScanTask) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let payload = Self::encode(&task)?;
        let _: () = conn.lpush(PENDING_KEY, payload).await.map_err(CoreError::from)?;
        Ok(())
    }

    async fn dequeue(&self) -> CoreResult<Option<ScanTask>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .brpoplpush(PENDING_KEY, PROCESSING_KEY, self.poll_timeout_secs)
            .await
            .map_err(CoreError::from)?;
        raw.as_deref().map(Self::decode).transpose()
    }

    async fn complete(&self, task: &ScanTask) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let payload = Self::encode(task)?;
        let _: () = conn.lrem(PROCESSING_KEY, 1, payload).await.map_err(CoreError::from)?;
        Ok(())
    }

    async fn retry(&self, task: ScanTask) -> CoreResult<()> {
        // Callers bump `retry_count` before calling `retry`, so the entry
        // still claimed in the processing list has the prior count.
        let mut conn = self.conn.clone();
        let stale_payload = Self::encode(&ScanTask { retry_count: task.retry_count.saturating_sub(1), ..task.clone() })?;
        let _: () = conn.lrem(PROCESSING_KEY, 1, &stale_payload).await.map_err(CoreError::from)?;
        let payload = Self::encode(&task)?;
        let _: () = conn.lpush(PENDING_KEY, payload).await.map_err(CoreError::from)?;
        Ok(())
    }

    async fn dead_letter(&self, task: ScanTask, reason: String) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let claimed_payload = Self::encode(&task)?;
        let _: () = conn.lrem(PROCESSING_KEY, 1, &claimed_payload).await.map_err(CoreError::from)?;
        let entry = serde_json::json!({ "task": task, "reason": reason });
        let payload = serde_json::to_string(&entry).map_err(|e| CoreError::dependency("redis", e))?;
        let _: () = conn.lpush(DEAD_LETTER_KEY, payload).await.map_err(CoreError::from)?;
        Ok(())
    }
}
