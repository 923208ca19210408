// docvault-core/src/engine/workers.rs
// Background loops that drive the engine without an inbound request: the
// scan worker pool pulls from the scan queue and feeds the virus scanner,
// the webhook loop drains pending events on an interval, and the
// reconciliation loop sweeps stalled `processing` documents (spec section
// 4.4's storage/DB ordering rule, section 4.6's worker pool, section 4.8's
// delivery loop). All three stop cleanly on cancellation rather than being
// killed mid-operation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::document_engine::DocumentEngine;
use crate::engine::webhook_dispatcher::WebhookDispatcher;
use crate::ports::object_store::{ObjectPath, ObjectStorePort};
use crate::ports::scan_queue::ScanQueuePort;
use crate::ports::virus_scanner::VirusScannerPort;

/// Spawns `worker_count` independent scan-queue consumers. Each dequeues one
/// task at a time, streams the object through the scanner, and hands the
/// outcome to `DocumentEngine::process_scan_callback`. A dequeue-with-no-work
/// result backs off briefly instead of busy-polling.
pub fn spawn_scan_workers(
    worker_count: usize,
    scan_queue: Arc<dyn ScanQueuePort>,
    object_store: Arc<dyn ObjectStorePort>,
    scanner: Arc<dyn VirusScannerPort>,
    engine: Arc<DocumentEngine>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..worker_count)
        .map(|worker_id| {
            let scan_queue = scan_queue.clone();
            let object_store = object_store.clone();
            let scanner = scanner.clone();
            let engine = engine.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let task = tokio::select! {
                        res = scan_queue.dequeue() => res,
                        _ = cancel.cancelled() => break,
                    };
                    let task = match task {
                        Ok(Some(task)) => task,
                        Ok(None) => {
                            tokio::time::sleep(Duration::from_millis(250)).await;
                            continue;
                        }
                        Err(err) => {
                            tracing::warn!(worker_id, error = %err, "scan queue dequeue failed");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            continue;
                        }
                    };

                    let outcome = match object_store.get(task.tenant_id, &ObjectPath(task.temp_path.clone())).await {
                        Ok(stream) => scanner.scan(stream).await,
                        Err(err) => Err(err),
                    };

                    let outcome = match outcome {
                        Ok(outcome) => outcome,
                        Err(err) => crate::ports::virus_scanner::ScanOutcome::Error {
                            message: err.to_string(),
                        },
                    };

                    if let Err(err) = engine.process_scan_callback(task.clone(), outcome, cancel.clone()).await {
                        tracing::error!(document_id = %task.document_id, error = %err, "scan callback processing failed");
                    }
                }
            })
        })
        .collect()
}

/// Drains pending webhook events on a fixed interval until cancelled.
pub fn spawn_webhook_loop(
    dispatcher: Arc<WebhookDispatcher>,
    interval: Duration,
    batch_size: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = dispatcher.dispatch_pending(batch_size).await {
                        tracing::warn!(error = %err, "webhook dispatch pass failed");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}

/// Sweeps for `processing` documents stuck past `older_than_secs` on a fixed
/// interval until cancelled.
pub fn spawn_reconciliation_loop(
    engine: Arc<DocumentEngine>,
    interval: Duration,
    older_than_secs: i64,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match engine.reconcile_stuck_processing(older_than_secs, cancel.clone()).await {
                        Ok(count) if count > 0 => tracing::info!(count, "reconciliation sweep redrove stalled documents"),
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "reconciliation sweep failed"),
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}
