// docvault-core/src/engine/webhook_dispatcher.rs
// C11 Webhook Dispatcher: matches events to subscribers, signs with
// HMAC-SHA256, delivers with exponential backoff, and is idempotent at the
// (webhook_id, event_id) delivery-id level (spec section 4.8). Deliveries
// for a single (webhook, event) pair are serialized by construction — the
// dispatcher only ever has one in-flight POST per pair because it looks up
// (and re-persists) the existing delivery row before sending another.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::domain::{
    next_backoff_state, validate_webhook, Capability, DeliveryStatus, Event, EventType, Webhook, WebhookDelivery,
    WebhookStatus,
};
use crate::error::CoreResult;
use crate::ports::metadata_store::MetadataStorePort;
use crate::scope::TenantScope;
use crate::telemetry::request_span;

type HmacSha256 = Hmac<Sha256>;

fn backoff_for(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let scaled = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    scaled.min(cap)
}

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub struct WebhookDispatcher {
    store: Arc<dyn MetadataStorePort>,
    http: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<dyn MetadataStorePort>, config: WebhookConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.delivery_timeout)
            .build()
            .expect("reqwest client builds with static config");
        Self { store, http, config }
    }

    /// Engine-side contract backing webhook registration: validates the url,
    /// event type set, and secret key before the row ever reaches the store,
    /// so an invalid subscription can never be persisted through this path.
    pub async fn register_webhook(
        &self,
        scope: &TenantScope,
        url: String,
        event_types: Vec<EventType>,
        secret_key: String,
    ) -> CoreResult<Webhook> {
        let span = request_span(scope.tenant_id, scope.user_id, "register_webhook");
        async move {
            scope.require_capability(Capability::Admin)?;
            validate_webhook(&url, &event_types, &secret_key)?;
            let webhook = Webhook {
                id: Uuid::new_v4(),
                tenant_id: scope.tenant_id,
                url,
                event_types,
                secret_key,
                status: WebhookStatus::Active,
                failure_count: 0,
                last_failure_time: None,
            };
            self.store.insert_webhook(webhook.clone()).await?;
            Ok(webhook)
        }
        .instrument(span)
        .await
    }

    /// Re-validates the full set of mutable fields on every update, not just
    /// the ones that changed, since the store has no partial-update primitive.
    pub async fn update_webhook(
        &self,
        scope: &TenantScope,
        webhook_id: Uuid,
        url: String,
        event_types: Vec<EventType>,
        secret_key: String,
    ) -> CoreResult<Webhook> {
        let span = request_span(scope.tenant_id, scope.user_id, "update_webhook");
        async move {
            scope.require_capability(Capability::Admin)?;
            validate_webhook(&url, &event_types, &secret_key)?;
            let mut webhook = self.store.get_webhook(webhook_id, scope.tenant_id).await?;
            scope.check_tenant(webhook.tenant_id)?;
            webhook.url = url;
            webhook.event_types = event_types;
            webhook.secret_key = secret_key;
            self.store.update_webhook(webhook.clone()).await?;
            Ok(webhook)
        }
        .instrument(span)
        .await
    }

    /// Drains up to `batch_size` pending events and fans each out to every
    /// active webhook subscribed to its type within the same tenant.
    /// Returns the number of events processed.
    pub async fn dispatch_pending(&self, batch_size: u32) -> CoreResult<usize> {
        let span = request_span(Uuid::nil(), Uuid::nil(), "dispatch_pending");
        async move {
            let events = self.store.list_pending_events(batch_size).await?;
            for event in &events {
                let webhooks = self
                    .store
                    .list_active_webhooks_for_event(event.tenant_id, event.event_type)
                    .await?;
                for webhook in webhooks {
                    if let Err(err) = self.deliver(webhook.clone(), event).await {
                        tracing::warn!(webhook_id = %webhook.id, event_id = %event.id, error = %err, "webhook delivery attempt failed");
                    }
                }
            }
            Ok(events.len())
        }
        .instrument(span)
        .await
    }

    async fn deliver(&self, mut webhook: Webhook, event: &Event) -> CoreResult<()> {
        if webhook.status != WebhookStatus::Active {
            return Ok(());
        }

        let existing = self.store.find_delivery(webhook.id, event.id).await?;
        let (mut delivery, is_new) = match existing {
            Some(d) if d.status == DeliveryStatus::Success => return Ok(()),
            Some(d) if d.status == DeliveryStatus::Failed && d.attempt_count >= self.config.max_attempts => {
                return Ok(());
            }
            Some(d) => {
                let due_at = d.updated_at + chrono::Duration::from_std(backoff_for(d.attempt_count, self.config.backoff_base, self.config.backoff_cap)).unwrap_or_default();
                if Utc::now() < due_at {
                    return Ok(());
                }
                (d, false)
            }
            None => (
                WebhookDelivery {
                    id: Uuid::new_v4(),
                    webhook_id: webhook.id,
                    event_id: event.id,
                    status: DeliveryStatus::Pending,
                    attempt_count: 0,
                    response_status: None,
                    response_body: None,
                    error_message: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                    completed_at: None,
                },
                true,
            ),
        };

        let body = json!({
            "id": event.id,
            "type": event.event_type.as_str(),
            "tenant_id": event.tenant_id,
            "occurred_at": event.occurred_at,
            "data": event.payload,
        });
        let body_bytes = serde_json::to_vec(&body).map_err(|e| crate::error::CoreError::dependency("webhook_serialize", e))?;
        let signature = sign(&webhook.secret_key, &body_bytes);

        delivery.attempt_count += 1;
        delivery.updated_at = Utc::now();

        let send_result = self
            .http
            .post(&webhook.url)
            .header("Content-Type", "application/json")
            .header("X-DM-Event-Id", event.id.to_string())
            .header("X-DM-Event-Type", event.event_type.as_str())
            .header("X-DM-Delivery-Id", delivery.id.to_string())
            .header("X-DM-Timestamp", Utc::now().to_rfc3339())
            .header("X-DM-Signature", signature)
            .body(body_bytes)
            .send()
            .await;

        match send_result {
            Ok(response) if response.status().is_success() => {
                delivery.status = DeliveryStatus::Success;
                delivery.response_status = Some(response.status().as_u16());
                delivery.completed_at = Some(Utc::now());
                webhook.failure_count = 0;
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                self.record_failure(&mut delivery, &mut webhook, Some(status), Some(text), None);
            }
            Err(err) => {
                self.record_failure(&mut delivery, &mut webhook, None, None, Some(err.to_string()));
            }
        }

        if is_new {
            self.store.insert_delivery(delivery).await?;
        } else {
            self.store.update_delivery(delivery).await?;
        }
        self.store.update_webhook(webhook).await?;
        Ok(())
    }

    fn record_failure(
        &self,
        delivery: &mut WebhookDelivery,
        webhook: &mut Webhook,
        response_status: Option<u16>,
        response_body: Option<String>,
        error_message: Option<String>,
    ) {
        delivery.status = DeliveryStatus::Failed;
        delivery.response_status = response_status;
        delivery.response_body = response_body;
        delivery.error_message = error_message;

        if delivery.attempt_count >= self.config.max_attempts {
            delivery.completed_at = Some(Utc::now());
            webhook.failure_count += 1;
            webhook.last_failure_time = Some(Utc::now());
            let (status, _) = next_backoff_state(webhook.failure_count, self.config.failure_threshold);
            webhook.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_growth() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(300);
        assert_eq!(backoff_for(0, base, cap), Duration::from_secs(1));
        assert_eq!(backoff_for(3, base, cap), Duration::from_secs(8));
        assert_eq!(backoff_for(20, base, cap), cap);
    }

    #[test]
    fn signature_is_deterministic_hex() {
        let sig1 = sign("secret", b"body");
        let sig2 = sign("secret", b"body");
        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), 64);
        assert!(sig1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    fn fresh_delivery(attempt_count: u32) -> WebhookDelivery {
        let now = Utc::now();
        WebhookDelivery {
            id: Uuid::new_v4(),
            webhook_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            status: DeliveryStatus::Pending,
            attempt_count,
            response_status: None,
            response_body: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Spec section 4.8 / property 6: a webhook reaching 10 consecutive
    /// retries-exhausted deliveries auto-deactivates and stops accepting
    /// further deliveries.
    #[test]
    fn ten_consecutive_exhausted_deliveries_deactivate_webhook() {
        let store = Arc::new(crate::testing::InMemoryMetadataStore::new());
        let config = WebhookConfig::default();
        let dispatcher = WebhookDispatcher::new(store, config.clone());

        let mut webhook = Webhook {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            url: "https://example.invalid/hook".to_string(),
            event_types: vec![EventType::DocumentAvailable],
            secret_key: "s3cret".to_string(),
            status: WebhookStatus::Active,
            failure_count: 0,
            last_failure_time: None,
        };

        for n in 1..=config.failure_threshold {
            let mut delivery = fresh_delivery(config.max_attempts);
            dispatcher.record_failure(&mut delivery, &mut webhook, Some(500), Some("error".to_string()), None);
            assert_eq!(delivery.status, DeliveryStatus::Failed);
            if n < config.failure_threshold {
                assert_eq!(webhook.status, WebhookStatus::Active, "should stay active before the threshold");
            }
        }

        assert_eq!(webhook.status, WebhookStatus::Inactive);
        assert_eq!(webhook.failure_count, config.failure_threshold);
    }

    /// A delivery that hasn't exhausted its own retries yet must not count
    /// toward the webhook's consecutive-failure total.
    #[test]
    fn failure_below_max_attempts_does_not_increment_webhook_failure_count() {
        let store = Arc::new(crate::testing::InMemoryMetadataStore::new());
        let config = WebhookConfig::default();
        let dispatcher = WebhookDispatcher::new(store, config.clone());
        let mut webhook = Webhook {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            url: "https://example.invalid/hook".to_string(),
            event_types: vec![EventType::DocumentAvailable],
            secret_key: "s3cret".to_string(),
            status: WebhookStatus::Active,
            failure_count: 0,
            last_failure_time: None,
        };
        let mut delivery = fresh_delivery(config.max_attempts - 1);
        dispatcher.record_failure(&mut delivery, &mut webhook, Some(500), Some("error".to_string()), None);
        assert_eq!(webhook.failure_count, 0);
        assert_eq!(webhook.status, WebhookStatus::Active);
    }
}
