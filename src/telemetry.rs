// docvault-core/src/telemetry.rs
// tracing/tracing-subscriber initialization, and the per-request span that
// carries tenant_id/user_id so every log line downstream is enriched by the
// scope value instead of a thread-local logger.

use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use crate::config::LogFormat;
use crate::config::LoggingConfig;

pub fn init(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);
    match cfg.format {
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
        LogFormat::Pretty => {
            let _ = builder.try_init();
        }
    }
}

/// Opens a span carrying the request's tenant/user identity. Call at the top
/// of every engine entrypoint; every `tracing::event!` inside the returned
/// span's scope is automatically enriched with these fields.
pub fn request_span(tenant_id: Uuid, user_id: Uuid, operation: &'static str) -> tracing::Span {
    tracing::info_span!("request", tenant_id = %tenant_id, user_id = %user_id, operation)
}
