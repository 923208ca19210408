// docvault-core/src/error.rs
// Error taxonomy for the document lifecycle engine.
//
// Kinds map 1:1 onto the API's error taxonomy; callers match on variant, never on
// message text. Backend errors (sqlx, redis, reqwest) convert in via `From`
// so `?` propagates end to end without losing the causal chain, while the
// public-facing variants never carry the backend's own error string.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: missing or invalid scope")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limit exceeded for {key}: retry after {retry_after_secs}s")]
    RateLimitExceeded { key: String, retry_after_secs: u64 },

    #[error("dependency failure in {component}: {source}")]
    DependencyFailure {
        component: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("internal error")]
    Internal,
}

impl CoreError {
    pub fn dependency(component: &'static str, source: impl Into<anyhow::Error>) -> Self {
        CoreError::DependencyFailure {
            component,
            source: source.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        CoreError::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }

    /// HTTP status the pinned REST surface should map this to. The engine
    /// never produces an HTTP response itself; this is a convenience for the
    /// (out of scope) router to consult.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::Unauthorized => 401,
            CoreError::Forbidden(_) => 403,
            CoreError::NotFound => 404,
            CoreError::Conflict(_) => 409,
            CoreError::RateLimitExceeded { .. } => 429,
            CoreError::DependencyFailure { .. } => 502,
            CoreError::Internal => 500,
        }
    }
}

#[cfg(feature = "postgres-store")]
impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => CoreError::NotFound,
            other => CoreError::dependency("postgres", other),
        }
    }
}

#[cfg(feature = "redis-store")]
impl From<redis::RedisError> for CoreError {
    fn from(e: redis::RedisError) -> Self {
        CoreError::dependency("redis", e)
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::dependency("http_client", e)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::dependency("io", e)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
