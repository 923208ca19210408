// docvault-core/src/domain.rs
// Core entities plus the validation functions every store
// write runs through before it touches a backend. Kept free of any
// backend-specific trait impls (those live in stores::*::conversions).

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

pub const MAX_DOCUMENT_SIZE_BYTES: i64 = 100 * 1024 * 1024;
pub const MAX_METADATA_ENTRIES: usize = 50;
pub const MAX_METADATA_KEY_LEN: usize = 64;
pub const MAX_METADATA_VALUE_LEN: usize = 1024;
pub const MAX_WEBHOOK_URL_LEN: usize = 2048;
pub const MAX_WEBHOOK_SECRET_LEN: usize = 256;
pub const MIN_WEBHOOK_EVENT_TYPES: usize = 1;
pub const MAX_WEBHOOK_EVENT_TYPES: usize = 20;
pub const WEBHOOK_FAILURE_THRESHOLD: u32 = 10;
pub const DEFAULT_SCAN_MAX_RETRIES: u32 = 3;

fn forbidden_name_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\\/:*?"<>|]"#).unwrap())
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    Read,
    Write,
    Delete,
    ManageFolders,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TenantStatus {
    Active,
    Suspended,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub status: TenantStatus,
    pub settings: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn validate_username(username: &str) -> CoreResult<()> {
    if username.chars().count() < 3 {
        return Err(CoreError::validation("username must be at least 3 characters"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> CoreResult<()> {
    if !email_regex().is_match(email) {
        return Err(CoreError::validation("email is not a valid address"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> CoreResult<()> {
    if password.len() < 8 {
        return Err(CoreError::validation("password must be at least 8 characters"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub path: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentStatus {
    Processing,
    Available,
    Quarantined,
    Failed,
    Deleted,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Available
                | DocumentStatus::Quarantined
                | DocumentStatus::Failed
                | DocumentStatus::Deleted
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub folder_id: Uuid,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub owner_id: Uuid,
    pub status: DocumentStatus,
    pub current_version_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_number: i64,
    pub size: i64,
    pub content_hash: String,
    pub status: DocumentStatus,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub id: Uuid,
    pub document_id: Uuid,
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResourceType {
    Document,
    Folder,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum PermissionType {
    Read,
    Write,
    Delete,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub role_id: Uuid,
    pub resource_type: ResourceType,
    pub resource_id: Uuid,
    pub permission_type: PermissionType,
    pub inherited: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WebhookStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    DocumentUploaded,
    DocumentAvailable,
    DocumentQuarantined,
    DocumentProcessingFailed,
    DocumentDownloaded,
    DocumentDeleted,
    DocumentUpdated,
    FolderCreated,
    FolderUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DocumentUploaded => "document.uploaded",
            EventType::DocumentAvailable => "document.available",
            EventType::DocumentQuarantined => "document.quarantined",
            EventType::DocumentProcessingFailed => "document.processing_failed",
            EventType::DocumentDownloaded => "document.downloaded",
            EventType::DocumentDeleted => "document.deleted",
            EventType::DocumentUpdated => "document.updated",
            EventType::FolderCreated => "folder.created",
            EventType::FolderUpdated => "folder.updated",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document.uploaded" => Ok(EventType::DocumentUploaded),
            "document.available" => Ok(EventType::DocumentAvailable),
            "document.quarantined" => Ok(EventType::DocumentQuarantined),
            "document.processing_failed" => Ok(EventType::DocumentProcessingFailed),
            "document.downloaded" => Ok(EventType::DocumentDownloaded),
            "document.deleted" => Ok(EventType::DocumentDeleted),
            "document.updated" => Ok(EventType::DocumentUpdated),
            "folder.created" => Ok(EventType::FolderCreated),
            "folder.updated" => Ok(EventType::FolderUpdated),
            other => Err(CoreError::validation(format!("unknown event type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub url: String,
    pub event_types: Vec<EventType>,
    pub secret_key: String,
    pub status: WebhookStatus,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Validation functions, invoked before any store write.
// ---------------------------------------------------------------------

pub fn validate_document_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::validation("document name must not be empty"));
    }
    if forbidden_name_chars().is_match(name) {
        return Err(CoreError::validation(
            r#"document name must not contain \/:*?"<>|"#,
        ));
    }
    Ok(())
}

pub fn validate_document_size(size: i64) -> CoreResult<()> {
    if size <= 0 {
        return Err(CoreError::validation("document size must be greater than zero"));
    }
    if size > MAX_DOCUMENT_SIZE_BYTES {
        return Err(CoreError::validation("document exceeds 100 MiB limit"));
    }
    Ok(())
}

pub fn validate_metadata_entries(entries: &[(String, String)]) -> CoreResult<()> {
    if entries.len() > MAX_METADATA_ENTRIES {
        return Err(CoreError::validation("at most 50 metadata entries are allowed"));
    }
    for (key, value) in entries {
        if key.is_empty() || key.chars().count() > MAX_METADATA_KEY_LEN {
            return Err(CoreError::validation(
                "metadata key must be non-empty and at most 64 characters",
            ));
        }
        if value.chars().count() > MAX_METADATA_VALUE_LEN {
            return Err(CoreError::validation("metadata value must be at most 1024 characters"));
        }
    }
    Ok(())
}

pub fn validate_folder_name(name: &str) -> CoreResult<()> {
    if name.trim().is_empty() {
        return Err(CoreError::validation("folder name must not be empty"));
    }
    if name.contains('/') {
        return Err(CoreError::validation("folder name must not contain '/'"));
    }
    Ok(())
}

pub fn validate_webhook(url: &str, event_types: &[EventType], secret_key: &str) -> CoreResult<()> {
    let parsed = url::Url::parse(url).map_err(|_| CoreError::validation("webhook url is not valid"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(CoreError::validation("webhook url must be http or https"));
    }
    if url.len() > MAX_WEBHOOK_URL_LEN {
        return Err(CoreError::validation("webhook url exceeds 2048 characters"));
    }
    if event_types.is_empty() || event_types.len() > MAX_WEBHOOK_EVENT_TYPES {
        return Err(CoreError::validation(
            "webhook must subscribe to between 1 and 20 event types",
        ));
    }
    if secret_key.is_empty() || secret_key.len() > MAX_WEBHOOK_SECRET_LEN {
        return Err(CoreError::validation(
            "webhook secret key must be non-empty and at most 256 characters",
        ));
    }
    Ok(())
}

pub fn next_backoff_state(consecutive_failures: u32, failure_threshold: u32) -> (WebhookStatus, u32) {
    if consecutive_failures >= failure_threshold {
        (WebhookStatus::Inactive, consecutive_failures)
    } else {
        (WebhookStatus::Active, consecutive_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_forbidden_name_chars() {
        assert!(validate_document_name("report*.pdf").is_err());
        assert!(validate_document_name("report.pdf").is_ok());
    }

    #[test]
    fn rejects_oversize_document() {
        assert!(validate_document_size(0).is_err());
        assert!(validate_document_size(MAX_DOCUMENT_SIZE_BYTES + 1).is_err());
        assert!(validate_document_size(MAX_DOCUMENT_SIZE_BYTES).is_ok());
    }

    #[test]
    fn caps_metadata_entries() {
        let entries: Vec<(String, String)> = (0..51).map(|i| (format!("k{i}"), "v".to_string())).collect();
        assert!(validate_metadata_entries(&entries).is_err());
    }

    #[test]
    fn webhook_requires_http_scheme() {
        assert!(validate_webhook("ftp://x.example", &[EventType::DocumentUploaded], "s").is_err());
        assert!(validate_webhook("https://x.example/hook", &[EventType::DocumentUploaded], "s").is_ok());
    }

    #[test]
    fn ten_consecutive_failures_deactivates() {
        let (status, _) = next_backoff_state(10, WEBHOOK_FAILURE_THRESHOLD);
        assert_eq!(status, WebhookStatus::Inactive);
        let (status, _) = next_backoff_state(9, WEBHOOK_FAILURE_THRESHOLD);
        assert_eq!(status, WebhookStatus::Active);
    }
}
