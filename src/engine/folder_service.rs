// docvault-core/src/engine/folder_service.rs
// (SUPPLEMENT) Folder service: spec section 3 describes folder move/rename
// subtree path rewriting but doesn't give it its own component letter. Create
// is exempt from the `MetadataTransaction` outbox (folders have no
// transactional insert path in `MetadataStorePort`), so `folder.created`/
// `folder.updated` go out best-effort after the write commits, same as the
// document engine's upload/download emissions.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::{validate_folder_name, Capability, Folder, ResourceType, TenantStatus};
use crate::engine::event_bus::EventBus;
use crate::engine::permission_evaluator::PermissionEvaluator;
use crate::error::{CoreError, CoreResult};
use crate::ports::metadata_store::{resolve_tenant_status, MetadataStorePort};
use crate::scope::TenantScope;
use crate::telemetry::request_span;

pub struct FolderService {
    store: Arc<dyn MetadataStorePort>,
    events: Arc<EventBus>,
    permissions: Arc<PermissionEvaluator>,
}

fn join_path(parent_path: &str, name: &str) -> String {
    if parent_path == "/" {
        format!("/{name}")
    } else {
        format!("{parent_path}/{name}")
    }
}

/// True when `candidate_path` names `ancestor_path` itself or something
/// inside it -- used to reject moving a folder into its own subtree.
fn is_same_or_descendant(candidate_path: &str, ancestor_path: &str) -> bool {
    candidate_path == ancestor_path || candidate_path.starts_with(&format!("{ancestor_path}/"))
}

impl FolderService {
    pub fn new(store: Arc<dyn MetadataStorePort>, events: Arc<EventBus>, permissions: Arc<PermissionEvaluator>) -> Self {
        Self {
            store,
            events,
            permissions,
        }
    }

    async fn require_writable_tenant(&self, tenant_id: Uuid) -> CoreResult<()> {
        match resolve_tenant_status(self.store.as_ref(), tenant_id).await {
            TenantStatus::Inactive => Err(CoreError::NotFound),
            TenantStatus::Suspended => Err(CoreError::forbidden("tenant is suspended; folder mutations are disabled")),
            TenantStatus::Active => Ok(()),
        }
    }

    /// Provisions the single root folder for a tenant. Callers must ensure
    /// this runs at most once per tenant; the port has no "upsert root"
    /// primitive because the invariant is "exactly one ever", not "exactly
    /// one, idempotently re-creatable".
    pub async fn create_root(&self, tenant_id: Uuid, owner_id: Uuid, cancel: CancellationToken) -> CoreResult<Folder> {
        let span = request_span(tenant_id, owner_id, "create_root");
        async move {
            let now = Utc::now();
            let folder = Folder {
                id: Uuid::new_v4(),
                tenant_id,
                parent_id: None,
                name: "root".to_string(),
                path: "/".to_string(),
                owner_id,
                created_at: now,
                updated_at: now,
            };
            tokio::select! {
                res = self.store.insert_folder(folder.clone()) => res?,
                _ = cancel.cancelled() => return Err(CoreError::conflict("operation cancelled")),
            };
            Ok(folder)
        }
        .instrument(span)
        .await
    }

    pub async fn create_folder(
        &self,
        scope: &TenantScope,
        parent_id: Uuid,
        name: &str,
        cancel: CancellationToken,
    ) -> CoreResult<Folder> {
        let span = request_span(scope.tenant_id, scope.user_id, "create_folder");
        async move {
            validate_folder_name(name)?;
            let parent = self.store.get_folder(parent_id, scope.tenant_id).await?;
            scope.check_tenant(parent.tenant_id)?;
            self.permissions
                .evaluate(
                    scope,
                    ResourceType::Folder,
                    parent_id,
                    parent.tenant_id,
                    &scope.role_ids,
                    Capability::ManageFolders,
                    cancel.clone(),
                )
                .await?;
            self.require_writable_tenant(scope.tenant_id).await?;

            let now = Utc::now();
            let folder = Folder {
                id: Uuid::new_v4(),
                tenant_id: scope.tenant_id,
                parent_id: Some(parent_id),
                name: name.to_string(),
                path: join_path(&parent.path, name),
                owner_id: scope.user_id,
                created_at: now,
                updated_at: now,
            };
            tokio::select! {
                res = self.store.insert_folder(folder.clone()) => res?,
                _ = cancel.cancelled() => return Err(CoreError::conflict("operation cancelled")),
            };
            self.events
                .publish_best_effort(EventBus::folder_created(scope.tenant_id, folder.id), CancellationToken::new())
                .await;
            Ok(folder)
        }
        .instrument(span)
        .await
    }

    pub async fn rename_folder(
        &self,
        scope: &TenantScope,
        folder_id: Uuid,
        new_name: &str,
        cancel: CancellationToken,
    ) -> CoreResult<()> {
        let span = request_span(scope.tenant_id, scope.user_id, "rename_folder");
        async move {
            validate_folder_name(new_name)?;
            let folder = self.store.get_folder(folder_id, scope.tenant_id).await?;
            scope.check_tenant(folder.tenant_id)?;
            self.permissions
                .evaluate(
                    scope,
                    ResourceType::Folder,
                    folder_id,
                    folder.tenant_id,
                    &scope.role_ids,
                    Capability::ManageFolders,
                    cancel.clone(),
                )
                .await?;
            self.require_writable_tenant(scope.tenant_id).await?;
            let Some(parent_id) = folder.parent_id else {
                return Err(CoreError::conflict("the root folder cannot be renamed"));
            };
            let parent = self.store.get_folder(parent_id, scope.tenant_id).await?;
            let new_path = join_path(&parent.path, new_name);
            tokio::select! {
                res = self.store.rewrite_subtree_paths(folder_id, scope.tenant_id, parent_id, new_path) => res?,
                _ = cancel.cancelled() => return Err(CoreError::conflict("rename cancelled")),
            };
            self.events
                .publish_best_effort(EventBus::folder_updated(scope.tenant_id, folder_id), CancellationToken::new())
                .await;
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub async fn move_folder(
        &self,
        scope: &TenantScope,
        folder_id: Uuid,
        new_parent_id: Uuid,
        cancel: CancellationToken,
    ) -> CoreResult<()> {
        let span = request_span(scope.tenant_id, scope.user_id, "move_folder");
        async move {
            let folder = self.store.get_folder(folder_id, scope.tenant_id).await?;
            scope.check_tenant(folder.tenant_id)?;
            self.permissions
                .evaluate(
                    scope,
                    ResourceType::Folder,
                    folder_id,
                    folder.tenant_id,
                    &scope.role_ids,
                    Capability::ManageFolders,
                    cancel.clone(),
                )
                .await?;
            self.require_writable_tenant(scope.tenant_id).await?;
            if folder.parent_id.is_none() {
                return Err(CoreError::conflict("the root folder cannot be moved"));
            }
            if new_parent_id == folder_id {
                return Err(CoreError::validation("a folder cannot be moved into itself"));
            }
            let new_parent = self.store.get_folder(new_parent_id, scope.tenant_id).await?;
            scope.check_tenant(new_parent.tenant_id)?;
            if is_same_or_descendant(&new_parent.path, &folder.path) {
                return Err(CoreError::validation(
                    "a folder cannot be moved into one of its own descendants",
                ));
            }

            let new_path = join_path(&new_parent.path, &folder.name);
            tokio::select! {
                res = self.store.rewrite_subtree_paths(folder_id, scope.tenant_id, new_parent_id, new_path) => res?,
                _ = cancel.cancelled() => return Err(CoreError::conflict("move cancelled")),
            };
            self.events
                .publish_best_effort(EventBus::folder_updated(scope.tenant_id, folder_id), CancellationToken::new())
                .await;
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub async fn list_children(&self, scope: &TenantScope, folder_id: Uuid, cancel: CancellationToken) -> CoreResult<Vec<Folder>> {
        let span = request_span(scope.tenant_id, scope.user_id, "list_children");
        async move {
            if resolve_tenant_status(self.store.as_ref(), scope.tenant_id).await == TenantStatus::Inactive {
                return Err(CoreError::NotFound);
            }
            let folder = self.store.get_folder(folder_id, scope.tenant_id).await?;
            scope.check_tenant(folder.tenant_id)?;
            self.permissions
                .evaluate(
                    scope,
                    ResourceType::Folder,
                    folder_id,
                    folder.tenant_id,
                    &scope.role_ids,
                    Capability::Read,
                    cancel.clone(),
                )
                .await?;
            tokio::select! {
                res = self.store.list_folder_children(folder_id, scope.tenant_id) => res,
                _ = cancel.cancelled() => Err(CoreError::conflict("operation cancelled")),
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_root_path_without_double_slash() {
        assert_eq!(join_path("/", "docs"), "/docs");
        assert_eq!(join_path("/docs", "2024"), "/docs/2024");
    }

    #[test]
    fn detects_descendant_paths() {
        assert!(is_same_or_descendant("/docs", "/docs"));
        assert!(is_same_or_descendant("/docs/2024", "/docs"));
        assert!(!is_same_or_descendant("/other", "/docs"));
        assert!(!is_same_or_descendant("/docs-2", "/docs"));
    }
}
