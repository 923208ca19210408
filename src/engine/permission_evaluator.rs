// docvault-core/src/engine/permission_evaluator.rs
// Permission evaluator: the five-step resolution for whether a scope's
// capability request is granted.
//
// Step 3 ("a direct permission exists for any of the user's roles") needs
// the tenant's role *rows* (Permission.role_id references a Role entity),
// while a TenantScope only carries the role *names* a credential presented.
// Resolving names to the tenant's role ids is a thin
// lookup one layer up (role service / tenant guard), so `evaluate` takes the
// caller's already-resolved `held_role_ids` rather than reaching into the
// store itself — keeps this evaluator a pure function of its inputs.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audit::{AuditLog, AuditRecord};
use crate::domain::{Capability, PermissionType, ResourceType};
use crate::error::{CoreError, CoreResult};
use crate::ports::metadata_store::MetadataStorePort;
use crate::scope::TenantScope;

fn permission_type_satisfies(granted: PermissionType, cap: Capability) -> bool {
    match cap {
        Capability::Read => granted >= PermissionType::Read,
        Capability::Write => granted >= PermissionType::Write,
        Capability::Delete => granted >= PermissionType::Delete,
        Capability::Admin => granted >= PermissionType::Admin,
        // manage_folders only makes sense on folders and is only granted by
        // an explicit Admin-level permission row.
        Capability::ManageFolders => granted == PermissionType::Admin,
    }
}

pub struct PermissionEvaluator {
    store: Arc<dyn MetadataStorePort>,
    audit: Arc<dyn AuditLog>,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<dyn MetadataStorePort>, audit: Arc<dyn AuditLog>) -> Self {
        Self { store, audit }
    }

    /// Returns `Ok(())` when permitted, `Err(CoreError::Forbidden)` otherwise.
    /// Every call is audit-logged regardless of outcome.
    pub async fn evaluate(
        &self,
        scope: &TenantScope,
        resource_type: ResourceType,
        resource_id: Uuid,
        resource_tenant_id: Uuid,
        held_role_ids: &[Uuid],
        cap: Capability,
        cancel: CancellationToken,
    ) -> CoreResult<()> {
        let (permitted, reason) = tokio::select! {
            res = self.resolve(scope, resource_type, resource_id, resource_tenant_id, held_role_ids, cap) => res,
            _ = cancel.cancelled() => return Err(CoreError::conflict("permission evaluation cancelled")),
        };

        self.audit
            .record(AuditRecord {
                id: Uuid::new_v4(),
                tenant_id: scope.tenant_id,
                user_id: scope.user_id,
                resource_type,
                resource_id,
                capability: cap,
                permitted,
                reason: reason.clone(),
                recorded_at: Utc::now(),
            })
            .await?;

        if permitted {
            Ok(())
        } else {
            Err(CoreError::forbidden(reason))
        }
    }

    async fn resolve(
        &self,
        scope: &TenantScope,
        resource_type: ResourceType,
        resource_id: Uuid,
        resource_tenant_id: Uuid,
        held_role_ids: &[Uuid],
        cap: Capability,
    ) -> (bool, String) {
        // Step 1: tenant mismatch is an unconditional deny.
        if resource_tenant_id != scope.tenant_id {
            return (false, "resource tenant does not match scope tenant".to_string());
        }

        // Step 2: any held role grants the capability tenant-wide.
        if scope.roles.iter().any(|r| r.grants(cap)) {
            return (true, "role grants capability at tenant level".to_string());
        }

        // Step 3: a direct permission on this exact resource.
        match self
            .store
            .list_permissions_for_resource(scope.tenant_id, resource_type, resource_id)
            .await
        {
            Ok(perms) => {
                if perms
                    .iter()
                    .any(|p| held_role_ids.contains(&p.role_id) && permission_type_satisfies(p.permission_type, cap))
                {
                    return (true, "direct permission on resource".to_string());
                }
            }
            Err(err) => return (false, format!("permission lookup failed: {err}")),
        }

        // Step 4: for folders, walk ancestors looking for an inherited grant.
        if resource_type == ResourceType::Folder {
            let mut current = resource_id;
            loop {
                let folder = match self.store.get_folder(current, scope.tenant_id).await {
                    Ok(f) => f,
                    Err(_) => break,
                };
                let Some(parent_id) = folder.parent_id else {
                    break;
                };
                match self
                    .store
                    .list_permissions_for_resource(scope.tenant_id, ResourceType::Folder, parent_id)
                    .await
                {
                    Ok(perms) => {
                        if perms.iter().any(|p| {
                            p.inherited
                                && held_role_ids.contains(&p.role_id)
                                && permission_type_satisfies(p.permission_type, cap)
                        }) {
                            return (true, "inherited permission from ancestor folder".to_string());
                        }
                    }
                    Err(_) => break,
                }
                current = parent_id;
            }
        }

        // Step 5.
        (false, "no role grant, direct, or inherited permission".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_type_ordering_matches_spec() {
        assert!(permission_type_satisfies(PermissionType::Admin, Capability::Delete));
        assert!(!permission_type_satisfies(PermissionType::Read, Capability::Write));
        assert!(permission_type_satisfies(PermissionType::Admin, Capability::ManageFolders));
        assert!(!permission_type_satisfies(PermissionType::Delete, Capability::ManageFolders));
    }
}
