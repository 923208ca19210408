// docvault-core/src/scope.rs
// C1 Tenant Guard.
//
// The tenant/user/roles triple travels as an explicit value into every
// public engine method; nothing here is thread-local or global. A
// `TenantScope` is the only way to call into the engine, which makes
// "forgot to filter by tenant" a type error rather than a runtime bug.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Capability;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Reader,
    Contributor,
    Editor,
    Administrator,
    System,
}

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Reader => &[Capability::Read],
            Role::Contributor => &[Capability::Read, Capability::Write],
            Role::Editor => &[Capability::Read, Capability::Write, Capability::Delete],
            Role::Administrator => &[
                Capability::Read,
                Capability::Write,
                Capability::Delete,
                Capability::ManageFolders,
            ],
            Role::System => &[
                Capability::Read,
                Capability::Write,
                Capability::Delete,
                Capability::ManageFolders,
                Capability::Admin,
            ],
        }
    }

    pub fn grants(&self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }
}

/// The `(tenant_id, user_id, roles)` triple associated with an in-flight
/// operation. Every component's public methods take this by value or
/// reference instead of reaching for ambient/global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantScope {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub roles: Vec<Role>,
    /// The tenant-scoped `Role` row ids backing `roles`, resolved by
    /// whatever issues the credential (role names -> ids is a lookup one
    /// layer up from this core). Empty for a scope with no resource-level
    /// `Permission` grants of its own; `PermissionEvaluator` still falls
    /// back to the tenant-wide grant `roles` carries.
    pub role_ids: Vec<Uuid>,
}

impl TenantScope {
    pub fn new(tenant_id: Uuid, user_id: Uuid, roles: Vec<Role>) -> Self {
        Self {
            tenant_id,
            user_id,
            roles,
            role_ids: Vec::new(),
        }
    }

    /// Attaches the resolved tenant-role-row ids this scope's credential
    /// maps to, so `PermissionEvaluator` can match them against direct and
    /// inherited `Permission.role_id` grants.
    pub fn with_role_ids(mut self, role_ids: Vec<Uuid>) -> Self {
        self.role_ids = role_ids;
        self
    }

    /// Fails with `Unauthorized` only where the caller hasn't even produced a
    /// scope value; a present-but-wrong-tenant scope is a `Forbidden`, not an
    /// `Unauthorized`.
    pub fn require_capability(&self, cap: Capability) -> CoreResult<()> {
        if self.roles.iter().any(|r| r.grants(cap)) {
            Ok(())
        } else {
            Err(CoreError::forbidden(format!(
                "role set {:?} lacks capability {:?}",
                self.roles, cap
            )))
        }
    }

    /// Denies with `Forbidden` when a resource's tenant disagrees with the
    /// scope's tenant. Callers use this before touching the resource so the
    /// NotFound/Forbidden distinction in the error taxonomy is preserved
    /// deliberately by the caller (list/get paths prefer NotFound so
    /// existence is never leaked across tenants).
    pub fn check_tenant(&self, resource_tenant_id: Uuid) -> CoreResult<()> {
        if resource_tenant_id == self.tenant_id {
            Ok(())
        } else {
            Err(CoreError::forbidden("resource belongs to another tenant"))
        }
    }
}

/// Wraps an operation so every call site is forced to thread a scope through;
/// kept as a thin free function (rather than a method on every port) so the
/// ports themselves stay free of scope-plumbing boilerplate.
pub fn with_tenant_scope<T>(scope: &TenantScope, op: impl FnOnce(&TenantScope) -> T) -> T {
    op(scope)
}
