use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Attorney,
    Paralegal,
    Staff,
    ReadOnly,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "attorney" => Some(Role::Attorney),
            "paralegal" => Some(Role::Paralegal),
            "staff" => Some(Role::Staff),
            "read_only" => Some(Role::ReadOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Attorney => "attorney",
            Role::Paralegal => "paralegal",
            Role::Staff => "staff",
            Role::ReadOnly => "read_only",
        }
    }

    pub fn default_permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Admin => Permission::ALL,
            Role::Attorney => &[
                FirmRead, UsersRead, ClientsRead, ClientsWrite, CasesRead, CasesWrite, TasksRead,
                TasksWrite, AttachmentsRead, AttachmentsWrite, AuditRead, RecordsViewDeleted,
                RecordsRestore,
            ],
            Role::Paralegal => &[
                FirmRead, UsersRead, ClientsRead, ClientsWrite, CasesRead, CasesWrite, TasksRead,
                TasksWrite, AttachmentsRead, AttachmentsWrite,
            ],
            Role::Staff => &[
                FirmRead, UsersRead, ClientsRead, CasesRead, TasksRead, TasksWrite, AttachmentsRead,
            ],
            Role::ReadOnly => &[FirmRead, ClientsRead, CasesRead, TasksRead, AttachmentsRead],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    FirmRead,
    FirmManage,
    UsersRead,
    UsersManage,
    ClientsRead,
    ClientsWrite,
    CasesRead,
    CasesWrite,
    TasksRead,
    TasksWrite,
    AttachmentsRead,
    AttachmentsWrite,
    AuditRead,
    RecordsViewDeleted,
    RecordsRestore,
    RecordsPurge,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Permission::FirmRead,
        Permission::FirmManage,
        Permission::UsersRead,
        Permission::UsersManage,
        Permission::ClientsRead,
        Permission::ClientsWrite,
        Permission::CasesRead,
        Permission::CasesWrite,
        Permission::TasksRead,
        Permission::TasksWrite,
        Permission::AttachmentsRead,
        Permission::AttachmentsWrite,
        Permission::AuditRead,
        Permission::RecordsViewDeleted,
        Permission::RecordsRestore,
        Permission::RecordsPurge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::FirmRead => "firm:read",
            Permission::FirmManage => "firm:manage",
            Permission::UsersRead => "users:read",
            Permission::UsersManage => "users:manage",
            Permission::ClientsRead => "clients:read",
            Permission::ClientsWrite => "clients:write",
            Permission::CasesRead => "cases:read",
            Permission::CasesWrite => "cases:write",
            Permission::TasksRead => "tasks:read",
            Permission::TasksWrite => "tasks:write",
            Permission::AttachmentsRead => "attachments:read",
            Permission::AttachmentsWrite => "attachments:write",
            Permission::AuditRead => "audit:read",
            Permission::RecordsViewDeleted => "records:view_deleted",
            Permission::RecordsRestore => "records:restore",
            Permission::RecordsPurge => "records:purge",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Permission::ALL.iter().copied().find(|p| p.as_str() == value)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Effective permissions of the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn all() -> Self {
        Self(Permission::ALL.iter().copied().collect())
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.has(permission) {
            Ok(())
        } else {
            tracing::warn!("Permission denied: missing {}", permission);
            Err(ApiError::forbidden(format!("Missing permission: {}", permission)))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }
}

/// Role defaults, plus grants, minus revokes. SuperAdmins get everything.
pub fn resolve_permissions(role: Role, grants: &[String], revokes: &[String], super_admin: bool) -> PermissionSet {
    if super_admin {
        return PermissionSet::all();
    }

    let mut set: BTreeSet<Permission> = role.default_permissions().iter().copied().collect();
    for grant in grants {
        match Permission::parse(grant) {
            Some(p) => {
                set.insert(p);
            }
            None => tracing::warn!("Ignoring unknown permission grant '{}'", grant),
        }
    }
    for revoke in revokes {
        match Permission::parse(revoke) {
            Some(p) => {
                set.remove(&p);
            }
            None => tracing::warn!("Ignoring unknown permission revoke '{}'", revoke),
        }
    }
    PermissionSet(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn admin_defaults_cover_everything() {
        let set = resolve_permissions(Role::Admin, &[], &[], false);
        assert_eq!(set, PermissionSet::all());
    }

    #[test]
    fn grants_add_and_revokes_remove() {
        let set = resolve_permissions(
            Role::Staff,
            &strings(&["cases:write", "bogus:perm"]),
            &strings(&["tasks:write"]),
            false,
        );
        assert!(set.has(Permission::CasesWrite));
        assert!(!set.has(Permission::TasksWrite));
        assert!(set.has(Permission::TasksRead));
    }

    #[test]
    fn revoke_wins_over_grant() {
        let set = resolve_permissions(
            Role::ReadOnly,
            &strings(&["clients:write"]),
            &strings(&["clients:write"]),
            false,
        );
        assert!(!set.has(Permission::ClientsWrite));
    }

    #[test]
    fn superadmin_ignores_revokes() {
        let set = resolve_permissions(Role::ReadOnly, &[], &strings(&["records:purge"]), true);
        assert!(set.has(Permission::RecordsPurge));
    }

    #[test]
    fn require_names_missing_permission() {
        let set = resolve_permissions(Role::ReadOnly, &[], &[], false);
        let err = set.require(Permission::AuditRead).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert!(err.message().contains("audit:read"));
    }

    #[test]
    fn role_strings_round_trip() {
        for role in [Role::Admin, Role::Attorney, Role::Paralegal, Role::Staff, Role::ReadOnly] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("owner"), None);
    }
}
