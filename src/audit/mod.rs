use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::{Changeset, DatabaseError};
use crate::database::query_builder::execute;

const IGNORED_FIELDS: &[&str] = &["updated_at"];
const SECRET_FIELDS: &[&str] = &["password_hash"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Restore,
    Purge,
    Login,
    Impersonate,
    Suspend,
    Activate,
    PasswordChange,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Restore => "restore",
            AuditAction::Purge => "purge",
            AuditAction::Login => "login",
            AuditAction::Impersonate => "impersonate",
            AuditAction::Suspend => "suspend",
            AuditAction::Activate => "activate",
            AuditAction::PasswordChange => "password_change",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// Who performed the action, and inside which firm
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditActor {
    pub firm_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub impersonator_id: Option<Uuid>,
}

impl AuditActor {
    pub fn in_firm(mut self, firm_id: Option<Uuid>) -> Self {
        self.firm_id = firm_id;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub entity_type: &'static str,
    pub entity_id: Option<Uuid>,
    pub changes: Vec<FieldChange>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, entity_type: &'static str, entity_id: impl Into<Option<Uuid>>) -> Self {
        Self {
            action,
            entity_type,
            entity_id: entity_id.into(),
            changes: vec![],
        }
    }

    pub fn changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes = changes;
        self
    }
}

/// Write an audit row on the caller's connection, which is the request
/// transaction for mutating routes
pub async fn record(conn: &mut PgConnection, actor: &AuditActor, entry: AuditEntry) -> Result<(), DatabaseError> {
    let changes = serde_json::to_value(&entry.changes).unwrap_or_else(|_| json!([]));
    let sql = Changeset::new()
        .set("id", Uuid::new_v4())
        .set("firm_id", actor.firm_id)
        .set("actor_id", actor.actor_id)
        .set("impersonator_id", actor.impersonator_id)
        .set("action", entry.action.as_str())
        .set("entity_type", entry.entity_type)
        .set("entity_id", entry.entity_id)
        .set("changes", changes)
        .to_insert_sql("audit_logs");
    execute(conn, &sql).await?;

    tracing::debug!(
        action = entry.action.as_str(),
        entity_type = entry.entity_type,
        entity_id = ?entry.entity_id,
        actor_id = ?actor.actor_id,
        "Audit recorded"
    );
    Ok(())
}

/// Field-level changes between two serialized records
pub fn diff(before: &Value, after: &Value) -> Vec<FieldChange> {
    let empty = serde_json::Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let mut fields: Vec<&String> = before.keys().chain(after.keys()).collect();
    fields.sort();
    fields.dedup();

    fields
        .into_iter()
        .filter(|f| !IGNORED_FIELDS.contains(&f.as_str()) && !SECRET_FIELDS.contains(&f.as_str()))
        .filter_map(|field| {
            let old = before.get(field).cloned().unwrap_or(Value::Null);
            let new = after.get(field).cloned().unwrap_or(Value::Null);
            (old != new).then(|| FieldChange {
                field: field.clone(),
                old,
                new,
            })
        })
        .collect()
}

/// Diff two records of the same type
pub fn diff_records<T: Serialize>(before: &T, after: &T) -> Vec<FieldChange> {
    match (serde_json::to_value(before), serde_json::to_value(after)) {
        (Ok(b), Ok(a)) => diff(&b, &a),
        _ => vec![],
    }
}

/// Every non-null field of a new record, as a change from null
pub fn snapshot<T: Serialize>(record: &T) -> Vec<FieldChange> {
    serde_json::to_value(record)
        .map(|after| diff(&Value::Null, &after))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_reports_changed_fields_only() {
        let before = json!({"title": "Smith v. Jones", "status": "open", "updated_at": "a"});
        let after = json!({"title": "Smith v. Jones", "status": "closed", "updated_at": "b"});
        assert_eq!(
            diff(&before, &after),
            vec![FieldChange {
                field: "status".to_string(),
                old: json!("open"),
                new: json!("closed"),
            }]
        );
    }

    #[test]
    fn diff_never_includes_password_hash() {
        let before = json!({"password_hash": "old"});
        let after = json!({"password_hash": "new"});
        assert!(diff(&before, &after).is_empty());
    }

    #[test]
    fn diff_handles_added_and_removed_fields() {
        let before = json!({"phone": "555"});
        let after = json!({"email": "a@b.c"});
        let changes = diff(&before, &after);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "email");
        assert_eq!(changes[0].old, Value::Null);
        assert_eq!(changes[1].field, "phone");
        assert_eq!(changes[1].new, Value::Null);
    }

    #[test]
    fn snapshot_lists_new_values() {
        let changes = snapshot(&json!({"name": "Acme", "notes": null}));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new, json!("Acme"));
    }

    #[test]
    fn entry_builder_accepts_optional_ids() {
        let entry = AuditEntry::new(AuditAction::Login, "user", None);
        assert!(entry.entity_id.is_none());
        let id = Uuid::new_v4();
        let entry = AuditEntry::new(AuditAction::PasswordChange, "user", id);
        assert_eq!(entry.entity_id, Some(id));
        assert_eq!(entry.action.as_str(), "password_change");
    }
}
