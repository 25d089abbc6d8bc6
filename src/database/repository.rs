use std::marker::PhantomData;

use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{postgres::PgRow, FromRow, PgConnection};
use uuid::Uuid;

use crate::database::changes::Changeset;
use crate::database::manager::DatabaseError;
use crate::database::query_builder::{fetch_optional, Page, QueryBuilder};
use crate::filter::{DeletedScope, FilterData, FilterScope, LimitPolicy, ListQuery, SqlParam, SqlResult, TableSpec};

/// A table-backed entity the generic repository can load and mutate
pub trait Resource: for<'r> FromRow<'r, PgRow> + Send + Unpin + Serialize {
    const TABLE: TableSpec;
    /// `entity_type` written to the audit trail
    const ENTITY: &'static str;

    fn id(&self) -> Uuid;
}

/// Scoped data access for one resource.
///
/// Every statement carries the firm scope (when set) and the deleted scope,
/// so a handler cannot forget either.
pub struct Repository<T> {
    scope: FilterScope,
    policy: LimitPolicy,
    _phantom: PhantomData<T>,
}

impl<T: Resource> Repository<T> {
    pub fn new(firm_id: Option<Uuid>, policy: LimitPolicy) -> Self {
        Self {
            scope: FilterScope {
                firm_id,
                deleted: DeletedScope::Active,
            },
            policy,
            _phantom: PhantomData,
        }
    }

    pub fn with_deleted(mut self, deleted: DeletedScope) -> Self {
        self.scope.deleted = deleted;
        self
    }

    pub fn query(&self) -> Result<QueryBuilder<T>, DatabaseError> {
        QueryBuilder::new(T::TABLE, self.scope, self.policy)
    }

    pub async fn select_one(&self, conn: &mut PgConnection, conditions: Value) -> Result<Option<T>, DatabaseError> {
        self.query()?
            .where_clause(conditions)?
            .limit(Some(1), None, self.policy)?
            .select_optional(conn)
            .await
    }

    pub async fn select_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<T>, DatabaseError> {
        self.select_one(conn, json!({ "id": id.to_string() })).await
    }

    pub async fn select_404(&self, conn: &mut PgConnection, id: Uuid) -> Result<T, DatabaseError> {
        self.select_id(conn, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("{} {} not found", T::ENTITY, id)))
    }

    pub async fn count(&self, conn: &mut PgConnection, conditions: Value) -> Result<i64, DatabaseError> {
        self.query()?.where_clause(conditions)?.count(conn).await
    }

    /// List with the standard paging/sort/search parameters plus
    /// resource-specific conditions
    pub async fn page(&self, conn: &mut PgConnection, list: &ListQuery, conditions: Value) -> Result<Page<T>, DatabaseError> {
        self.query()?
            .where_clause(conditions)?
            .search(list.q.as_deref())?
            .order(list.sort.as_deref())?
            .limit(list.limit, list.offset, self.policy)?
            .page(conn)
            .await
    }

    pub async fn find(&self, conn: &mut PgConnection, filter_data: FilterData) -> Result<Page<T>, DatabaseError> {
        self.query()?.filter(filter_data, self.policy)?.page(conn).await
    }

    /// Insert a row; `firm_id` is forced to the repository's firm
    pub async fn insert(&self, conn: &mut PgConnection, mut changes: Changeset) -> Result<T, DatabaseError> {
        if let Some(firm_id) = self.scope.firm_id {
            changes.push("firm_id", firm_id);
        }
        if !changes.contains("id") {
            changes.push("id", Uuid::new_v4());
        }
        fetch_optional(conn, &changes.to_insert_sql(T::TABLE.name))
            .await?
            .ok_or_else(|| DatabaseError::QueryError(format!("insert into {} returned no row", T::TABLE.name)))
    }

    pub async fn update(&self, conn: &mut PgConnection, id: Uuid, changes: Changeset) -> Result<T, DatabaseError> {
        if changes.is_empty() {
            return self.select_404(conn, id).await;
        }
        let sql = changes.to_update_sql(T::TABLE.name, id, self.scope.firm_id);
        self.returning_404(conn, id, sql).await
    }

    /// Mark a live row deleted. Already-deleted rows are 404.
    pub async fn soft_delete(&self, conn: &mut PgConnection, id: Uuid, actor: Uuid) -> Result<T, DatabaseError> {
        let sql = self.by_id(
            "UPDATE \"{table}\" SET \"deleted_at\" = now(), \"deleted_by\" = $1, \"updated_at\" = now()",
            vec![SqlParam::from(actor)],
            id,
            "\"deleted_at\" IS NULL",
        );
        self.returning_404(conn, id, sql).await
    }

    /// Bring a soft-deleted row back. Live rows are 404.
    pub async fn restore(&self, conn: &mut PgConnection, id: Uuid) -> Result<T, DatabaseError> {
        let sql = self.by_id(
            "UPDATE \"{table}\" SET \"deleted_at\" = NULL, \"deleted_by\" = NULL, \"updated_at\" = now()",
            vec![],
            id,
            "\"deleted_at\" IS NOT NULL",
        );
        self.returning_404(conn, id, sql).await
    }

    /// Remove the row for good, deleted or not
    pub async fn purge(&self, conn: &mut PgConnection, id: Uuid) -> Result<T, DatabaseError> {
        let sql = self.by_id("DELETE FROM \"{table}\"", vec![], id, "1=1");
        self.returning_404(conn, id, sql).await
    }

    fn by_id(&self, head: &str, mut params: Vec<SqlParam>, id: Uuid, state: &str) -> SqlResult {
        params.push(SqlParam::from(id));
        let mut query = format!(
            "{} WHERE \"id\" = ${}",
            head.replace("{table}", T::TABLE.name),
            params.len()
        );
        if let Some(firm_id) = self.scope.firm_id {
            params.push(SqlParam::from(firm_id));
            query.push_str(&format!(" AND \"firm_id\" = ${}", params.len()));
        }
        query.push_str(&format!(" AND {} RETURNING *", state));
        SqlResult { query, params }
    }

    async fn returning_404(&self, conn: &mut PgConnection, id: Uuid, sql: SqlResult) -> Result<T, DatabaseError> {
        fetch_optional(conn, &sql)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("{} {} not found", T::ENTITY, id)))
    }
}
