use std::marker::PhantomData;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use sqlx::{postgres::PgRow, FromRow, PgConnection, Row};

use crate::config;
use crate::database::manager::DatabaseError;
use crate::filter::filter::{LimitPolicy, TableSpec};
use crate::filter::{Filter, FilterData, FilterScope, SqlResult};

/// One page of a list endpoint
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T: Serialize> Page<T> {
    pub fn map<U: Serialize>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Typed SELECT over one table, always bound to a firm and deleted scope
pub struct QueryBuilder<T> {
    filter: Filter,
    _phantom: PhantomData<T>,
}

impl<T> QueryBuilder<T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    pub fn new(spec: TableSpec, scope: FilterScope, policy: LimitPolicy) -> Result<Self, DatabaseError> {
        Ok(Self {
            filter: Filter::new(spec, scope, policy)?,
            _phantom: PhantomData,
        })
    }

    pub fn filter(mut self, data: FilterData, policy: LimitPolicy) -> Result<Self, DatabaseError> {
        self.filter.assign(data, policy)?;
        Ok(self)
    }

    pub fn where_clause(mut self, conditions: Value) -> Result<Self, DatabaseError> {
        self.filter.where_clause(conditions)?;
        Ok(self)
    }

    pub fn search(mut self, term: Option<&str>) -> Result<Self, DatabaseError> {
        if let Some(term) = term {
            self.filter.search(term)?;
        }
        Ok(self)
    }

    pub fn order(mut self, order: Option<&str>) -> Result<Self, DatabaseError> {
        if let Some(order) = order {
            self.filter.order(Value::String(order.to_string()))?;
        }
        Ok(self)
    }

    pub fn limit(mut self, limit: Option<i64>, offset: Option<i64>, policy: LimitPolicy) -> Result<Self, DatabaseError> {
        self.filter.limit(limit, offset, policy)?;
        Ok(self)
    }

    pub async fn select_all(&self, conn: &mut PgConnection) -> Result<Vec<T>, DatabaseError> {
        fetch_all(conn, &self.filter.to_sql()?).await
    }

    pub async fn select_optional(&self, conn: &mut PgConnection) -> Result<Option<T>, DatabaseError> {
        fetch_optional(conn, &self.filter.to_sql()?).await
    }

    pub async fn count(&self, conn: &mut PgConnection) -> Result<i64, DatabaseError> {
        fetch_count(conn, &self.filter.to_count_sql()?).await
    }

    /// Items and total share one where clause, so they always agree
    pub async fn page(&self, conn: &mut PgConnection) -> Result<Page<T>, DatabaseError>
    where
        T: Serialize,
    {
        let items = self.select_all(conn).await?;
        let total = self.count(conn).await?;
        Ok(Page {
            items,
            total,
            limit: self.filter.limit_value(),
            offset: self.filter.offset_value(),
        })
    }
}

pub async fn fetch_all<T>(conn: &mut PgConnection, sql: &SqlResult) -> Result<Vec<T>, DatabaseError>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let started = Instant::now();
    let rows = sqlx::query_as_with::<_, T, _>(&sql.query, sql.arguments())
        .fetch_all(conn)
        .await;
    log_slow(&sql.query, started);
    Ok(rows?)
}

pub async fn fetch_optional<T>(conn: &mut PgConnection, sql: &SqlResult) -> Result<Option<T>, DatabaseError>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let started = Instant::now();
    let row = sqlx::query_as_with::<_, T, _>(&sql.query, sql.arguments())
        .fetch_optional(conn)
        .await;
    log_slow(&sql.query, started);
    Ok(row?)
}

pub async fn fetch_count(conn: &mut PgConnection, sql: &SqlResult) -> Result<i64, DatabaseError> {
    let started = Instant::now();
    let row = sqlx::query_with(&sql.query, sql.arguments()).fetch_one(conn).await;
    log_slow(&sql.query, started);
    let count: i64 = row?.try_get("count")?;
    Ok(count)
}

pub async fn execute(conn: &mut PgConnection, sql: &SqlResult) -> Result<u64, DatabaseError> {
    let started = Instant::now();
    let result = sqlx::query_with(&sql.query, sql.arguments()).execute(conn).await;
    log_slow(&sql.query, started);
    Ok(result?.rows_affected())
}

fn log_slow(query: &str, started: Instant) {
    let elapsed = started.elapsed();
    let threshold = Duration::from_millis(config::config().database.slow_query_threshold_ms);
    if elapsed > threshold {
        tracing::warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            "Slow query: {}",
            query
        );
    }
}
