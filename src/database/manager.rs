use sqlx::{pool::PoolConnection, postgres::PgPoolOptions, PgPool, Postgres};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::filter::error::FilterError;

/// Errors from the database layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("Timed out waiting for a database connection")]
    PoolTimedOut,

    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                Some("23505") => return DatabaseError::UniqueViolation(constraint),
                Some("23503") => return DatabaseError::ForeignKeyViolation(constraint),
                _ => {}
            }
        }
        match err {
            sqlx::Error::PoolTimedOut => DatabaseError::PoolTimedOut,
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            other => DatabaseError::Sqlx(other),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::Migration(err.to_string())
    }
}

/// Shared connection pool for the platform database.
///
/// Every firm lives in the same database; isolation is enforced by the
/// `firm_id` scope that the filter layer adds to each query.
#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect eagerly, failing fast when the database is unreachable
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        if config.url.is_empty() {
            return Err(DatabaseError::QueryError("DATABASE_URL is not configured".to_string()));
        }
        let pool = Self::pool_options(config).connect(&config.url).await?;
        info!("Connected database pool: {}", redact_url(&config.url));
        Ok(Self::from_pool(pool))
    }

    /// Build a pool that opens connections on first use
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = Self::pool_options(config).connect_lazy(&config.url)?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check out a pooled connection for read-only handlers
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, DatabaseError> {
        Ok(self.pool.acquire().await?)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Apply the embedded migrations in `migrations/`
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Close the pool (e.g., on shutdown)
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}

/// Strip credentials from a connection string before logging it
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.into()
        }
        Err(_) => "<invalid database url>".to_string(),
    }
}
