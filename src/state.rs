use std::sync::Arc;

use sqlx::PgConnection;

use crate::audit::{self, AuditActor, AuditEntry};
use crate::config::AppConfig;
use crate::database::{Database, DatabaseError};
use crate::filter::LimitPolicy;
use crate::middleware::idempotency::IdempotencyStore;
use crate::storage::{self, StorageProvider};

/// Shared handles every handler and middleware can reach
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Database,
    pub idempotency: Arc<IdempotencyStore>,
    pub storage: Arc<dyn StorageProvider>,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database) -> Self {
        let storage = storage::from_config(&config.storage);
        Self::with_storage(config, db, storage)
    }

    pub fn with_storage(config: AppConfig, db: Database, storage: Arc<dyn StorageProvider>) -> Self {
        let idempotency = Arc::new(IdempotencyStore::new(&config.idempotency));
        Self {
            config: Arc::new(config),
            db,
            idempotency,
            storage,
        }
    }

    pub fn limit_policy(&self) -> LimitPolicy {
        LimitPolicy::from(&self.config.pagination)
    }

    /// Record an audit row unless audit logging is switched off
    pub async fn audit(&self, conn: &mut PgConnection, actor: &AuditActor, entry: AuditEntry) -> Result<(), DatabaseError> {
        if !self.config.security.enable_audit_logging {
            return Ok(());
        }
        audit::record(conn, actor, entry).await
    }
}
