use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::{PgConnection, Postgres, Transaction};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::error::ApiError;
use crate::state::AppState;

type AfterCommit = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The request's open transaction, shared between middleware and handler
#[derive(Clone)]
pub struct TxSlot {
    tx: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
    after_commit: Arc<std::sync::Mutex<Vec<AfterCommit>>>,
}

impl TxSlot {
    fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            after_commit: Arc::default(),
        }
    }

    fn take_after_commit(&self) -> Vec<AfterCommit> {
        let mut tasks = self.after_commit.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *tasks)
    }
}

pub fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Wrap mutating requests in one transaction. Commits below 400,
/// rolls back otherwise; handlers never commit.
pub async fn transaction_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_mutating(request.method()) {
        return Ok(next.run(request).await);
    }

    let tx = state.db.pool().begin().await?;
    let slot = TxSlot::new(tx);
    request.extensions_mut().insert(slot.clone());

    let response = next.run(request).await;
    let tx = slot.tx.lock().await.take();
    let Some(tx) = tx else {
        return Ok(response);
    };

    if response.status().as_u16() < 400 {
        if let Err(e) = tx.commit().await {
            tracing::error!("Transaction commit failed: {}", e);
            return Ok(ApiError::internal_server_error("Failed to commit transaction").into_response());
        }
        for task in slot.take_after_commit() {
            task.await;
        }
    } else if let Err(e) = tx.rollback().await {
        tracing::error!("Transaction rollback failed: {}", e);
    } else {
        tracing::debug!(status = response.status().as_u16(), "Transaction rolled back");
    }

    Ok(response)
}

/// Handler access to the request transaction
pub struct Tx(TxSlot);

impl Tx {
    /// Lock the transaction's connection for the duration of the guard
    pub async fn conn(&self) -> Result<MappedMutexGuard<'_, PgConnection>, ApiError> {
        let guard = self.0.tx.lock().await;
        MutexGuard::try_map(guard, |tx| tx.as_deref_mut())
            .map_err(|_| ApiError::internal_server_error("Transaction already finished"))
    }

    /// Run `task` once the transaction has committed. Dropped on rollback.
    pub fn after_commit(&self, task: impl Future<Output = ()> + Send + 'static) {
        self.0
            .after_commit
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::pin(task));
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Tx {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TxSlot>()
            .cloned()
            .map(Tx)
            .ok_or_else(|| ApiError::internal_server_error("No transaction for this request"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_writes_are_wrapped() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
    }
}
