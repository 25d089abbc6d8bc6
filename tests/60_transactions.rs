//! Request transactions against a real database. Skipped unless DATABASE_URL is set.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use docket_api::database::Database;
use docket_api::error::ApiError;
use docket_api::middleware::{transaction_middleware, Tx};
use docket_api::state::AppState;
use docket_api::storage::MemoryStorage;
use uuid::Uuid;

/// Set by after-commit hooks
#[derive(Clone, Default)]
struct Committed(Arc<AtomicBool>);

async fn insert_firm(tx: &Tx, slug: &str) -> Result<(), ApiError> {
    let mut conn = tx.conn().await?;
    sqlx::query("INSERT INTO firms (id, name, slug) VALUES ($1, $2, $2)")
        .bind(Uuid::new_v4())
        .bind(slug)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn mark_on_commit(tx: &Tx, committed: &Committed) {
    let flag = committed.0.clone();
    tx.after_commit(async move { flag.store(true, Ordering::SeqCst) });
}

async fn accept(State(committed): State<Committed>, tx: Tx, Path(slug): Path<String>) -> Result<StatusCode, ApiError> {
    insert_firm(&tx, &slug).await?;
    mark_on_commit(&tx, &committed);
    Ok(StatusCode::CREATED)
}

async fn refuse(State(committed): State<Committed>, tx: Tx, Path(slug): Path<String>) -> Result<StatusCode, ApiError> {
    insert_firm(&tx, &slug).await?;
    mark_on_commit(&tx, &committed);
    Err(ApiError::bad_request("refused after writing"))
}

/// Passes every statement but fails the deferred check at commit
async fn fail_at_commit(tx: Tx) -> Result<StatusCode, ApiError> {
    let mut conn = tx.conn().await?;
    sqlx::query("CREATE TEMP TABLE deferred_check (id INT UNIQUE DEFERRABLE INITIALLY DEFERRED) ON COMMIT DROP")
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO deferred_check VALUES (1), (1)")
        .execute(&mut *conn)
        .await?;
    Ok(StatusCode::CREATED)
}

/// Reads get no transaction
async fn read(tx: Option<Tx>) -> StatusCode {
    if tx.is_some() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

struct Harness {
    base_url: String,
    db: Database,
    committed: Committed,
    client: reqwest::Client,
}

impl Harness {
    async fn post(&self, path: &str) -> Result<reqwest::StatusCode> {
        Ok(self.client.post(format!("{}{}", self.base_url, path)).send().await?.status())
    }

    async fn firm_exists(&self, slug: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM firms WHERE slug = $1")
            .bind(slug)
            .fetch_one(self.db.pool())
            .await?;
        Ok(count == 1)
    }

    fn committed(&self) -> bool {
        self.committed.0.load(Ordering::SeqCst)
    }
}

async fn harness() -> Result<Option<Harness>> {
    let Some((config, db)) = common::migrated_db().await? else {
        return Ok(None);
    };
    let state = AppState::with_storage(config, db.clone(), Arc::new(MemoryStorage::default()));
    let committed = Committed::default();

    let app = Router::new()
        .route("/accept/:slug", post(accept))
        .route("/refuse/:slug", post(refuse))
        .route("/fail-at-commit", post(fail_at_commit))
        .route("/read", get(read))
        .route_layer(from_fn_with_state(state, transaction_middleware))
        .with_state(committed.clone());

    Ok(Some(Harness {
        base_url: common::serve(app).await?,
        db,
        committed,
        client: reqwest::Client::new(),
    }))
}

#[tokio::test]
async fn success_commits_and_runs_hooks() -> Result<()> {
    let Some(h) = harness().await? else { return Ok(()) };
    let slug = common::unique("commit");

    assert_eq!(h.post(&format!("/accept/{}", slug)).await?, reqwest::StatusCode::CREATED);
    assert!(h.firm_exists(&slug).await?);
    assert!(h.committed());
    Ok(())
}

#[tokio::test]
async fn client_error_rolls_back_and_drops_hooks() -> Result<()> {
    let Some(h) = harness().await? else { return Ok(()) };
    let slug = common::unique("rollback");

    assert_eq!(h.post(&format!("/refuse/{}", slug)).await?, reqwest::StatusCode::BAD_REQUEST);
    assert!(!h.firm_exists(&slug).await?);
    assert!(!h.committed());
    Ok(())
}

#[tokio::test]
async fn failed_commit_becomes_server_error() -> Result<()> {
    let Some(h) = harness().await? else { return Ok(()) };
    assert_eq!(h.post("/fail-at-commit").await?, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[tokio::test]
async fn reads_run_outside_a_transaction() -> Result<()> {
    let Some(h) = harness().await? else { return Ok(()) };
    let status = h.client.get(format!("{}/read", h.base_url)).send().await?.status();
    assert_eq!(status, reqwest::StatusCode::OK);
    Ok(())
}
