mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde_json::Value;
use uuid::Uuid;

async fn error_code(res: reqwest::Response) -> Result<String> {
    let body = res.json::<Value>().await?;
    assert_eq!(body["error"], true, "error envelope: {}", body);
    Ok(body["code"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn api_requires_a_token() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server.client.get(server.url("/api/cases")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await?, "UNAUTHORIZED");
    Ok(())
}

#[tokio::test]
async fn garbage_and_expired_tokens_are_rejected() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server
        .client
        .get(server.url("/api/cases"))
        .bearer_auth("not-a-jwt")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let mut claims = common::staff_claims(Uuid::new_v4());
    claims.iat = (Utc::now() - Duration::hours(3)).timestamp();
    claims.exp = (Utc::now() - Duration::hours(2)).timestamp();
    let res = server
        .client
        .get(server.url("/api/cases"))
        .bearer_auth(server.token(&claims))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn token_from_another_secret_is_rejected() -> Result<()> {
    let server = common::spawn_server().await?;
    let forged = docket_api::auth::issue_token(&common::staff_claims(Uuid::new_v4()), "some-other-secret")?;

    let res = server
        .client
        .get(server.url("/api/auth/whoami"))
        .bearer_auth(forged)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn firm_user_cannot_name_another_firm() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.token(&common::staff_claims(Uuid::new_v4()));

    let res = server
        .client
        .get(server.url("/api/cases"))
        .bearer_auth(token)
        .header("X-Firm-Id", Uuid::new_v4().to_string())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await?, "FORBIDDEN");
    Ok(())
}

#[tokio::test]
async fn firm_header_and_query_must_agree() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.token(&common::superadmin_claims());

    let res = server
        .client
        .get(server.url(&format!("/api/cases?firm_id={}", Uuid::new_v4())))
        .bearer_auth(token)
        .header("X-Firm-Id", Uuid::new_v4().to_string())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn superadmin_must_name_a_firm() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.token(&common::superadmin_claims());

    let res = server.client.get(server.url("/api/clients")).bearer_auth(&token).send().await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .client
        .get(server.url("/api/clients"))
        .bearer_auth(&token)
        .header("X-Firm-Id", "not-a-uuid")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn admin_console_is_superadmin_only() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.token(&common::staff_claims(Uuid::new_v4()));

    let res = server.client.get(server.url("/api/admin/firms")).bearer_auth(token).send().await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn impersonation_token_cannot_reach_admin_console() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.token(&common::impersonation_claims(Uuid::new_v4()));

    let res = server.client.get(server.url("/api/admin/stats")).bearer_auth(token).send().await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await?, "FORBIDDEN");
    Ok(())
}
