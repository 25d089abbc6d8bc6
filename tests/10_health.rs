mod common;

use anyhow::Result;
use reqwest::StatusCode;

#[tokio::test]
async fn root_lists_service_info() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server.client.get(server.url("/")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "docket-api");
    assert!(body["data"]["version"].is_string());
    Ok(())
}

#[tokio::test]
async fn health_reports_unreachable_database() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server.client.get(server.url("/health")).send().await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["status"], "degraded");
    assert_eq!(body["data"]["database"], "unreachable");
    Ok(())
}
