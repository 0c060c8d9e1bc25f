use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use turnstile_server::routes;

#[path = "support/mod.rs"]
mod support;
use support::build_test_app;

#[tokio::test]
async fn root_reports_liveness() -> Result<()> {
    let app = build_test_app()?;
    let response = app.server.get(routes::ROOT).await;
    response.assert_status_ok();
    assert_eq!(response.json::<String>(), "Welcome to Users Service");
    assert_eq!(response.text(), "\"Welcome to Users Service\"");
    assert!(
        response
            .header("content-type")
            .to_str()?
            .starts_with("application/json")
    );
    Ok(())
}

#[tokio::test]
async fn generates_a_request_id_when_missing() -> Result<()> {
    let app = build_test_app()?;
    let response = app.server.get(routes::ROOT).await;

    let header = response.header("x-request-id");
    let id = header.to_str()?;
    assert_eq!(id.len(), 20);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    Ok(())
}

#[tokio::test]
async fn echoes_a_supplied_request_id() -> Result<()> {
    let app = build_test_app()?;
    let response = app
        .server
        .post(routes::AUTH)
        .add_header("x-request-id", "client-supplied-42")
        .json(&json!({ "user_name": "a@x.com", "password": "password123" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.header("x-request-id"), "client-supplied-42");
    Ok(())
}

#[tokio::test]
async fn metrics_count_requests_by_route() -> Result<()> {
    let app = build_test_app()?;
    let server = &app.server;

    server
        .post(routes::USERS)
        .json(&json!({
            "user_name": "a@x.com",
            "password": "password123",
            "organization_name": "Acme"
        }))
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post("/auth/")
        .json(&json!({ "user_name": "a@x.com", "password": "wrong" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let response = server.get(routes::METRICS).await;
    response.assert_status_ok();
    let content_type = response.header("content-type");
    assert!(content_type.to_str()?.starts_with("text/plain"));

    let text = response.text();
    assert!(text.contains("http_requests_total"));
    assert!(text.contains(r#"path="/users""#));
    assert!(text.contains(r#"path="/auth""#));
    assert!(text.contains(r#"status="201""#));
    assert!(text.contains(r#"status="401""#));
    assert!(text.contains("http_request_duration_seconds"));
    Ok(())
}

#[tokio::test]
async fn unknown_routes_are_not_found() -> Result<()> {
    let app = build_test_app()?;
    app.server
        .get("/nope")
        .expect_failure()
        .await
        .assert_status_not_found();
    Ok(())
}
