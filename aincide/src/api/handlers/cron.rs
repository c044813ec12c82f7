use crate::{
    AppState,
    api::models::CollectionSummary,
    errors::{Error, Result},
    usage::collector::run_collection,
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use tracing::instrument;

#[utoipa::path(
    get,
    path = "/api/cron/collect-usage",
    tag = "cron",
    summary = "Collect usage snapshots",
    description = "Snapshots the utilization of every enabled Claude account and prunes snapshots past the retention window. \
                   Also accepts POST. Requires `Authorization: Bearer <secret>` when a cron secret is configured.",
    responses(
        (status = 200, description = "Collection finished", body = CollectionSummary),
        (status = 401, description = "Missing or wrong cron secret"),
        (status = 502, description = "Management API unreachable"),
        (status = 503, description = "Management API not configured"),
        (status = 500, description = "Internal server error"),
    ),
    security(("cron_secret" = []))
)]
#[instrument(skip_all, err)]
pub async fn collect_usage(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<CollectionSummary>> {
    authorize(&headers, state.config.collector.cron_secret.as_deref())?;

    let summary = run_collection(&state.db, &state.http, &state.config).await?;
    Ok(Json(summary))
}

/// Open when no secret is configured; otherwise the bearer token must match exactly.
fn authorize(headers: &HeaderMap, secret: Option<&str>) -> Result<()> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if provided.is_some_and(|token| constant_time_eq(token.as_bytes(), secret.as_bytes())) {
        Ok(())
    } else {
        Err(Error::Unauthenticated {
            message: Some("Invalid or missing cron secret".to_string()),
        })
    }
}

/// Byte comparison whose running time does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{claude_account, create_test_app, create_test_config, mock_auth_files, mock_usage_body};
    use axum::http::{HeaderValue, StatusCode};
    use serde_json::json;
    use sqlx::SqlitePool;
    use wiremock::MockServer;

    #[test]
    fn test_authorize() {
        let mut headers = HeaderMap::new();
        assert!(authorize(&headers, None).is_ok());
        assert!(authorize(&headers, Some("")).is_ok());
        assert!(authorize(&headers, Some("s3cret")).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
        assert!(authorize(&headers, Some("s3cret")).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("s3cret"));
        assert!(authorize(&headers, Some("s3cret")).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(authorize(&headers, Some("s3cret")).is_ok());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cre"));
        assert!(authorize(&headers, Some("s3cret")).is_err());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret2"));
        assert!(authorize(&headers, Some("s3cret")).is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"s3cret", b"s3cre"));
        assert!(!constant_time_eq(b"", b"s"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_secret_is_checked_before_configuration(pool: SqlitePool) {
        let mut config = create_test_config(None, None);
        config.collector.cron_secret = Some("s3cret".to_string());
        let (app, _bg) = create_test_app(pool, config).await;

        app.get("/api/cron/collect-usage").await.assert_status(StatusCode::UNAUTHORIZED);
        app.get("/api/cron/collect-usage")
            .authorization_bearer("nope")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let response = app.get("/api/cron/collect-usage").authorization_bearer("s3cret").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = response.json();
        assert!(body["error"].is_string());
    }

    #[sqlx::test]
    async fn test_collect_usage_get_and_post(pool: SqlitePool) {
        let server = MockServer::start().await;
        mock_auth_files(&server, json!({"files": [claude_account("a1", "one@example.com")]})).await;
        mock_usage_body(&server, "a1", json!({"five_hour": {"utilization": 42}})).await;

        let mut config = create_test_config(Some(&server), None);
        config.collector.cron_secret = Some("s3cret".to_string());
        let (app, _bg) = create_test_app(pool.clone(), config).await;

        let response = app.get("/api/cron/collect-usage").authorization_bearer("s3cret").await;
        response.assert_status_ok();
        response.assert_json(&json!({"collected": 1, "accounts": 1}));

        let response = app.post("/api/cron/collect-usage").authorization_bearer("s3cret").await;
        response.assert_status_ok();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_snapshots WHERE metric = 'five_hour' AND utilization = 42")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[sqlx::test]
    async fn test_collect_usage_open_without_secret(pool: SqlitePool) {
        let server = MockServer::start().await;
        mock_auth_files(&server, json!([])).await;
        let (app, _bg) = create_test_app(pool, create_test_config(Some(&server), None)).await;

        let response = app.get("/api/cron/collect-usage").await;
        response.assert_status_ok();
        response.assert_json(&json!({"collected": 0, "accounts": 0}));
    }

    #[sqlx::test]
    async fn test_collect_usage_unreachable_is_502(pool: SqlitePool) {
        let config = {
            let server = MockServer::start().await;
            create_test_config(Some(&server), None)
        };
        // The mock server is gone, so the listing cannot connect.
        let (app, _bg) = create_test_app(pool, config).await;

        app.get("/api/cron/collect-usage").await.assert_status(StatusCode::BAD_GATEWAY);
    }
}
