//! Test helpers: application setup, configuration and management API mocks.

use crate::{
    BackgroundServices,
    config::{BotServerConfig, Config, DatabaseConfig, ManagementConfig, PoolSettings},
};
use axum_test::TestServer;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use std::time::Duration;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

pub const TEST_MANAGEMENT_KEY: &str = "mgmt-key";

pub async fn create_test_app(pool: SqlitePool, config: Config) -> (TestServer, BackgroundServices) {
    let app = crate::Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application");

    app.into_test_server()
}

/// Default configuration with optional mocked upstreams.
///
/// Timeouts are shortened so that tests exercising slow upstreams finish quickly.
pub fn create_test_config(management: Option<&MockServer>, bot_server: Option<&MockServer>) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            pool: PoolSettings {
                max_connections: 1,
                min_connections: 0,
                ..Default::default()
            },
        },
        management: ManagementConfig {
            url: management.map(mock_url),
            key: management.map(|_| TEST_MANAGEMENT_KEY.to_string()),
            request_timeout: Duration::from_secs(2),
            list_timeout: Duration::from_secs(2),
            api_call_timeout: Duration::from_secs(2),
            hidden_emails: Vec::new(),
        },
        bot_server: BotServerConfig {
            url: bot_server.map(mock_url),
            request_timeout: Duration::from_secs(2),
        },
        ..Default::default()
    }
}

pub fn mock_url(server: &MockServer) -> Url {
    Url::parse(&server.uri()).expect("mock server uri")
}

/// An auth-file entry for a Claude account named after its auth index.
pub fn claude_account(auth_index: &str, email: &str) -> Value {
    json!({
        "auth_index": auth_index,
        "name": format!("{auth_index}.json"),
        "type": "claude",
        "email": email,
    })
}

pub async fn mock_auth_files(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/v0/management/auth-files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Answer the management api-call for one account with a 200 provider response carrying `body`.
pub async fn mock_usage_body(server: &MockServer, auth_index: &str, body: Value) {
    Mock::given(method("POST"))
        .and(path("/v0/management/api-call"))
        .and(body_partial_json(json!({ "auth_index": auth_index })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 200,
            "header": {},
            "body": body.to_string(),
        })))
        .mount(server)
        .await;
}
