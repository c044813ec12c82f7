//! Management API client.
//!
//! The management API stores one auth file per AI-provider account and can replay an arbitrary
//! HTTP request with that account's credential (`api-call`). Usage figures are obtained by
//! replaying each provider's usage endpoint through it.

use super::{UpstreamError, decode_items, endpoint, null_as_default, read_json};
use crate::config::ManagementConfig;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::instrument;
use url::Url;

pub const MANAGEMENT_API: &str = "Management API";

/// One stored credential as listed by the management API. Parsed leniently: every field is
/// optional and unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthFileEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub auth_index: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub provider: Option<String>,
    pub email: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub disabled: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub hidden: bool,
}

impl AuthFileEntry {
    /// Provider label, falling back to the entry type.
    pub fn provider_label(&self) -> Option<&str> {
        self.provider
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .or(self.kind.as_deref())
    }

    /// Enabled, not flagged hidden, not in the hidden-email set and addressable via `api-call`.
    pub fn is_pollable(&self, config: &ManagementConfig) -> bool {
        !self.disabled && !self.hidden && self.auth_index.is_some() && !config.is_hidden(self.email.as_deref())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Entries are kept raw here so that one malformed entry does not fail the listing.
#[derive(Deserialize)]
#[serde(untagged)]
enum AuthFileList {
    Bare(Vec<Value>),
    Wrapped {
        #[serde(default, deserialize_with = "null_as_default")]
        files: Vec<Value>,
    },
}

/// Request replayed by the management API with one account's credential.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApiCallRequest {
    pub auth_index: String,
    pub method: String,
    pub url: String,
    pub header: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// What the provider answered, as relayed by the management API.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ApiCallResponse {
    pub status_code: u16,
    #[serde(default)]
    pub header: Value,
    #[serde(default)]
    pub body: Value,
}

impl ApiCallResponse {
    /// The provider body as JSON. The management API relays bodies either as a JSON string or
    /// already decoded; non-success statuses and non-JSON bodies are failures.
    pub fn into_json(self) -> Result<Value, String> {
        if !(200..300).contains(&self.status_code) {
            return Err(format!("provider returned HTTP {}", self.status_code));
        }

        match self.body {
            Value::String(raw) => serde_json::from_str(&raw).map_err(|e| format!("provider body is not JSON: {e}")),
            Value::Null => Err("provider body is empty".to_string()),
            other => Ok(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagementClient {
    http: reqwest::Client,
    base: Url,
    key: String,
    request_timeout: Duration,
    list_timeout: Duration,
    api_call_timeout: Duration,
}

impl ManagementClient {
    /// Both a base URL and a key are required.
    pub fn from_config(http: reqwest::Client, config: &ManagementConfig) -> Result<Self, UpstreamError> {
        let base = config.url.clone().ok_or_else(|| UpstreamError::not_configured(MANAGEMENT_API))?;
        let key = config
            .key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| UpstreamError::not_configured(MANAGEMENT_API))?;

        Ok(Self {
            http,
            base,
            key,
            request_timeout: config.request_timeout,
            list_timeout: config.list_timeout,
            api_call_timeout: config.api_call_timeout,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn list_timeout(&self) -> Duration {
        self.list_timeout
    }

    /// List stored auth files, bounded by `timeout`.
    #[instrument(skip(self), err)]
    pub async fn list_auth_files(&self, timeout: Duration) -> Result<Vec<AuthFileEntry>, UpstreamError> {
        let url = endpoint(MANAGEMENT_API, &self.base, "v0/management/auth-files")?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.key)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(MANAGEMENT_API, e))?;

        let files = match read_json::<AuthFileList>(MANAGEMENT_API, response).await? {
            AuthFileList::Bare(files) => files,
            AuthFileList::Wrapped { files } => files,
        };
        Ok(decode_items(files))
    }

    /// Replay `request` with the credential of `request.auth_index`.
    #[instrument(skip(self, request), fields(auth_index = %request.auth_index, url = %request.url), err)]
    pub async fn api_call(&self, request: &ApiCallRequest) -> Result<ApiCallResponse, UpstreamError> {
        let url = endpoint(MANAGEMENT_API, &self.base, "v0/management/api-call")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.key)
            .json(request)
            .timeout(self.api_call_timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(MANAGEMENT_API, e))?;

        read_json(MANAGEMENT_API, response).await
    }

    /// Start downloading an auth file. The returned response has a success status; its body has
    /// not been read yet.
    #[instrument(skip(self), err)]
    pub async fn download_auth_file(&self, name: &str) -> Result<reqwest::Response, UpstreamError> {
        let mut url = endpoint(MANAGEMENT_API, &self.base, "v0/management/auth-files/download")?;
        url.query_pairs_mut().append_pair("name", name);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.key)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(MANAGEMENT_API, e))?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                upstream: MANAGEMENT_API.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path, query_param},
    };

    fn config(server: &MockServer) -> ManagementConfig {
        ManagementConfig {
            url: Some(Url::parse(&server.uri()).unwrap()),
            key: Some("mgmt-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_url_and_key() {
        let http = reqwest::Client::new();

        let err = ManagementClient::from_config(http.clone(), &ManagementConfig::default()).unwrap_err();
        assert_eq!(err, UpstreamError::not_configured(MANAGEMENT_API));

        let config = ManagementConfig {
            url: Some(Url::parse("http://mgmt:8317").unwrap()),
            key: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(ManagementClient::from_config(http, &config).is_err());
    }

    #[test]
    fn test_entry_parsing_is_lenient() {
        let entry: AuthFileEntry = serde_json::from_value(json!({
            "auth_index": 7,
            "name": "claude-a.json",
            "type": "claude",
            "email": "a@example.com",
            "disabled": null,
            "unexpected": {"nested": true}
        }))
        .unwrap();

        assert_eq!(entry.auth_index.as_deref(), Some("7"));
        assert_eq!(entry.provider_label(), Some("claude"));
        assert!(!entry.disabled);

        let entry: AuthFileEntry = serde_json::from_value(json!({"provider": "codex", "type": "oauth"})).unwrap();
        assert_eq!(entry.provider_label(), Some("codex"));
        assert!(entry.auth_index.is_none());
    }

    #[test]
    fn test_pollable_excludes_disabled_and_hidden() {
        let config = ManagementConfig {
            hidden_emails: vec!["hidden@example.com".to_string()],
            ..Default::default()
        };
        let entry = AuthFileEntry {
            auth_index: Some("1".to_string()),
            email: Some("a@example.com".to_string()),
            ..Default::default()
        };
        assert!(entry.is_pollable(&config));

        let disabled = AuthFileEntry {
            disabled: true,
            ..entry.clone()
        };
        assert!(!disabled.is_pollable(&config));

        let hidden = AuthFileEntry {
            email: Some("Hidden@Example.com".to_string()),
            ..entry.clone()
        };
        assert!(!hidden.is_pollable(&config));

        let unaddressable = AuthFileEntry {
            auth_index: None,
            ..entry
        };
        assert!(!unaddressable.is_pollable(&config));
    }

    #[test]
    fn test_api_call_body_decoding() {
        let relayed = ApiCallResponse {
            status_code: 200,
            header: Value::Null,
            body: json!("{\"five_hour\": {\"utilization\": 42}}"),
        };
        assert_eq!(relayed.into_json().unwrap()["five_hour"]["utilization"], 42);

        let decoded = ApiCallResponse {
            status_code: 200,
            header: Value::Null,
            body: json!({"ok": true}),
        };
        assert_eq!(decoded.into_json().unwrap(), json!({"ok": true}));

        let garbage = ApiCallResponse {
            status_code: 200,
            header: Value::Null,
            body: json!("<html>"),
        };
        assert!(garbage.into_json().is_err());

        let denied = ApiCallResponse {
            status_code: 401,
            header: Value::Null,
            body: json!({}),
        };
        assert_eq!(denied.into_json().unwrap_err(), "provider returned HTTP 401");
    }

    #[tokio::test]
    async fn test_list_auth_files_accepts_both_shapes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/auth-files"))
            .and(header("authorization", "Bearer mgmt-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{"auth_index": "a1", "name": "one.json", "type": "claude"}]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/management/auth-files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"auth_index": "a1"}, {"auth_index": "a2"}
            ])))
            .mount(&server)
            .await;

        let client = ManagementClient::from_config(reqwest::Client::new(), &config(&server)).unwrap();

        let wrapped = client.list_auth_files(Duration::from_secs(2)).await.unwrap();
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].name, "one.json");

        let bare = client.list_auth_files(Duration::from_secs(2)).await.unwrap();
        assert_eq!(bare.len(), 2);
    }

    #[tokio::test]
    async fn test_list_auth_files_drops_malformed_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/auth-files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [
                    {"auth_index": "a1", "name": "one.json", "type": "claude"},
                    {"auth_index": "b1", "type": "claude", "disabled": "false"},
                    {"auth_index": "c1", "type": "claude", "email": 123},
                    "not-an-entry"
                ]
            })))
            .mount(&server)
            .await;

        let client = ManagementClient::from_config(reqwest::Client::new(), &config(&server)).unwrap();
        let files = client.list_auth_files(Duration::from_secs(2)).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].auth_index.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_list_auth_files_failure_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/auth-files"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = ManagementClient::from_config(reqwest::Client::new(), &config(&server)).unwrap();
        let err = client.list_auth_files(Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(
            err,
            UpstreamError::Status {
                upstream: MANAGEMENT_API.to_string(),
                status: 401
            }
        );
    }

    #[tokio::test]
    async fn test_list_auth_files_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/auth-files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = ManagementClient::from_config(reqwest::Client::new(), &config(&server)).unwrap();
        let err = client.list_auth_files(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_api_call_posts_replay_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v0/management/api-call"))
            .and(body_partial_json(json!({
                "auth_index": "a1",
                "method": "GET",
                "url": "https://api.anthropic.com/api/oauth/usage"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 200,
                "header": {},
                "body": "{\"five_hour\":{\"utilization\":12.5}}"
            })))
            .mount(&server)
            .await;

        let client = ManagementClient::from_config(reqwest::Client::new(), &config(&server)).unwrap();
        let response = client
            .api_call(&ApiCallRequest {
                auth_index: "a1".to_string(),
                method: "GET".to_string(),
                url: "https://api.anthropic.com/api/oauth/usage".to_string(),
                header: BTreeMap::new(),
                data: None,
            })
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.into_json().unwrap()["five_hour"]["utilization"], 12.5);
    }

    #[tokio::test]
    async fn test_download_passes_name_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/auth-files/download"))
            .and(query_param("name", "claude a.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let client = ManagementClient::from_config(reqwest::Client::new(), &config(&server)).unwrap();
        let response = client.download_auth_file("claude a.json").await.unwrap();
        assert_eq!(response.text().await.unwrap(), "{}");

        let missing = client.download_auth_file("other.json").await.unwrap_err();
        assert!(matches!(missing, UpstreamError::Status { status: 404, .. }));
    }
}
