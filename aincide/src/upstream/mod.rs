//! Clients for the upstream services the status layer aggregates.
//!
//! - [`management`]: management API listing auth files and replaying provider calls per account
//! - [`bot_server`]: bot status server
//! - [`services`]: reachability probes for configured dashboards
//!
//! Every call carries its own deadline via [`reqwest::RequestBuilder::timeout`]. Nothing is
//! retried: one failure is terminal for that call and is reported as an [`UpstreamError`].

pub mod bot_server;
pub mod management;
pub mod services;

pub use bot_server::BotServerClient;
pub use management::ManagementClient;
pub use services::ServiceProber;

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Failure talking to one upstream. `upstream` is the human-readable label echoed in error
/// responses (e.g. "Management API").
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("{upstream} is not configured")]
    NotConfigured { upstream: String },

    #[error("{upstream} timed out")]
    Timeout { upstream: String },

    #[error("{upstream} returned HTTP {status}")]
    Status { upstream: String, status: u16 },

    #[error("{upstream} request failed: {message}")]
    Transport { upstream: String, message: String },

    #[error("{upstream} returned an unexpected body: {message}")]
    Decode { upstream: String, message: String },
}

impl UpstreamError {
    pub fn upstream(&self) -> &str {
        match self {
            UpstreamError::NotConfigured { upstream }
            | UpstreamError::Timeout { upstream }
            | UpstreamError::Status { upstream, .. }
            | UpstreamError::Transport { upstream, .. }
            | UpstreamError::Decode { upstream, .. } => upstream,
        }
    }

    pub fn not_configured(upstream: &str) -> Self {
        UpstreamError::NotConfigured {
            upstream: upstream.to_string(),
        }
    }

    /// Classify a reqwest failure. Deadlines fire as timeouts both while connecting and while
    /// reading the body.
    pub(crate) fn from_reqwest(upstream: &str, err: reqwest::Error) -> Self {
        let upstream = upstream.to_string();
        if err.is_timeout() {
            UpstreamError::Timeout { upstream }
        } else if err.is_decode() {
            UpstreamError::Decode {
                upstream,
                message: err.to_string(),
            }
        } else {
            UpstreamError::Transport {
                upstream,
                message: err.to_string(),
            }
        }
    }
}

/// Makes sure a url has a trailing slash, so that `join` appends rather than replaces the
/// last path segment.
pub(crate) fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

/// Resolve `path` (relative, no leading slash) against a configured base URL.
pub(crate) fn endpoint(upstream: &str, base: &Url, path: &str) -> Result<Url, UpstreamError> {
    ensure_slash(base).join(path).map_err(|e| UpstreamError::Transport {
        upstream: upstream.to_string(),
        message: format!("invalid URL: {e}"),
    })
}

/// Fail on non-success statuses, then decode the body as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(upstream: &str, response: reqwest::Response) -> Result<T, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        return Err(UpstreamError::Status {
            upstream: upstream.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await.map_err(|e| UpstreamError::from_reqwest(upstream, e))?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::debug!(upstream, body = %body, "Failed to decode upstream response");
        UpstreamError::Decode {
            upstream: upstream.to_string(),
            message: e.to_string(),
        }
    })
}

/// Deserialize `null` (as well as a missing field, with `#[serde(default)]`) as the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode each element of `items` on its own, dropping (and logging) the ones that do not fit `T`.
pub(crate) fn decode_items<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                warn!(index, %error, item = std::any::type_name::<T>(), "Dropping malformed upstream item");
                None
            }
        })
        .collect()
}

/// A list field where `null` is empty and malformed elements are skipped instead of failing the
/// whole payload.
pub(crate) fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items: Vec<Value> = null_as_default(deserializer)?;
    Ok(decode_items(items))
}
