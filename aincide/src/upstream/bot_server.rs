//! Bot status server client.

use super::{UpstreamError, endpoint, lenient_list, null_as_default, read_json};
use crate::config::BotServerConfig;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::instrument;
use url::Url;
use utoipa::ToSchema;

pub const BOT_STATUS_SERVER: &str = "Bot status server";
pub const BOT_USAGE_SERVER: &str = "Bot usage server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BotState {
    Online,
    #[default]
    Offline,
}

/// Anything other than `online` (case-insensitive) is offline.
impl<'de> Deserialize<'de> for BotState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw {
            Some(s) if s.trim().eq_ignore_ascii_case("online") => BotState::Online,
            _ => BotState::Offline,
        })
    }
}

/// One bot as reported by the status server. Fields this layer does not interpret are
/// carried through unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct BotInfo {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub id: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub status: BotState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub uptime: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub ping: Option<Value>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct BotStatus {
    #[serde(default, deserialize_with = "lenient_list")]
    pub bots: Vec<BotInfo>,
    /// Seconds the bot server has been up
    #[serde(rename = "serverUptime", default, deserialize_with = "null_as_default")]
    pub server_uptime: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct BotUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    #[schema(value_type = Vec<Object>)]
    pub accounts: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct BotServerClient {
    http: reqwest::Client,
    base: Url,
    timeout: Duration,
}

impl BotServerClient {
    /// `upstream` labels the error when no base URL is configured.
    pub fn from_config(http: reqwest::Client, config: &BotServerConfig, upstream: &str) -> Result<Self, UpstreamError> {
        let base = config.url.clone().ok_or_else(|| UpstreamError::not_configured(upstream))?;
        Ok(Self {
            http,
            base,
            timeout: config.request_timeout,
        })
    }

    #[instrument(skip(self), err)]
    pub async fn status(&self) -> Result<BotStatus, UpstreamError> {
        self.get_json(BOT_STATUS_SERVER, "status").await
    }

    #[instrument(skip(self), err)]
    pub async fn usage(&self) -> Result<BotUsage, UpstreamError> {
        self.get_json(BOT_USAGE_SERVER, "usage").await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, upstream: &str, path: &str) -> Result<T, UpstreamError> {
        let url = endpoint(upstream, &self.base, path)?;
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(upstream, e))?;

        read_json(upstream, response).await
    }
}
