//! Per-provider usage requests and lenient response parsing.
//!
//! Each provider exposes its rate-limit usage at a fixed URL. The request is replayed through
//! the management API's `api-call`, which substitutes the account's access token for the
//! `$TOKEN$` placeholder.

use crate::types::{Metric, Provider};
use crate::upstream::management::ApiCallRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use utoipa::ToSchema;

pub const CLAUDE_USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
pub const CODEX_USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";
pub const GEMINI_QUOTA_URL: &str = "https://cloudcode-pa.googleapis.com/v1internal:retrieveUserQuota";

const TOKEN_PLACEHOLDER: &str = "Bearer $TOKEN$";

const FIVE_HOURS_SECS: i64 = 5 * 60 * 60;
const SEVEN_DAYS_SECS: i64 = 7 * 24 * 60 * 60;

/// The replayed request that fetches `provider` usage for one account.
pub fn usage_request(provider: Provider, auth_index: &str) -> ApiCallRequest {
    let mut header = BTreeMap::from([("Authorization".to_string(), TOKEN_PLACEHOLDER.to_string())]);

    let (method, url, data) = match provider {
        Provider::Claude => {
            header.insert("anthropic-beta".to_string(), "oauth-2025-04-20".to_string());
            ("GET", CLAUDE_USAGE_URL, None)
        }
        Provider::Codex => ("GET", CODEX_USAGE_URL, None),
        Provider::Gemini => {
            header.insert("Content-Type".to_string(), "application/json".to_string());
            ("POST", GEMINI_QUOTA_URL, Some("{}".to_string()))
        }
    };

    ApiCallRequest {
        auth_index: auth_index.to_string(),
        method: method.to_string(),
        url: url.to_string(),
        header,
        data,
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|n| n.is_finite())
}

fn integer(value: Option<&Value>) -> Option<i64> {
    value.and_then(|v| v.as_i64().or_else(|| v.as_f64().filter(|n| n.is_finite()).map(|n| n as i64)))
}

fn text(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn object(value: &Value) -> Result<&serde_json::Map<String, Value>, String> {
    value.as_object().ok_or_else(|| "usage body is not a JSON object".to_string())
}

/// A Claude rate-limit window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UsageWindow {
    /// Percentage consumed, 0-100
    pub utilization: Option<f64>,
    pub resets_at: Option<String>,
}

impl UsageWindow {
    fn parse(value: Option<&Value>) -> Option<Self> {
        let window = value?.as_object()?;
        Some(Self {
            utilization: number(window.get("utilization")),
            resets_at: text(window.get("resets_at")),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClaudeUsage {
    pub five_hour: Option<UsageWindow>,
    pub seven_day: Option<UsageWindow>,
    pub seven_day_sonnet: Option<UsageWindow>,
}

impl ClaudeUsage {
    pub fn parse(body: &Value) -> Result<Self, String> {
        let body = object(body)?;
        Ok(Self {
            five_hour: UsageWindow::parse(body.get("five_hour")),
            seven_day: UsageWindow::parse(body.get("seven_day")),
            seven_day_sonnet: UsageWindow::parse(body.get("seven_day_sonnet")),
        })
    }

    pub fn utilization(&self, metric: Metric) -> Option<f64> {
        let window = match metric {
            Metric::FiveHour => &self.five_hour,
            Metric::SevenDay => &self.seven_day,
            Metric::SevenDaySonnet => &self.seven_day_sonnet,
        };
        window.as_ref().and_then(|w| w.utilization)
    }
}

/// A Codex rate-limit window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CodexWindow {
    pub used_percent: Option<f64>,
    pub limit_window_seconds: Option<i64>,
    pub reset_after_seconds: Option<i64>,
}

impl CodexWindow {
    fn parse(value: Option<&Value>) -> Option<Self> {
        let window = value?.as_object()?;
        Some(Self {
            used_percent: number(window.get("used_percent")),
            limit_window_seconds: integer(window.get("limit_window_seconds")),
            reset_after_seconds: integer(window.get("reset_after_seconds")),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CodexUsage {
    pub plan_type: Option<String>,
    pub primary_window: Option<CodexWindow>,
    pub secondary_window: Option<CodexWindow>,
}

impl CodexUsage {
    pub fn parse(body: &Value) -> Result<Self, String> {
        let body = object(body)?;
        let rate_limit = body.get("rate_limit").and_then(Value::as_object);
        Ok(Self {
            plan_type: text(body.get("plan_type")),
            primary_window: CodexWindow::parse(rate_limit.and_then(|r| r.get("primary_window"))),
            secondary_window: CodexWindow::parse(rate_limit.and_then(|r| r.get("secondary_window"))),
        })
    }

    /// Codex windows are matched to metrics by their length: five hours and seven days.
    pub fn utilization(&self, metric: Metric) -> Option<f64> {
        let wanted = match metric {
            Metric::FiveHour => FIVE_HOURS_SECS,
            Metric::SevenDay => SEVEN_DAYS_SECS,
            Metric::SevenDaySonnet => return None,
        };
        [&self.primary_window, &self.secondary_window]
            .into_iter()
            .flatten()
            .find(|w| w.limit_window_seconds == Some(wanted))
            .and_then(|w| w.used_percent)
    }
}

/// One Gemini quota bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeminiBucket {
    pub model_id: Option<String>,
    /// Fraction of the quota still available, 0-1
    pub remaining_fraction: Option<f64>,
    pub reset_time: Option<String>,
}

impl GeminiBucket {
    pub fn used_percent(&self) -> Option<f64> {
        self.remaining_fraction.map(|remaining| ((1.0 - remaining) * 100.0).clamp(0.0, 100.0))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeminiUsage {
    pub buckets: Vec<GeminiBucket>,
}

impl GeminiUsage {
    pub fn parse(body: &Value) -> Result<Self, String> {
        let body = object(body)?;
        let buckets = body
            .get("buckets")
            .and_then(Value::as_array)
            .map(|buckets| {
                buckets
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|bucket| GeminiBucket {
                        model_id: text(bucket.get("modelId")),
                        remaining_fraction: number(bucket.get("remainingFraction")),
                        reset_time: text(bucket.get("resetTime")),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self { buckets })
    }
}

/// Normalised usage of one account.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderUsage {
    Claude(ClaudeUsage),
    Codex(CodexUsage),
    Gemini(GeminiUsage),
}

impl ProviderUsage {
    pub fn parse(provider: Provider, body: &Value) -> Result<Self, String> {
        Ok(match provider {
            Provider::Claude => ProviderUsage::Claude(ClaudeUsage::parse(body)?),
            Provider::Codex => ProviderUsage::Codex(CodexUsage::parse(body)?),
            Provider::Gemini => ProviderUsage::Gemini(GeminiUsage::parse(body)?),
        })
    }

    /// Utilization recorded for `metric`, when the provider reports a comparable window.
    pub fn utilization(&self, metric: Metric) -> Option<f64> {
        match self {
            ProviderUsage::Claude(usage) => usage.utilization(metric),
            ProviderUsage::Codex(usage) => usage.utilization(metric),
            ProviderUsage::Gemini(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claude_request_shape() {
        let request = usage_request(Provider::Claude, "idx-1");
        assert_eq!(request.method, "GET");
        assert_eq!(request.url, CLAUDE_USAGE_URL);
        assert_eq!(request.header["anthropic-beta"], "oauth-2025-04-20");
        assert_eq!(request.header["Authorization"], "Bearer $TOKEN$");
        assert!(request.data.is_none());

        let gemini = usage_request(Provider::Gemini, "idx-2");
        assert_eq!(gemini.method, "POST");
        assert_eq!(gemini.data.as_deref(), Some("{}"));
    }

    #[test]
    fn test_claude_parse_is_lenient() {
        let usage = ClaudeUsage::parse(&json!({
            "five_hour": {"utilization": 42, "resets_at": "2026-01-01T00:00:00Z"},
            "seven_day": {"utilization": "high"},
            "seven_day_sonnet": null
        }))
        .unwrap();

        assert_eq!(usage.utilization(Metric::FiveHour), Some(42.0));
        assert_eq!(usage.five_hour.as_ref().unwrap().resets_at.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert!(usage.seven_day.is_some());
        assert_eq!(usage.utilization(Metric::SevenDay), None);
        assert!(usage.seven_day_sonnet.is_none());

        assert!(ClaudeUsage::parse(&json!("not an object")).is_err());
    }

    #[test]
    fn test_codex_windows_map_by_length() {
        let usage = CodexUsage::parse(&json!({
            "plan_type": "plus",
            "rate_limit": {
                "primary_window": {"used_percent": 18.5, "limit_window_seconds": 18000, "reset_after_seconds": 1200},
                "secondary_window": {"used_percent": 61, "limit_window_seconds": 604800, "reset_after_seconds": 90000}
            }
        }))
        .unwrap();

        assert_eq!(usage.plan_type.as_deref(), Some("plus"));
        assert_eq!(usage.utilization(Metric::FiveHour), Some(18.5));
        assert_eq!(usage.utilization(Metric::SevenDay), Some(61.0));
        assert_eq!(usage.utilization(Metric::SevenDaySonnet), None);

        let empty = CodexUsage::parse(&json!({})).unwrap();
        assert!(empty.primary_window.is_none());
    }

    #[test]
    fn test_gemini_buckets() {
        let usage = GeminiUsage::parse(&json!({
            "buckets": [
                {"modelId": "gemini-2.5-pro", "remainingFraction": 0.25, "resetTime": "2026-01-01T00:00:00Z"},
                {"modelId": "gemini-2.5-flash"},
                "junk"
            ]
        }))
        .unwrap();

        assert_eq!(usage.buckets.len(), 2);
        assert_eq!(usage.buckets[0].used_percent(), Some(75.0));
        assert_eq!(usage.buckets[1].remaining_fraction, None);

        let serialized = serde_json::to_value(&usage.buckets[0]).unwrap();
        assert_eq!(serialized["modelId"], "gemini-2.5-pro");
    }
}
