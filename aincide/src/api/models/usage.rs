use crate::usage::AccountTarget;
use crate::usage::providers::{ClaudeUsage, CodexUsage, CodexWindow, GeminiBucket, GeminiUsage, UsageWindow};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Usage of one Claude account. When the per-account call failed, the windows are absent and
/// `error` says why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClaudeAccountUsage {
    pub name: String,
    pub email: Option<String>,
    #[serde(rename = "authIndex")]
    pub auth_index: String,
    pub five_hour: Option<UsageWindow>,
    pub seven_day: Option<UsageWindow>,
    pub seven_day_sonnet: Option<UsageWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClaudeAccountUsage {
    pub fn new(target: &AccountTarget, usage: Option<ClaudeUsage>, error: Option<String>) -> Self {
        let usage = usage.unwrap_or_default();
        Self {
            name: target.name.clone(),
            email: target.email.clone(),
            auth_index: target.auth_index.clone(),
            five_hour: usage.five_hour,
            seven_day: usage.seven_day,
            seven_day_sonnet: usage.seven_day_sonnet,
            error,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CodexAccountUsage {
    pub name: String,
    pub email: Option<String>,
    #[serde(rename = "authIndex")]
    pub auth_index: String,
    pub plan_type: Option<String>,
    pub primary_window: Option<CodexWindow>,
    pub secondary_window: Option<CodexWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CodexAccountUsage {
    pub fn new(target: &AccountTarget, usage: Option<CodexUsage>, error: Option<String>) -> Self {
        let usage = usage.unwrap_or_default();
        Self {
            name: target.name.clone(),
            email: target.email.clone(),
            auth_index: target.auth_index.clone(),
            plan_type: usage.plan_type,
            primary_window: usage.primary_window,
            secondary_window: usage.secondary_window,
            error,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeminiAccountUsage {
    pub name: String,
    pub email: Option<String>,
    #[serde(rename = "authIndex")]
    pub auth_index: String,
    pub buckets: Vec<GeminiBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeminiAccountUsage {
    pub fn new(target: &AccountTarget, usage: Option<GeminiUsage>, error: Option<String>) -> Self {
        Self {
            name: target.name.clone(),
            email: target.email.clone(),
            auth_index: target.auth_index.clone(),
            buckets: usage.map(|u| u.buckets).unwrap_or_default(),
            error,
        }
    }
}

/// Response of `GET /api/proxy/usage`. Every list is present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UsageOverview {
    /// Claude accounts
    #[serde(default)]
    pub accounts: Vec<ClaudeAccountUsage>,
    #[serde(default)]
    pub codex: Vec<CodexAccountUsage>,
    #[serde(default)]
    pub gemini: Vec<GeminiAccountUsage>,
}
