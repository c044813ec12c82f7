//! Common type definitions shared across the proxy, collector and polling layers.
//!
//! - [`Metric`]: the rate-limit windows recorded as usage snapshots
//! - [`HistoryRange`]: named lookback windows accepted by the history endpoint
//! - [`Provider`]: AI providers whose accounts the management API can report usage for

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// A rate-limit window whose utilization is recorded in usage snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    FiveHour,
    SevenDay,
    SevenDaySonnet,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::FiveHour, Metric::SevenDay, Metric::SevenDaySonnet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::FiveHour => "five_hour",
            Metric::SevenDay => "seven_day",
            Metric::SevenDaySonnet => "seven_day_sonnet",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "five_hour" => Ok(Metric::FiveHour),
            "seven_day" => Ok(Metric::SevenDay),
            "seven_day_sonnet" => Ok(Metric::SevenDaySonnet),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}

/// Lookback window for usage history queries.
///
/// Unknown or missing tokens resolve to [`HistoryRange::Day`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum HistoryRange {
    #[serde(rename = "5h")]
    FiveHours,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl HistoryRange {
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some("5h") => HistoryRange::FiveHours,
            Some("7d") => HistoryRange::Week,
            Some("30d") => HistoryRange::Month,
            _ => HistoryRange::Day,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            HistoryRange::FiveHours => "5h",
            HistoryRange::Day => "24h",
            HistoryRange::Week => "7d",
            HistoryRange::Month => "30d",
        }
    }

    pub fn window(&self) -> Duration {
        match self {
            HistoryRange::FiveHours => Duration::hours(5),
            HistoryRange::Day => Duration::hours(24),
            HistoryRange::Week => Duration::days(7),
            HistoryRange::Month => Duration::days(30),
        }
    }
}

/// Provider families the usage proxy knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Codex,
    Gemini,
}

impl Provider {
    /// Resolve a management API provider/type string, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Some(Provider::Claude),
            "codex" | "openai" => Some(Provider::Codex),
            "gemini" | "gemini-cli" => Some(Provider::Gemini),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Claude => f.write_str("claude"),
            Provider::Codex => f.write_str("codex"),
            Provider::Gemini => f.write_str("gemini"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_parses_only_known_names() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>().unwrap(), metric);
        }
        assert!("FIVE_HOUR".parse::<Metric>().is_err());
        assert!("weekly".parse::<Metric>().is_err());
    }

    #[test]
    fn history_range_falls_back_to_a_day() {
        assert_eq!(HistoryRange::from_token(Some("5h")).window(), Duration::hours(5));
        assert_eq!(HistoryRange::from_token(Some("30d")).window(), Duration::days(30));
        assert_eq!(HistoryRange::from_token(Some("1y")), HistoryRange::Day);
        assert_eq!(HistoryRange::from_token(None), HistoryRange::Day);
    }

    #[test]
    fn provider_labels_are_case_insensitive() {
        assert_eq!(Provider::from_label("Claude"), Some(Provider::Claude));
        assert_eq!(Provider::from_label(" ANTHROPIC "), Some(Provider::Claude));
        assert_eq!(Provider::from_label("gemini-cli"), Some(Provider::Gemini));
        assert_eq!(Provider::from_label("qwen"), None);
    }
}
