use crate::db::models::snapshots::UsageSnapshot;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for `GET /api/proxy/usage-history`
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Account label (email, or auth file name when the account has no email)
    pub account: Option<String>,
    /// One of `five_hour`, `seven_day`, `seven_day_sonnet`
    pub metric: Option<String>,
    /// One of `5h`, `24h`, `7d`, `30d`; anything else means `24h`
    pub range: Option<String>,
}

/// One point of a usage history series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryPoint {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub utilization: f64,
}

impl From<UsageSnapshot> for HistoryPoint {
    fn from(snapshot: UsageSnapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp.timestamp_millis(),
            utilization: snapshot.utilization,
        }
    }
}
