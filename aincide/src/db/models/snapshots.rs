use crate::db::errors::DbError;
use crate::types::Metric;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Raw `usage_snapshots` row.
#[derive(Debug, Clone, FromRow)]
pub struct UsageSnapshotRow {
    pub id: i64,
    pub account: String,
    pub metric: String,
    pub utilization: f64,
    pub recorded_at_ms: i64,
}

/// One timestamped utilization reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub id: i64,
    pub account: String,
    pub metric: Metric,
    /// Percentage of the window consumed, 0-100
    pub utilization: f64,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<UsageSnapshotRow> for UsageSnapshot {
    type Error = DbError;

    fn try_from(row: UsageSnapshotRow) -> Result<Self, Self::Error> {
        let metric = row
            .metric
            .parse::<Metric>()
            .map_err(|e| DbError::Other(anyhow::anyhow!("row {}: {}", row.id, e)))?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(row.recorded_at_ms)
            .ok_or_else(|| DbError::Other(anyhow::anyhow!("row {}: timestamp out of range", row.id)))?;

        Ok(Self {
            id: row.id,
            account: row.account,
            metric,
            utilization: row.utilization,
            timestamp,
        })
    }
}

/// A snapshot waiting to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUsageSnapshot {
    pub account: String,
    pub metric: Metric,
    pub utilization: f64,
    pub timestamp: DateTime<Utc>,
}
