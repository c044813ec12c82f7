//! Database repository for usage snapshots.

use crate::{
    db::{
        errors::Result,
        models::snapshots::{NewUsageSnapshot, UsageSnapshot, UsageSnapshotRow},
    },
    types::Metric,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;

/// Rows per INSERT statement, keeping well under SQLite's bound-parameter limit.
const INSERT_CHUNK_ROWS: usize = 500;

pub struct UsageSnapshots<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> UsageSnapshots<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Append snapshots. Run inside a transaction to make the batch atomic.
    #[instrument(skip(self, snapshots), fields(count = snapshots.len()), err)]
    pub async fn insert_batch(&mut self, snapshots: &[NewUsageSnapshot]) -> Result<u64> {
        let mut inserted = 0;

        for chunk in snapshots.chunks(INSERT_CHUNK_ROWS) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO usage_snapshots (account, metric, utilization, recorded_at_ms) ");
            query.push_values(chunk, |mut row, snapshot| {
                row.push_bind(snapshot.account.clone())
                    .push_bind(snapshot.metric.as_str())
                    .push_bind(snapshot.utilization)
                    .push_bind(snapshot.timestamp.timestamp_millis());
            });

            inserted += query.build().execute(&mut *self.db).await?.rows_affected();
        }

        Ok(inserted)
    }

    /// Delete every snapshot recorded strictly before `cutoff`.
    #[instrument(skip(self), err)]
    pub async fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM usage_snapshots WHERE recorded_at_ms < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Snapshots for one account and metric at or after `since`, oldest first.
    #[instrument(skip(self), err)]
    pub async fn list_since(&mut self, account: &str, metric: Metric, since: DateTime<Utc>) -> Result<Vec<UsageSnapshot>> {
        let rows = sqlx::query_as::<_, UsageSnapshotRow>(
            r#"
            SELECT id, account, metric, utilization, recorded_at_ms
            FROM usage_snapshots
            WHERE account = ? AND metric = ? AND recorded_at_ms >= ?
            ORDER BY recorded_at_ms ASC, id ASC
            "#,
        )
        .bind(account)
        .bind(metric.as_str())
        .bind(since.timestamp_millis())
        .fetch_all(&mut *self.db)
        .await?;

        rows.into_iter().map(UsageSnapshot::try_from).collect()
    }
}
