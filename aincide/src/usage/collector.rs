//! Usage collector: snapshots account utilization into the store and prunes old snapshots.

use super::{AccountOutcome, AccountTarget, fetch_account_usage};
use crate::config::Config;
use crate::db::handlers::UsageSnapshots;
use crate::db::models::snapshots::NewUsageSnapshot;
use crate::errors::Error;
use crate::types::Metric;
use crate::upstream::ManagementClient;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

/// Result of one collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CollectionSummary {
    /// Snapshots written
    pub collected: u64,
    /// Accounts polled
    pub accounts: usize,
}

/// Run one collection.
///
/// Listing failures abort the run before anything is written. Per-account failures are logged
/// and dropped. All snapshots of a run are inserted in one transaction, after which snapshots
/// older than the retention window are deleted.
#[instrument(skip_all, err)]
pub async fn run_collection(pool: &SqlitePool, http: &reqwest::Client, config: &Config) -> Result<CollectionSummary, Error> {
    let client = ManagementClient::from_config(http.clone(), &config.management)?;
    let entries = client
        .list_auth_files(client.list_timeout())
        .await
        .map_err(Error::unavailable)?;

    let targets: Vec<AccountTarget> = entries
        .iter()
        .filter(|entry| entry.is_pollable(&config.management))
        .filter(|entry| entry.provider_label().is_some_and(|label| config.collector.collects_provider(label)))
        .filter_map(AccountTarget::from_entry)
        .collect();

    let outcomes = join_all(targets.iter().map(|target| fetch_account_usage(&client, target))).await;

    let now = Utc::now();
    let mut snapshots = Vec::new();
    for (target, outcome) in targets.iter().zip(outcomes) {
        match outcome {
            AccountOutcome::Collected(usage) => {
                snapshots.extend(Metric::ALL.into_iter().filter_map(|metric| {
                    usage.utilization(metric).map(|utilization| NewUsageSnapshot {
                        account: target.label().to_string(),
                        metric,
                        utilization,
                        timestamp: now,
                    })
                }));
            }
            AccountOutcome::Failed { reason } => {
                warn!(account = %target.label(), %reason, "Skipping account in usage collection");
            }
        }
    }

    let collected = store(pool, &snapshots, retention_cutoff(now, config)).await?;

    let summary = CollectionSummary {
        collected,
        accounts: targets.len(),
    };
    info!(collected = summary.collected, accounts = summary.accounts, "Usage collection finished");
    Ok(summary)
}

fn retention_cutoff(now: DateTime<Utc>, config: &Config) -> DateTime<Utc> {
    let retention = chrono::Duration::from_std(config.collector.retention).unwrap_or(chrono::Duration::days(31));
    now - retention
}

async fn store(pool: &SqlitePool, snapshots: &[NewUsageSnapshot], cutoff: DateTime<Utc>) -> Result<u64, Error> {
    let mut tx = pool.begin().await?;
    let inserted = UsageSnapshots::new(&mut tx).insert_batch(snapshots).await?;
    tx.commit().await?;

    let mut conn = pool.acquire().await?;
    let purged = UsageSnapshots::new(&mut conn).delete_older_than(cutoff).await?;
    if purged > 0 {
        info!(purged, "Deleted snapshots past the retention window");
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{claude_account, create_test_config, mock_auth_files, mock_usage_body};
    use chrono::Duration;
    use serde_json::json;
    use wiremock::MockServer;

    async fn count_rows(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM usage_snapshots").fetch_one(pool).await.unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_one_claude_account_yields_one_snapshot(pool: SqlitePool) {
        let server = MockServer::start().await;
        mock_auth_files(&server, json!({ "files": [claude_account("a1", "one@example.com")] })).await;
        mock_usage_body(&server, "a1", json!({"five_hour": {"utilization": 42}, "seven_day": null})).await;

        let config = create_test_config(Some(&server), None);
        let summary = run_collection(&pool, &reqwest::Client::new(), &config).await.unwrap();

        assert_eq!(summary, CollectionSummary { collected: 1, accounts: 1 });

        let row: (String, String, f64) = sqlx::query_as("SELECT account, metric, utilization FROM usage_snapshots")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row, ("one@example.com".to_string(), "five_hour".to_string(), 42.0));
    }

    #[sqlx::test]
    async fn test_disabled_and_hidden_accounts_are_excluded(pool: SqlitePool) {
        let server = MockServer::start().await;
        let mut disabled = claude_account("d1", "disabled@example.com");
        disabled["disabled"] = json!(true);
        let mut flagged = claude_account("f1", "flagged@example.com");
        flagged["hidden"] = json!(true);

        mock_auth_files(
            &server,
            json!([
                claude_account("a1", "visible@example.com"),
                claude_account("h1", "Hidden@Example.com"),
                disabled,
                flagged,
                {"auth_index": "x1", "type": "codex", "email": "codex@example.com"}
            ]),
        )
        .await;
        for index in ["a1", "h1", "d1", "f1", "x1"] {
            mock_usage_body(&server, index, json!({"five_hour": {"utilization": 10}, "seven_day": {"utilization": 20}})).await;
        }

        let mut config = create_test_config(Some(&server), None);
        config.management.hidden_emails = vec!["hidden@example.com".to_string()];

        let summary = run_collection(&pool, &reqwest::Client::new(), &config).await.unwrap();
        assert_eq!(summary, CollectionSummary { collected: 2, accounts: 1 });

        let accounts: Vec<String> = sqlx::query_scalar("SELECT DISTINCT account FROM usage_snapshots")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(accounts, vec!["visible@example.com".to_string()]);
    }

    #[sqlx::test]
    async fn test_failed_accounts_are_dropped_silently(pool: SqlitePool) {
        let server = MockServer::start().await;
        mock_auth_files(
            &server,
            json!([claude_account("ok", "ok@example.com"), claude_account("bad", "bad@example.com")]),
        )
        .await;
        mock_usage_body(&server, "ok", json!({"seven_day_sonnet": {"utilization": 7.5}})).await;
        mock_usage_body(&server, "bad", json!("<html>gateway</html>")).await;

        let config = create_test_config(Some(&server), None);
        let summary = run_collection(&pool, &reqwest::Client::new(), &config).await.unwrap();

        assert_eq!(summary, CollectionSummary { collected: 1, accounts: 2 });
        assert_eq!(count_rows(&pool).await, 1);
    }

    #[sqlx::test]
    async fn test_malformed_listing_entries_are_skipped(pool: SqlitePool) {
        let server = MockServer::start().await;
        mock_auth_files(
            &server,
            json!([
                claude_account("a1", "one@example.com"),
                {"auth_index": "b1", "type": "claude", "disabled": "false"}
            ]),
        )
        .await;
        mock_usage_body(&server, "a1", json!({"five_hour": {"utilization": 12}})).await;

        let config = create_test_config(Some(&server), None);
        let summary = run_collection(&pool, &reqwest::Client::new(), &config).await.unwrap();

        assert_eq!(summary, CollectionSummary { collected: 1, accounts: 1 });
        assert_eq!(count_rows(&pool).await, 1);
    }

    #[sqlx::test]
    async fn test_retention_window_is_applied(pool: SqlitePool) {
        let now = Utc::now();
        let mut conn = pool.acquire().await.unwrap();
        UsageSnapshots::new(&mut conn)
            .insert_batch(&[
                NewUsageSnapshot {
                    account: "old@example.com".to_string(),
                    metric: Metric::FiveHour,
                    utilization: 1.0,
                    timestamp: now - Duration::days(32),
                },
                NewUsageSnapshot {
                    account: "recent@example.com".to_string(),
                    metric: Metric::FiveHour,
                    utilization: 2.0,
                    timestamp: now - Duration::days(30),
                },
            ])
            .await
            .unwrap();
        drop(conn);

        let server = MockServer::start().await;
        mock_auth_files(&server, json!({"files": []})).await;

        let config = create_test_config(Some(&server), None);
        let summary = run_collection(&pool, &reqwest::Client::new(), &config).await.unwrap();
        assert_eq!(summary, CollectionSummary { collected: 0, accounts: 0 });

        let accounts: Vec<String> = sqlx::query_scalar("SELECT account FROM usage_snapshots")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(accounts, vec!["recent@example.com".to_string()]);
    }

    #[sqlx::test]
    async fn test_listing_failure_writes_nothing(pool: SqlitePool) {
        let server = MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/v0/management/auth-files"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = create_test_config(Some(&server), None);
        let err = run_collection(&pool, &reqwest::Client::new(), &config).await.unwrap_err();

        assert!(matches!(err, Error::UpstreamUnavailable { .. }));
        assert_eq!(count_rows(&pool).await, 0);
    }

    #[sqlx::test]
    async fn test_unconfigured_management_api(pool: SqlitePool) {
        let config = create_test_config(None, None);
        let err = run_collection(&pool, &reqwest::Client::new(), &config).await.unwrap_err();
        assert!(matches!(err, Error::NotConfigured { .. }));
    }
}
