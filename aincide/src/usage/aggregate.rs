//! Usage overview served by `GET /api/proxy/usage`.

use super::{AccountOutcome, AccountTarget, fetch_account_usage, providers::ProviderUsage};
use crate::api::models::usage::{ClaudeAccountUsage, CodexAccountUsage, GeminiAccountUsage, UsageOverview};
use crate::config::ManagementConfig;
use crate::types::Provider;
use crate::upstream::{ManagementClient, UpstreamError};
use futures::future::join_all;
use tracing::{info, instrument, warn};

/// List accounts, query every enabled, visible account of a known provider concurrently and
/// group the results by provider.
///
/// Only the listing can fail the overview. A failed account is reported inline with an `error`.
#[instrument(skip_all, err)]
pub async fn usage_overview(client: &ManagementClient, config: &ManagementConfig) -> Result<UsageOverview, UpstreamError> {
    let entries = client.list_auth_files(client.request_timeout()).await?;

    let targets: Vec<AccountTarget> = entries
        .iter()
        .filter(|entry| entry.is_pollable(config))
        .filter_map(AccountTarget::from_entry)
        .collect();

    let outcomes = join_all(targets.iter().map(|target| fetch_account_usage(client, target))).await;

    let mut overview = UsageOverview::default();
    let mut failed = 0;

    for (target, outcome) in targets.iter().zip(outcomes) {
        let (usage, error) = match outcome {
            AccountOutcome::Collected(usage) => (Some(usage), None),
            AccountOutcome::Failed { reason } => {
                warn!(provider = %target.provider, account = %target.label(), %reason, "Usage fetch failed");
                failed += 1;
                (None, Some(reason))
            }
        };

        match (target.provider, usage) {
            (_, Some(ProviderUsage::Claude(usage))) => overview.accounts.push(ClaudeAccountUsage::new(target, Some(usage), error)),
            (_, Some(ProviderUsage::Codex(usage))) => overview.codex.push(CodexAccountUsage::new(target, Some(usage), error)),
            (_, Some(ProviderUsage::Gemini(usage))) => overview.gemini.push(GeminiAccountUsage::new(target, Some(usage), error)),
            (Provider::Claude, None) => overview.accounts.push(ClaudeAccountUsage::new(target, None, error)),
            (Provider::Codex, None) => overview.codex.push(CodexAccountUsage::new(target, None, error)),
            (Provider::Gemini, None) => overview.gemini.push(GeminiAccountUsage::new(target, None, error)),
        }
    }

    info!(accounts = targets.len(), failed, "Usage overview assembled");
    Ok(overview)
}
