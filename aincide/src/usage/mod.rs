//! AI account usage: fetching, normalising, aggregating and recording.
//!
//! Per-account failures never fail the surrounding operation. Each account yields an
//! [`AccountOutcome`], which callers log and either report inline ([`aggregate`]) or drop
//! ([`collector`]).

pub mod aggregate;
pub mod collector;
pub mod providers;
pub mod scheduler;

use crate::types::Provider;
use crate::upstream::ManagementClient;
use crate::upstream::management::AuthFileEntry;
use providers::{ProviderUsage, usage_request};
use tracing::instrument;

/// Outcome of fetching usage for one account.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountOutcome<T> {
    Collected(T),
    Failed { reason: String },
}

impl<T> AccountOutcome<T> {
    pub fn failed(reason: impl Into<String>) -> Self {
        AccountOutcome::Failed { reason: reason.into() }
    }
}

/// An account selected for polling.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountTarget {
    pub provider: Provider,
    pub auth_index: String,
    pub name: String,
    pub email: Option<String>,
}

impl AccountTarget {
    /// `None` for entries without an `auth_index` or with an unknown provider.
    pub fn from_entry(entry: &AuthFileEntry) -> Option<Self> {
        Some(Self {
            provider: Provider::from_label(entry.provider_label()?)?,
            auth_index: entry.auth_index.clone()?,
            name: entry.name.clone(),
            email: entry.email.clone(),
        })
    }

    /// Label used in logs: the email when known, otherwise the auth file name.
    pub fn label(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.name)
    }
}

/// Replay the provider's usage request for one account and normalise the answer.
#[instrument(skip(client, target), fields(provider = %target.provider, account = %target.label()))]
pub async fn fetch_account_usage(client: &ManagementClient, target: &AccountTarget) -> AccountOutcome<ProviderUsage> {
    let request = usage_request(target.provider, &target.auth_index);

    let response = match client.api_call(&request).await {
        Ok(response) => response,
        Err(e) => return AccountOutcome::failed(e.to_string()),
    };

    match response.into_json().and_then(|body| ProviderUsage::parse(target.provider, &body)) {
        Ok(usage) => AccountOutcome::Collected(usage),
        Err(reason) => AccountOutcome::failed(reason),
    }
}
