//! `aincide monitor`: runs the dashboard pollers against a server and logs state changes.

use super::{
    dashboard::Dashboard,
    poller::{PollState, PollStatus, Poller},
};
use crate::{
    api::models::usage::UsageOverview,
    config::Config,
    upstream::{
        bot_server::{BotState, BotStatus, BotUsage},
        services::{ServiceHealth, ServiceStatus},
    },
};
use std::{future::Future, sync::Arc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// One-line description of a published value, for logs.
pub trait Summary {
    fn summary(&self) -> String;
}

impl Summary for UsageOverview {
    fn summary(&self) -> String {
        let failed = self.accounts.iter().filter(|a| a.error.is_some()).count()
            + self.codex.iter().filter(|a| a.error.is_some()).count()
            + self.gemini.iter().filter(|a| a.error.is_some()).count();
        format!(
            "{} claude, {} codex, {} gemini accounts ({} failed)",
            self.accounts.len(),
            self.codex.len(),
            self.gemini.len(),
            failed
        )
    }
}

impl Summary for BotStatus {
    fn summary(&self) -> String {
        let online = self.bots.iter().filter(|b| b.status == BotState::Online).count();
        format!("{online}/{} bots online", self.bots.len())
    }
}

impl Summary for BotUsage {
    fn summary(&self) -> String {
        format!("{} bot accounts", self.accounts.len())
    }
}

impl Summary for Vec<ServiceHealth> {
    fn summary(&self) -> String {
        let offline: Vec<_> = self
            .iter()
            .filter(|s| s.status == ServiceStatus::Offline)
            .map(|s| s.name.as_str())
            .collect();
        if offline.is_empty() {
            format!("{} services online", self.len())
        } else {
            format!("{}/{} services offline: {}", offline.len(), self.len(), offline.join(", "))
        }
    }
}

/// What is logged for a state: its status and, when ready, the summary of its data.
pub fn describe<T: Summary>(state: &PollState<T>) -> (PollStatus, Option<String>) {
    let summary = match state.status() {
        PollStatus::Ready => state.data.as_ref().map(Summary::summary),
        _ => None,
    };
    (state.status(), summary)
}

/// Log each change of `poller`'s status or summary until shutdown.
async fn watch_poller<T>(poller: Arc<Poller<T>>, mut updates: watch::Receiver<PollState<T>>, shutdown: CancellationToken)
where
    T: Summary + Default + Clone + Send + Sync + 'static,
{
    let mut last: Option<(PollStatus, Option<String>)> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let current = describe(&updates.borrow_and_update());
        if current.0 == PollStatus::Loading || last.as_ref() == Some(&current) {
            continue;
        }

        match &current {
            (PollStatus::Ready, summary) => {
                info!(key = poller.key(), summary = summary.as_deref().unwrap_or_default(), "Ready")
            }
            (PollStatus::NotConfigured, _) => info!(key = poller.key(), "Not configured"),
            (status, _) => {
                let error = poller.state().error.map(|e| e.to_string()).unwrap_or_default();
                warn!(key = poller.key(), ?status, %error, "Unavailable");
            }
        }
        last = Some(current);
    }
}

/// Poll `server` until `shutdown` resolves.
pub async fn run<F>(server: Url, config: Config, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let http = reqwest::Client::builder().build()?;
    let dashboard = Dashboard::new(&server, &config, http)?;
    info!(%server, "Monitoring status endpoints");

    // Subscribe before the pollers start so that the first result is not missed
    let token = CancellationToken::new();
    let mut tasks = vec![
        tokio::spawn(watch_poller(dashboard.usage.clone(), dashboard.usage.subscribe(), token.clone())),
        tokio::spawn(watch_poller(dashboard.bot_status.clone(), dashboard.bot_status.subscribe(), token.clone())),
        tokio::spawn(watch_poller(dashboard.bot_usage.clone(), dashboard.bot_usage.subscribe(), token.clone())),
        tokio::spawn(watch_poller(dashboard.services.clone(), dashboard.services.subscribe(), token.clone())),
    ];
    tasks.extend(dashboard.spawn(&token));

    shutdown.await;
    token.cancel();
    for task in tasks {
        let _ = task.await;
    }

    info!("Monitor stopped");
    Ok(())
}
