//! Sources that skip the server and call the upstreams directly, for monitors on the same
//! private network as the upstreams.

use super::source::{DataSource, SourceError};
use crate::{
    api::models::usage::UsageOverview,
    config::{BotServerConfig, ManagementConfig, ServiceConfig},
    upstream::{
        BotServerClient, ManagementClient, ServiceProber,
        bot_server::{BOT_STATUS_SERVER, BOT_USAGE_SERVER, BotStatus, BotUsage},
        services::ServiceHealth,
    },
    usage::aggregate::usage_overview,
};
use async_trait::async_trait;

pub struct DirectUsage {
    client: Option<ManagementClient>,
    config: ManagementConfig,
}

impl DirectUsage {
    pub fn new(http: reqwest::Client, config: ManagementConfig) -> Self {
        Self {
            client: ManagementClient::from_config(http, &config).ok(),
            config,
        }
    }
}

#[async_trait]
impl DataSource<UsageOverview> for DirectUsage {
    fn name(&self) -> &str {
        "direct management API"
    }

    async fn fetch(&self) -> Result<UsageOverview, SourceError> {
        let client = self.client.as_ref().ok_or(SourceError::NotConfigured)?;
        Ok(usage_overview(client, &self.config).await?)
    }
}

pub struct DirectBotStatus {
    client: Option<BotServerClient>,
}

impl DirectBotStatus {
    pub fn new(http: reqwest::Client, config: &BotServerConfig) -> Self {
        Self {
            client: BotServerClient::from_config(http, config, BOT_STATUS_SERVER).ok(),
        }
    }
}

#[async_trait]
impl DataSource<BotStatus> for DirectBotStatus {
    fn name(&self) -> &str {
        "direct bot status server"
    }

    async fn fetch(&self) -> Result<BotStatus, SourceError> {
        let client = self.client.as_ref().ok_or(SourceError::NotConfigured)?;
        Ok(client.status().await?)
    }
}

pub struct DirectBotUsage {
    client: Option<BotServerClient>,
}

impl DirectBotUsage {
    pub fn new(http: reqwest::Client, config: &BotServerConfig) -> Self {
        Self {
            client: BotServerClient::from_config(http, config, BOT_USAGE_SERVER).ok(),
        }
    }
}

#[async_trait]
impl DataSource<BotUsage> for DirectBotUsage {
    fn name(&self) -> &str {
        "direct bot usage server"
    }

    async fn fetch(&self) -> Result<BotUsage, SourceError> {
        let client = self.client.as_ref().ok_or(SourceError::NotConfigured)?;
        Ok(client.usage().await?)
    }
}

/// Probes the locally configured services. Probes never fail, so only an empty service list
/// counts as not configured.
pub struct DirectServices {
    prober: ServiceProber,
    services: Vec<ServiceConfig>,
}

impl DirectServices {
    pub fn new(prober: ServiceProber, services: Vec<ServiceConfig>) -> Self {
        Self { prober, services }
    }
}

#[async_trait]
impl DataSource<Vec<ServiceHealth>> for DirectServices {
    fn name(&self) -> &str {
        "direct service probes"
    }

    async fn fetch(&self) -> Result<Vec<ServiceHealth>, SourceError> {
        if self.services.is_empty() {
            return Err(SourceError::NotConfigured);
        }
        Ok(self.prober.probe_all(&self.services).await)
    }
}
