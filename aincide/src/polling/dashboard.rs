//! The pollers behind the status dashboard.

use super::{
    direct::{DirectBotStatus, DirectBotUsage, DirectServices, DirectUsage},
    poller::{FallbackPolicy, Poller},
    source::{DataSource, HttpSource, SourceChain, SourceError},
};
use crate::{
    api::models::{history::HistoryPoint, usage::UsageOverview},
    config::Config,
    types::{HistoryRange, Metric},
    upstream::{
        ServiceProber, UpstreamError,
        bot_server::{BotStatus, BotUsage},
        endpoint,
        services::ServiceHealth,
    },
};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use url::Url;

const STATUS_SERVER: &str = "Status server";

/// One poller per dashboard panel, each trying the server's proxy endpoint first and the
/// upstream directly second.
///
/// | key         | proxy endpoint          | policy        |
/// |-------------|-------------------------|---------------|
/// | usage       | `/api/proxy/usage`      | `Distinguish` |
/// | bot-status  | `/api/proxy/bot-status` | `Default`     |
/// | bot-usage   | `/api/proxy/bot-usage`  | `Distinguish` |
/// | services    | `/api/proxy/services`   | `Default`     |
pub struct Dashboard {
    pub usage: Arc<Poller<UsageOverview>>,
    pub bot_status: Arc<Poller<BotStatus>>,
    pub bot_usage: Arc<Poller<BotUsage>>,
    pub services: Arc<Poller<Vec<ServiceHealth>>>,
    http: reqwest::Client,
    server: Url,
    timeout: Duration,
}

impl Dashboard {
    /// Build the pollers against `server`. Direct fallbacks use the upstreams configured
    /// locally, bounded by `monitor.request_timeout`.
    pub fn new(server: &Url, config: &Config, http: reqwest::Client) -> Result<Self, UpstreamError> {
        let monitor = &config.monitor;
        let timeout = monitor.request_timeout;
        let proxy = |path: &str| -> Result<Url, UpstreamError> { endpoint(STATUS_SERVER, server, path) };

        let mut management = config.management.clone();
        management.request_timeout = timeout;
        management.api_call_timeout = timeout;
        let mut bot_server = config.bot_server.clone();
        bot_server.request_timeout = timeout;

        let usage = SourceChain::new()
            .with(HttpSource::new("proxy usage", http.clone(), proxy("api/proxy/usage")?, timeout))
            .with(DirectUsage::new(http.clone(), management));
        let bot_status = SourceChain::new()
            .with(HttpSource::new("proxy bot status", http.clone(), proxy("api/proxy/bot-status")?, timeout))
            .with(DirectBotStatus::new(http.clone(), &bot_server));
        let bot_usage = SourceChain::new()
            .with(HttpSource::new("proxy bot usage", http.clone(), proxy("api/proxy/bot-usage")?, timeout))
            .with(DirectBotUsage::new(http.clone(), &bot_server));
        let services = SourceChain::new()
            .with(HttpSource::new("proxy services", http.clone(), proxy("api/proxy/services")?, timeout))
            .with(DirectServices::new(
                ServiceProber::new(http.clone(), config.service_health.timeout.min(timeout)),
                config.service_health.services.clone(),
            ));

        Ok(Self {
            usage: Arc::new(Poller::new("usage", usage, monitor.usage_interval, FallbackPolicy::Distinguish)),
            bot_status: Arc::new(Poller::new(
                "bot-status",
                bot_status,
                monitor.bot_status_interval,
                FallbackPolicy::Default,
            )),
            bot_usage: Arc::new(Poller::new(
                "bot-usage",
                bot_usage,
                monitor.bot_usage_interval,
                FallbackPolicy::Distinguish,
            )),
            services: Arc::new(Poller::new("services", services, monitor.services_interval, FallbackPolicy::Default)),
            http,
            server: server.clone(),
            timeout,
        })
    }

    /// Start every poller; they stop when `shutdown` is cancelled.
    pub fn spawn(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.usage.clone().run(shutdown.child_token())),
            tokio::spawn(self.bot_status.clone().run(shutdown.child_token())),
            tokio::spawn(self.bot_usage.clone().run(shutdown.child_token())),
            tokio::spawn(self.services.clone().run(shutdown.child_token())),
        ]
    }

    /// Refresh every panel once.
    pub async fn refresh_all(&self) {
        tokio::join!(
            self.usage.refresh(),
            self.bot_status.refresh(),
            self.bot_usage.refresh(),
            self.services.refresh(),
        );
    }

    /// One-shot history fetch for a chart. There is no direct fallback: history lives only in
    /// the server's store.
    #[instrument(skip(self), err)]
    pub async fn usage_history(&self, account: &str, metric: Metric, range: HistoryRange) -> Result<Vec<HistoryPoint>, SourceError> {
        let mut url = endpoint(STATUS_SERVER, &self.server, "api/proxy/usage-history")?;
        url.query_pairs_mut()
            .append_pair("account", account)
            .append_pair("metric", metric.as_str())
            .append_pair("range", range.token());

        HttpSource::<Vec<HistoryPoint>>::new("proxy usage history", self.http.clone(), url, self.timeout).fetch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        polling::poller::{PollError, PollStatus},
        test_utils::mock_url,
    };
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    fn config() -> Config {
        let mut config = Config::default();
        config.monitor.request_timeout = Duration::from_millis(500);
        config
    }

    #[tokio::test]
    async fn test_proxy_answers_are_published() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/proxy/usage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accounts": [{"name": "a.json", "email": "a@example.com", "authIndex": "1"}],
                "codex": [],
                "gemini": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/proxy/bot-status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bots": [], "serverUptime": 3})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/proxy/bot-usage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accounts": [{"id": 1}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/proxy/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "grafana", "url": "http://grafana:3000/", "status": "online", "description": ""}
            ])))
            .mount(&server)
            .await;

        let dashboard = Dashboard::new(&mock_url(&server), &config(), reqwest::Client::new()).unwrap();
        dashboard.refresh_all().await;

        let usage = dashboard.usage.state();
        assert_eq!(usage.status(), PollStatus::Ready);
        assert_eq!(usage.data.unwrap().accounts[0].email.as_deref(), Some("a@example.com"));
        assert_eq!(dashboard.bot_status.state().data.unwrap().server_uptime, 3.0);
        assert_eq!(dashboard.bot_usage.state().data.unwrap().accounts.len(), 1);
        assert_eq!(dashboard.services.state().data.unwrap()[0].name, "grafana");
    }

    #[tokio::test]
    async fn test_unconfigured_server_and_upstreams() {
        let server = MockServer::start().await;
        for endpoint in ["/api/proxy/usage", "/api/proxy/bot-usage"] {
            Mock::given(method("GET"))
                .and(path(endpoint))
                .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "not configured"})))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/api/proxy/bot-status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bots": [], "serverUptime": 0})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/proxy/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let dashboard = Dashboard::new(&mock_url(&server), &config(), reqwest::Client::new()).unwrap();
        dashboard.refresh_all().await;

        assert_eq!(dashboard.usage.state().status(), PollStatus::NotConfigured);
        assert_eq!(dashboard.bot_usage.state().status(), PollStatus::NotConfigured);
        assert_eq!(dashboard.bot_status.state().data, Some(BotStatus::default()));
        assert_eq!(dashboard.services.state().data, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_falls_back_to_direct_bot_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let bots = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/usage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accounts": [{"id": "direct"}]})))
            .mount(&bots)
            .await;

        let mut config = config();
        config.bot_server.url = Some(mock_url(&bots));
        let dashboard = Dashboard::new(&mock_url(&server), &config, reqwest::Client::new()).unwrap();

        dashboard.bot_usage.refresh().await;
        assert_eq!(dashboard.bot_usage.state().data.unwrap().accounts[0]["id"], "direct");

        // Proxy down and no management API configured locally: unavailable, not unconfigured
        dashboard.usage.refresh().await;
        let state = dashboard.usage.state();
        assert_eq!(state.status(), PollStatus::Unavailable);
        assert!(matches!(state.error, Some(PollError::Unavailable(ref reason)) if reason.contains("HTTP 502")));

        // Bot status resolves to an empty payload rather than an error
        dashboard.bot_status.refresh().await;
        assert_eq!(dashboard.bot_status.state().data, Some(BotStatus::default()));
    }

    #[tokio::test]
    async fn test_usage_history_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/proxy/usage-history"))
            .and(query_param("account", "a@example.com"))
            .and(query_param("metric", "seven_day"))
            .and(query_param("range", "7d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"timestamp": 1_700_000_000_000i64, "utilization": 10.0},
                {"timestamp": 1_700_000_060_000i64, "utilization": 12.5}
            ])))
            .mount(&server)
            .await;

        let dashboard = Dashboard::new(&mock_url(&server), &config(), reqwest::Client::new()).unwrap();
        let points = dashboard
            .usage_history("a@example.com", Metric::SevenDay, HistoryRange::Week)
            .await
            .unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[1].utilization, 12.5);
    }
}
