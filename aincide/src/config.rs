//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `AINCIDE_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `AINCIDE_` override YAML values
//! 3. **Well-known variables** - `DATABASE_URL`, `MANAGEMENT_API_URL`, `MANAGEMENT_API_KEY`,
//!    `BOT_SERVER_URL` and `CRON_SECRET` map onto their nested fields
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `AINCIDE_COLLECTOR__SCHEDULE__ENABLED=true` sets `collector.schedule.enabled`.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`, `cors`
//! - **Database**: `database.url`, `database.pool` - SQLite store for usage snapshots
//! - **Management API**: `management.url`, `management.key`, timeouts and hidden accounts
//! - **Bot server**: `bot_server.url`
//! - **Service health**: `service_health.services` - dashboards probed by `/api/proxy/services`
//! - **Collector**: `collector.cron_secret`, `collector.providers`, `collector.retention`,
//!   `collector.schedule`
//! - **Monitor**: `monitor.*` - polling intervals for `aincide monitor`
//! - **Features**: `enable_metrics`, `enable_otel_export`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! AINCIDE_PORT=8080
//! DATABASE_URL="sqlite://data/aincide.db"
//! MANAGEMENT_API_URL="http://cliproxy:8317"
//! MANAGEMENT_API_KEY="mgmt-secret"
//! BOT_SERVER_URL="http://bots:3000"
//! CRON_SECRET="cron-secret"
//! ```

use clap::{Parser, Subcommand};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time::Duration};
use url::Url;

use crate::errors::Error;

/// CLI args - config file location plus an optional subcommand
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "AINCIDE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the proxy API (default)
    Serve,
    /// Poll a running server's status endpoints and log every state change
    Monitor {
        /// Base URL of the server whose proxy endpoints should be polled
        #[arg(long, env = "AINCIDE_SERVER_URL", default_value = "http://localhost:3001")]
        server: Url,
    },
}

/// Main application configuration.
///
/// All fields have sensible defaults defined in the `Default` implementation. An entirely
/// empty configuration is valid: every upstream is then reported as not configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Snapshot store
    pub database: DatabaseConfig,
    /// Management API that lists auth files and replays provider calls per account
    pub management: ManagementConfig,
    /// Bot status server
    pub bot_server: BotServerConfig,
    /// Dashboards whose reachability is reported by `/api/proxy/services`
    pub service_health: ServiceHealthConfig,
    /// Usage collector (cron endpoint and optional in-process schedule)
    pub collector: CollectorConfig,
    /// Polling behaviour of the `monitor` subcommand
    pub monitor: MonitorConfig,
    pub cors: CorsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Pool configuration passed through to SQLx.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Time before idle connections are closed (seconds, 0 = never)
    pub idle_timeout_secs: u64,
    /// Maximum lifetime of a connection (seconds, 0 = never)
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 0,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite connection string; the file is created if missing
    pub url: String,
    pub pool: PoolSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://aincide.db".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

/// Management API configuration.
///
/// Both `url` and `key` are required for the usage, download and collector paths; if either
/// is missing those endpoints answer 503.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagementConfig {
    pub url: Option<Url>,
    #[serde(skip_serializing)]
    pub key: Option<String>,
    /// Bound for proxied reads (auth-file listing for the usage proxy, downloads)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Bound for the collector's auth-file listing
    #[serde(with = "humantime_serde")]
    pub list_timeout: Duration,
    /// Bound for each per-account provider call
    #[serde(with = "humantime_serde")]
    pub api_call_timeout: Duration,
    /// Accounts never shown or collected, matched case-insensitively on email
    pub hidden_emails: Vec<String>,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            request_timeout: Duration::from_secs(5),
            list_timeout: Duration::from_secs(8),
            api_call_timeout: Duration::from_secs(10),
            hidden_emails: Vec::new(),
        }
    }
}

impl ManagementConfig {
    pub fn is_hidden(&self, email: Option<&str>) -> bool {
        email.is_some_and(|email| self.hidden_emails.iter().any(|hidden| hidden.eq_ignore_ascii_case(email.trim())))
    }
}

/// Bot status server configuration. When `url` is unset, `/api/proxy/bot-status` answers an
/// empty list and `/api/proxy/bot-usage` answers 503.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotServerConfig {
    pub url: Option<Url>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for BotServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceHealthConfig {
    /// Per-probe bound
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub services: Vec<ServiceConfig>,
}

impl Default for ServiceHealthConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            services: Vec::new(),
        }
    }
}

/// A dashboard service probed for reachability.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    pub url: Url,
    #[serde(default)]
    pub description: String,
}

/// Usage collector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorConfig {
    /// Shared secret expected as `Authorization: Bearer <secret>` on the cron endpoint.
    /// When unset, the endpoint is open.
    #[serde(skip_serializing)]
    pub cron_secret: Option<String>,
    /// Provider/type labels (case-insensitive) whose accounts are snapshotted
    pub providers: Vec<String>,
    /// Snapshots older than this are deleted after each run
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
    pub schedule: CollectorScheduleConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            cron_secret: None,
            providers: vec!["claude".to_string(), "anthropic".to_string()],
            retention: Duration::from_secs(31 * 24 * 60 * 60),
            schedule: CollectorScheduleConfig::default(),
        }
    }
}

impl CollectorConfig {
    pub fn collects_provider(&self, label: &str) -> bool {
        self.providers.iter().any(|p| p.eq_ignore_ascii_case(label.trim()))
    }
}

/// In-process collection schedule, for deployments without an external cron trigger.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorScheduleConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for CollectorScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(10 * 60),
        }
    }
}

/// Polling configuration for the `monitor` subcommand.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Bound for each proxy or direct fallback request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub usage_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub bot_status_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub bot_usage_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub services_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(4),
            usage_interval: Duration::from_secs(60),
            bot_status_interval: Duration::from_secs(30),
            bot_usage_interval: Duration::from_secs(60),
            services_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    /// Preflight cache duration in seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Url(Url::parse("http://localhost:3000").unwrap())],
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database: DatabaseConfig::default(),
            management: ManagementConfig::default(),
            bot_server: BotServerConfig::default(),
            service_health: ServiceHealthConfig::default(),
            collector: CollectorConfig::default(),
            monitor: MonitorConfig::default(),
            cors: CorsConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), Error> {
        if self.collector.providers.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: collector.providers cannot be empty".to_string(),
            });
        }

        if self.collector.retention < Duration::from_secs(24 * 60 * 60) {
            return Err(Error::Internal {
                operation: "Config validation: collector.retention must be at least one day".to_string(),
            });
        }

        if self.collector.schedule.enabled && self.collector.schedule.interval < Duration::from_secs(60) {
            return Err(Error::Internal {
                operation: "Config validation: collector.schedule.interval must be at least one minute".to_string(),
            });
        }

        if self.database.pool.min_connections > self.database.pool.max_connections {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: database.pool.min_connections ({}) cannot be greater than max_connections ({})",
                    self.database.pool.min_connections, self.database.pool.max_connections
                ),
            });
        }

        let mut names = HashSet::new();
        for service in &self.service_health.services {
            if !names.insert(service.name.as_str()) {
                return Err(Error::Internal {
                    operation: format!("Config validation: duplicate service name '{}'", service.name),
                });
            }
        }

        for timeout in [
            self.management.request_timeout,
            self.management.list_timeout,
            self.management.api_call_timeout,
            self.bot_server.request_timeout,
            self.service_health.timeout,
            self.monitor.request_timeout,
        ] {
            if timeout.is_zero() {
                return Err(Error::Internal {
                    operation: "Config validation: upstream timeouts must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            // (AINCIDE_CONFIG and AINCIDE_SERVER_URL belong to the CLI, not the config tree)
            .merge(Env::prefixed("AINCIDE_").ignore(&["config", "server_url"]).split("__"))
            // Well-known variables shared with the rest of the deployment
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
            .merge(Env::raw().only(&["MANAGEMENT_API_URL"]).map(|_| "management.url".into()))
            .merge(Env::raw().only(&["MANAGEMENT_API_KEY"]).map(|_| "management.key".into()))
            .merge(Env::raw().only(&["BOT_SERVER_URL"]).map(|_| "bot_server.url".into()))
            .merge(Env::raw().only(&["CRON_SECRET"]).map(|_| "collector.cron_secret".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
