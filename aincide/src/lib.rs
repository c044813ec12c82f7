//! # aincide: status aggregation for the AIncide dashboard
//!
//! `aincide` proxies and aggregates operational telemetry for the AIncide community dashboard:
//! rate-limit usage of AI-provider accounts (via a management API that holds their credentials),
//! bot online/offline state (via a bot status server) and reachability of auxiliary dashboard
//! services. It also records usage snapshots on a schedule so the dashboard can chart history.
//!
//! ## Overview
//!
//! Every upstream is optional. When one is not configured, the endpoints wrapping it degrade in a
//! per-endpoint way: the bot status endpoint answers an empty payload, the others answer 503 with
//! an `{"error"}` body so the UI can tell "not set up" apart from "broken" (502/504). Failures are
//! caught at the narrowest scope: one account or one service failing never fails an aggregate.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); usage snapshots are stored in
//! SQLite through SQLx.
//!
//! - [`upstream`]: bounded-timeout clients for the management API, the bot server and service probes
//! - [`usage`]: provider normalisation, the usage overview, the collector and its schedule
//! - [`api`]: proxy, history and cron handlers
//! - [`db`]: the snapshot repository
//! - [`polling`]: the client side, a dashboard of pollers with ordered fallback sources
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use aincide::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = aincide::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     aincide::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Database Setup
//!
//! Migrations run automatically in [`Application::new`]; they can also be run by hand:
//!
//! ```no_run
//! # use sqlx::SqlitePool;
//! # async fn example(pool: SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
//! aincide::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
pub mod api;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod polling;
pub mod telemetry;
pub mod types;
pub mod upstream;
pub mod usage;

#[cfg(test)]
pub mod test_utils;

use crate::{config::CorsOrigin, openapi::ApiDoc, usage::scheduler::CollectorScheduler};
use axum::{
    Router,
    http::{self, HeaderValue},
    middleware::map_response,
    routing::get,
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
///
/// - `db`: snapshot store pool, opened and closed by [`Application`]
/// - `config`: application configuration
/// - `http`: shared HTTP client for every upstream; deadlines are set per call
///
/// ```ignore
/// let state = AppState::builder().db(pool).config(config).http(reqwest::Client::new()).build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub http: reqwest::Client,
}

/// Get the aincide database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .expose_headers(vec![http::header::CONTENT_DISPOSITION]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router.
///
/// - `/healthz`
/// - `/api/proxy/*` and `/api/cron/collect-usage`, all marked `Cache-Control: no-store`
/// - `/api/docs` (Scalar) and `/api/openapi.json`
/// - `/internal/metrics` when `enable_metrics` is set
///
/// CORS and request tracing wrap everything.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::{cron, history, proxy};

    let api_routes = Router::new()
        .route("/proxy/usage", get(proxy::usage))
        .route("/proxy/bot-status", get(proxy::bot_status))
        .route("/proxy/bot-usage", get(proxy::bot_usage))
        .route("/proxy/auth-files/download", get(proxy::download_auth_file))
        .route("/proxy/services", get(proxy::services))
        .route("/proxy/usage-history", get(history::usage_history))
        .route("/cron/collect-usage", get(cron::collect_usage).post(cron::collect_usage))
        .layer(map_response(api::handlers::no_store))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/api/docs", ApiDoc::openapi()));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks running alongside the HTTP server.
///
/// Currently only the optional collector schedule. When dropped, the `drop_guard` cancels the
/// shutdown token so tasks stop with their owner.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }

    pub fn task_count(&self) -> usize {
        self.background_tasks.len()
    }
}

fn setup_background_services(state: &AppState, shutdown_token: CancellationToken) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    if state.config.collector.schedule.enabled {
        let scheduler = CollectorScheduler::new(state.db.clone(), state.http.clone(), state.config.clone());
        background_tasks.push(tokio::spawn(scheduler.run(shutdown_token.clone())));
    } else {
        debug!("Collector schedule disabled; usage is collected only via /api/cron/collect-usage");
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] opens the snapshot store, runs migrations and starts
///    background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: when the shutdown future resolves, background services stop, the pool is
///    closed and telemetry is flushed
pub struct Application {
    router: Router,
    config: Config,
    pool: SqlitePool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create an application around an existing pool (tests), or open one from configuration.
    pub async fn new_with_pool(config: Config, pool: Option<SqlitePool>) -> anyhow::Result<Self> {
        debug!(bind = %config.bind_address(), database = %config.database.url, "Starting aincide");

        let pool = match pool {
            Some(pool) => pool,
            None => db::connect(&config.database).await?,
        };
        migrator().run(&pool).await?;

        let http = reqwest::Client::builder().build()?;
        let app_state = AppState::builder().db(pool.clone()).config(config.clone()).http(http).build();

        let bg_services = setup_background_services(&app_state, CancellationToken::new());
        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "aincide listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
