//! Proxy endpoints wrapping one upstream each.
//!
//! Unconfigured upstreams are reported per endpoint: the bot status endpoint answers an empty
//! payload, everything else answers 503. Responses are never cached (see
//! [`crate::api::handlers::no_store`]).

use crate::{
    AppState,
    api::models::{
        BotStatus, BotUsage, ServiceHealth,
        proxy::DownloadQuery,
        usage::UsageOverview,
    },
    errors::{Error, Result},
    upstream::{
        BotServerClient, ManagementClient, ServiceProber,
        bot_server::{BOT_STATUS_SERVER, BOT_USAGE_SERVER},
    },
    usage::aggregate::usage_overview,
};
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

const FALLBACK_FILENAME: &str = "auth-file.json";

#[utoipa::path(
    get,
    path = "/api/proxy/usage",
    tag = "proxy",
    summary = "AI account usage",
    description = "Rate-limit usage of every enabled, visible account known to the management API, grouped by provider. \
                   Accounts whose usage could not be fetched carry an `error` instead of usage windows.",
    responses(
        (status = 200, description = "Usage per account", body = UsageOverview),
        (status = 502, description = "Management API unreachable"),
        (status = 503, description = "Management API not configured"),
    )
)]
#[instrument(skip_all, err)]
pub async fn usage(State(state): State<AppState>) -> Result<Json<UsageOverview>> {
    let management = &state.config.management;
    let client = ManagementClient::from_config(state.http.clone(), management)?;
    let overview = usage_overview(&client, management).await.map_err(Error::unavailable)?;
    Ok(Json(overview))
}

#[utoipa::path(
    get,
    path = "/api/proxy/bot-status",
    tag = "proxy",
    summary = "Bot status",
    description = "Online state of every bot. Answers an empty list when no bot server is configured.",
    responses(
        (status = 200, description = "Bot status", body = BotStatus),
        (status = 502, description = "Bot status server unreachable"),
        (status = 504, description = "Bot status server timed out"),
    )
)]
#[instrument(skip_all, err)]
pub async fn bot_status(State(state): State<AppState>) -> Result<Json<BotStatus>> {
    let client = match BotServerClient::from_config(state.http.clone(), &state.config.bot_server, BOT_STATUS_SERVER) {
        Ok(client) => client,
        Err(_) => {
            debug!("Bot server not configured, answering empty status");
            return Ok(Json(BotStatus::default()));
        }
    };

    Ok(Json(client.status().await?))
}

#[utoipa::path(
    get,
    path = "/api/proxy/bot-usage",
    tag = "proxy",
    summary = "Bot usage",
    responses(
        (status = 200, description = "Bot usage accounts", body = BotUsage),
        (status = 502, description = "Bot usage server unreachable"),
        (status = 503, description = "Bot usage server not configured"),
        (status = 504, description = "Bot usage server timed out"),
    )
)]
#[instrument(skip_all, err)]
pub async fn bot_usage(State(state): State<AppState>) -> Result<Json<BotUsage>> {
    let client = BotServerClient::from_config(state.http.clone(), &state.config.bot_server, BOT_USAGE_SERVER)?;
    Ok(Json(client.usage().await?))
}

#[utoipa::path(
    get,
    path = "/api/proxy/auth-files/download",
    tag = "proxy",
    summary = "Download auth file",
    description = "Streams an auth file from the management API as an attachment.",
    params(DownloadQuery),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 400, description = "Missing name"),
        (status = 502, description = "Management API unreachable"),
        (status = 503, description = "Management API not configured"),
    )
)]
#[instrument(skip_all, fields(name = ?query.name), err)]
pub async fn download_auth_file(State(state): State<AppState>, Query(query): Query<DownloadQuery>) -> Result<Response> {
    let name = query.name.filter(|name| !name.trim().is_empty()).ok_or_else(|| Error::BadRequest {
        message: "Missing required query parameter: name".to_string(),
    })?;

    let client = ManagementClient::from_config(state.http.clone(), &state.config.management)?;
    let upstream = client.download_auth_file(&name).await.map_err(Error::unavailable)?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", sanitize_filename(&name))).map_err(|e| Error::Internal {
        operation: format!("build Content-Disposition header: {e}"),
    })?;

    let body = Body::from_stream(upstream.bytes_stream());
    Ok(([(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)], body).into_response())
}

#[utoipa::path(
    get,
    path = "/api/proxy/services",
    tag = "proxy",
    summary = "Service health",
    description = "Probes every configured dashboard concurrently. Always answers 200; unreachable services are reported offline.",
    responses(
        (status = 200, description = "Health per service, in configuration order", body = Vec<ServiceHealth>),
    )
)]
#[instrument(skip_all)]
pub async fn services(State(state): State<AppState>) -> Json<Vec<ServiceHealth>> {
    let health = &state.config.service_health;
    let prober = ServiceProber::new(state.http.clone(), health.timeout);
    Json(prober.probe_all(&health.services).await)
}

/// Restrict a filename to `[A-Za-z0-9._-]` so it is safe inside a quoted header value and
/// cannot name a parent or hidden path.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}
