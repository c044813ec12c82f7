//! OpenAPI documentation for the status API, served with Scalar at `/api/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, types, upstream, usage};

/// Bearer scheme for the cron endpoint.
struct CronSecurityAddon;

impl Modify for CronSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "cron_secret".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Shared cron secret, required only when `collector.cron_secret` is configured:\n\n\
                            ```\nAuthorization: Bearer CRON_SECRET\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AIncide Status API",
        description = "Aggregated AI account usage, bot status and service health, plus recorded usage history."
    ),
    modifiers(&CronSecurityAddon),
    paths(
        api::handlers::proxy::usage,
        api::handlers::proxy::bot_status,
        api::handlers::proxy::bot_usage,
        api::handlers::proxy::download_auth_file,
        api::handlers::proxy::services,
        api::handlers::history::usage_history,
        api::handlers::cron::collect_usage,
    ),
    components(
        schemas(
            api::models::usage::UsageOverview,
            api::models::usage::ClaudeAccountUsage,
            api::models::usage::CodexAccountUsage,
            api::models::usage::GeminiAccountUsage,
            api::models::history::HistoryPoint,
            usage::providers::UsageWindow,
            usage::providers::CodexWindow,
            usage::providers::GeminiBucket,
            usage::collector::CollectionSummary,
            upstream::bot_server::BotStatus,
            upstream::bot_server::BotInfo,
            upstream::bot_server::BotState,
            upstream::bot_server::BotUsage,
            upstream::services::ServiceHealth,
            upstream::services::ServiceStatus,
            types::Metric,
            types::HistoryRange,
        )
    ),
    tags(
        (name = "proxy", description = "Upstream proxies with per-endpoint degradation"),
        (name = "history", description = "Recorded usage snapshots"),
        (name = "cron", description = "Usage collection"),
    )
)]
pub struct ApiDoc;
