use crate::{
    AppState,
    api::models::history::{HistoryPoint, HistoryQuery},
    db::handlers::UsageSnapshots,
    errors::{Error, Result},
    types::{HistoryRange, Metric},
};
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use tracing::instrument;

#[utoipa::path(
    get,
    path = "/api/proxy/usage-history",
    tag = "history",
    summary = "Usage history",
    description = "Recorded utilization of one account and metric within the requested range, oldest first.",
    params(HistoryQuery),
    responses(
        (status = 200, description = "History points", body = Vec<HistoryPoint>),
        (status = 400, description = "Missing account or metric, or unknown metric"),
        (status = 500, description = "Internal server error"),
    )
)]
#[instrument(skip_all, fields(account = ?query.account, metric = ?query.metric, range = ?query.range), err)]
pub async fn usage_history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Result<Json<Vec<HistoryPoint>>> {
    let (Some(account), Some(metric)) = (non_empty(query.account), non_empty(query.metric)) else {
        return Err(Error::BadRequest {
            message: "account and metric are required".to_string(),
        });
    };
    let metric: Metric = metric.parse().map_err(|message| Error::BadRequest { message })?;
    let range = HistoryRange::from_token(query.range.as_deref());

    let since = Utc::now() - range.window();
    let mut conn = state.db.acquire().await?;
    let snapshots = UsageSnapshots::new(&mut conn).list_since(&account, metric, since).await?;

    Ok(Json(snapshots.into_iter().map(HistoryPoint::from).collect()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
