use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::dto::{MonthQuery, MonthlySummaryReport, UsageItem, UsageQuery};
use super::services;
use crate::{error::KitchenResult, state::AppState};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/reports/ingredient-usage", get(ingredient_usage))
        .route("/reports/monthly-summary", get(monthly_summary))
}

#[instrument(skip(state))]
pub async fn ingredient_usage(
    State(state): State<AppState>,
    Query(q): Query<UsageQuery>,
) -> KitchenResult<Json<Vec<UsageItem>>> {
    let from = services::parse_date(&q.from)?;
    let to = services::parse_date(&q.to)?;
    let usage = services::ingredient_usage(state.store.as_ref(), from, to).await?;
    Ok(Json(usage))
}

#[instrument(skip(state))]
pub async fn monthly_summary(
    State(state): State<AppState>,
    Query(q): Query<MonthQuery>,
) -> KitchenResult<Json<MonthlySummaryReport>> {
    let (year, month) = services::parse_month(&q.month)?;
    let report = services::monthly_summary(state.store.as_ref(), year, month).await?;
    Ok(Json(report))
}
