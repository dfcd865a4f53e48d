use axum::{extract::State, routing::get, Json, Router};
use time::OffsetDateTime;
use tracing::instrument;

use super::{dto::Alert, services};
use crate::{error::KitchenResult, state::AppState};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/alerts", get(list_alerts))
}

#[instrument(skip(state))]
pub async fn list_alerts(State(state): State<AppState>) -> KitchenResult<Json<Vec<Alert>>> {
    let alerts = services::active_alerts(
        state.store.as_ref(),
        state.events.as_ref(),
        state.config.alerts.discrepancy_percent,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(Json(alerts))
}
